use std::{
    any::Any,
    mem,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};

use crate::{OrchestratorError, Result};

/// A unit of work run on a pool thread against that thread's state.
pub type Job<S> = Box<dyn FnOnce(&mut S) -> Result<()> + Send>;

/// Counts the threads of a pool that haven't finished yet.
#[derive(Debug, Clone, Default)]
pub struct LiveThreads(Arc<AtomicUsize>);

impl LiveThreads {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn enter(&self) -> LiveGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        LiveGuard(self.clone())
    }
}

struct LiveGuard(LiveThreads);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        (self.0).0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A fixed set of named OS threads, each owning a state built on the thread itself.
///
/// Threads run their setup once and then wait for jobs, they're released only by
/// [`ThreadPool::terminate`]. Jobs are routed to a specific thread and their results are
/// collected by [`ThreadPool::synchronize`].
pub struct ThreadPool<S> {
    name: String,
    jobs: Vec<Sender<Job<S>>>,
    results: Receiver<Result<()>>,
    pending: usize,
    handles: Vec<JoinHandle<()>>,
    live: LiveThreads,
}

impl<S: 'static> ThreadPool<S> {
    /// Starts `size` threads named `<name>-<i>` and runs `setup` on each of them.
    ///
    /// Blocks until every thread finished its setup.
    ///
    /// # Arguments
    /// * `name` - The name of the pool.
    /// * `size` - The amount of threads.
    /// * `setup` - Builds the state of a thread given its 1-based index.
    ///
    /// # Returns
    /// The first setup error, after every thread was joined.
    pub fn spawn<F>(name: &str, size: usize, setup: F) -> Result<Self>
    where
        F: Fn(usize) -> Result<S> + Send + Sync + 'static,
    {
        let setup = Arc::new(setup);
        let live = LiveThreads::default();
        let (ready_tx, ready_rx) = crossbeam_channel::unbounded();
        let (results_tx, results) = crossbeam_channel::unbounded();

        let mut jobs = Vec::with_capacity(size);
        let mut handles = Vec::with_capacity(size);

        for index in 1..=size {
            let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job<S>>();
            let (setup, live) = (setup.clone(), live.clone());
            let (ready_tx, results_tx) = (ready_tx.clone(), results_tx.clone());
            let label = format!("{name}-{index}");

            let handle = thread::Builder::new().name(label.clone()).spawn(move || {
                let _guard = live.enter();

                let built = panic::catch_unwind(AssertUnwindSafe(|| setup(index)));
                let mut state = match built.unwrap_or_else(|e| Err(panicked(&label, e))) {
                    Ok(state) => state,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if ready_tx.send(Ok(())).is_err() {
                    return;
                }
                drop(ready_tx);

                for job in job_rx {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| job(&mut state)))
                        .unwrap_or_else(|e| Err(panicked(&label, e)));

                    if results_tx.send(result).is_err() {
                        break;
                    }
                }

                debug!("released");
            })?;

            jobs.push(job_tx);
            handles.push(handle);
        }

        drop(ready_tx);

        let mut pool = Self {
            name: name.to_string(),
            jobs,
            results,
            pending: 0,
            handles,
            live,
        };

        let mut first_err = None;
        for _ in 0..size {
            match ready_rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_err.get_or_insert(e);
                }
                Err(_) => {
                    first_err.get_or_insert(OrchestratorError::PoolClosed(name.to_string()));
                    break;
                }
            }
        }

        if let Some(e) = first_err {
            warn!("{} pool failed to start: {e}", pool.name);
            let _ = pool.shutdown();
            return Err(e);
        }

        debug!("{} pool ready with {size} threads", pool.name);
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Counts this pool's threads that are still running.
    pub fn live_threads(&self) -> LiveThreads {
        self.live.clone()
    }

    /// Schedules `job` on the thread at `idx` (0-based).
    ///
    /// # Returns
    /// A `PoolClosed` error if the thread isn't taking jobs anymore.
    pub fn execute(&mut self, idx: usize, job: Job<S>) -> Result<()> {
        let tx = self
            .jobs
            .get(idx)
            .ok_or_else(|| OrchestratorError::PoolClosed(format!("{}-{}", self.name, idx + 1)))?;

        tx.send(job)
            .map_err(|_| OrchestratorError::PoolClosed(self.name.clone()))?;

        self.pending += 1;
        Ok(())
    }

    /// Blocks until every scheduled job completed.
    ///
    /// # Returns
    /// The first job error, once every job finished.
    pub fn synchronize(&mut self) -> Result<()> {
        let mut first_err = None;

        while self.pending > 0 {
            let result = self
                .results
                .recv()
                .map_err(|_| OrchestratorError::PoolClosed(self.name.clone()))?;

            self.pending -= 1;
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    /// Releases every thread and waits for them to finish.
    ///
    /// Jobs still queued are run before the threads exit.
    pub fn terminate(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.jobs.clear();

        let mut first_err = None;
        for handle in mem::take(&mut self.handles) {
            let label = handle.thread().name().unwrap_or(&self.name).to_string();

            if let Err(e) = handle.join() {
                first_err.get_or_insert(panicked(&label, e));
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}

impl<S> Drop for ThreadPool<S> {
    fn drop(&mut self) {
        self.jobs.clear();
        for handle in mem::take(&mut self.handles) {
            let _ = handle.join();
        }
    }
}

fn panicked(thread: &str, payload: Box<dyn Any + Send>) -> OrchestratorError {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    OrchestratorError::ThreadPanicked {
        thread: thread.to_string(),
        msg,
    }
}
