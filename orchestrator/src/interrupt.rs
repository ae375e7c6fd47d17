use std::{cell::RefCell, io, process, rc::Rc};

use log::{error, info, warn};
use parameter_store::{SENTINEL, StepCounter};

use crate::{
    Result,
    checkpoint::{CheckpointManager, CheckpointRecord, LAST},
    validator::Evaluator,
};

pub const SIGINT: i32 = 2;
pub const SIGTERM: i32 = 15;

/// The process signals that interrupt a run.
///
/// Registration replaces the default signal disposition, signals delivered before anyone awaits
/// [`Interrupts::recv`] are kept until then.
///
/// The disposition is never restored, tokio keeps the signals captured for the rest of the
/// process. Signals that arrive once the control job returned on the sentinel, or after a failed
/// worker pool setup, are ignored: the master is already releasing its threads by then and
/// returns on its own.
pub struct Interrupts {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl Interrupts {
    /// Registers the signal listeners, must be called within a tokio runtime.
    #[cfg(unix)]
    pub fn register() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn register() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Waits for the next interrupt.
    ///
    /// # Returns
    /// The number of the received signal.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> i32 {
        tokio::select! {
            Some(()) = self.sigint.recv() => SIGINT,
            Some(()) = self.sigterm.recv() => SIGTERM,
            else => std::future::pending().await,
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> i32 {
        match tokio::signal::ctrl_c().await {
            Ok(()) => SIGINT,
            Err(_) => std::future::pending().await,
        }
    }
}

/// Saves the progress of an interrupted run and exits.
///
/// Only reads the step counter and writes files, it never waits on another thread.
pub struct InterruptHandler<V> {
    counter: StepCounter,
    checkpoints: CheckpointManager,
    evaluator: Rc<RefCell<V>>,
}

impl<V: Evaluator> InterruptHandler<V> {
    pub fn new(
        counter: StepCounter,
        checkpoints: CheckpointManager,
        evaluator: Rc<RefCell<V>>,
    ) -> Self {
        Self {
            counter,
            checkpoints,
            evaluator,
        }
    }

    /// Persists the checkpoint record followed by the `last` snapshot.
    ///
    /// # Returns
    /// The saved record, `None` if the run had already finished and saved its final checkpoint.
    pub fn persist(&self) -> Result<Option<CheckpointRecord>> {
        let steps = self.counter.get();
        if steps == SENTINEL {
            warn!("run already finished, keeping its final checkpoint");
            return Ok(None);
        }

        let record = CheckpointRecord {
            global_steps: steps as u64,
        };
        self.checkpoints.save(&record)?;
        self.evaluator.borrow().save_weights(LAST)?;

        Ok(Some(record))
    }

    /// Persists the run and exits with `128 + signo`.
    pub fn handle(&self, signo: i32) -> ! {
        info!("received signal {signo}, saving checkpoint");

        if let Err(e) = self.persist() {
            error!("failed to save checkpoint: {e}");
        }

        log::logger().flush();
        process::exit(128 + signo)
    }
}

#[cfg(test)]
mod tests {
    use std::{env, fs};

    use super::*;
    use crate::validator::tests::CountingEvaluator;

    #[test]
    fn test_persist_saves_counter() {
        let dir = env::temp_dir().join(format!("interrupt-test-{}", std::process::id()));
        let checkpoints = CheckpointManager::new(&dir);
        let counter = StepCounter::new();
        counter.advance_to(4242);

        let evaluator = Rc::new(RefCell::new(CountingEvaluator::default()));
        let handler = InterruptHandler::new(counter.clone(), checkpoints.clone(), evaluator);

        let record = handler.persist().unwrap();
        assert_eq!(record, Some(CheckpointRecord { global_steps: 4242 }));
        assert_eq!(checkpoints.load().unwrap(), record);

        counter.stop();
        assert_eq!(handler.persist().unwrap(), None);
        assert_eq!(checkpoints.load().unwrap(), record);

        fs::remove_dir_all(dir).unwrap();
    }
}
