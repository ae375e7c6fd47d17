use std::{path::PathBuf, sync::Arc, thread};

use log::debug;
use parking_lot::Mutex;
use worker::{NumericContext, Precision};

use crate::{Result, logging};

/// Serializes agent construction across pool threads.
///
/// Held only while an agent is built, never while it trains.
#[derive(Debug, Clone, Default)]
pub struct InitMutex(Arc<Mutex<()>>);

impl InitMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `build` while holding the lock.
    pub fn construct<T, F: FnOnce() -> T>(&self, build: F) -> T {
        let _guard = self.0.lock();
        build()
    }
}

/// The one-time initialization every pool thread runs before its first job.
#[derive(Debug, Clone)]
pub struct SetupPipeline {
    logs_dir: PathBuf,
    seed: u64,
    precision: Precision,
}

impl SetupPipeline {
    pub fn new(logs_dir: PathBuf, seed: u64, precision: Precision) -> Self {
        Self {
            logs_dir,
            seed,
            precision,
        }
    }

    /// Attaches the thread's log file and builds its numeric context.
    ///
    /// # Arguments
    /// * `index` - The 1-based index of the calling thread inside its pool.
    ///
    /// # Returns
    /// An io error if the log file can't be opened.
    pub fn run(&self, index: usize) -> Result<NumericContext> {
        let current = thread::current();
        let label = current.name().unwrap_or("unnamed");

        logging::attach_thread_file(&self.logs_dir, label)?;

        let ctx = NumericContext::new(self.seed, index, self.precision);
        debug!(
            "thread ready: seed={} precision={:?}",
            ctx.seed(),
            ctx.precision()
        );

        Ok(ctx)
    }
}
