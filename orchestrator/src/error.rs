use std::{fmt, io, path::PathBuf};

use parameter_store::StoreErr;
use worker::AgentErr;

/// The orchestrator's result type.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// All errors that can occur while orchestrating a run.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Invalid configuration, caught before any thread is started.
    InvalidConfig(String),
    /// A checkpoint exists but the snapshot it was saved with doesn't.
    ResumeMissingWeights { checkpoint: PathBuf, weights: PathBuf },
    /// A pool thread panicked while running its setup or a job.
    ThreadPanicked { thread: String, msg: String },
    /// A pool can't take jobs anymore.
    PoolClosed(String),
    Agent(AgentErr),
    Store(StoreErr),
    Json(serde_json::Error),
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

impl OrchestratorError {
    /// Whether this error reports NaN values in the shared buffers.
    pub fn is_divergence(&self) -> bool {
        match self {
            Self::Agent(e) => e.is_divergence(),
            Self::Store(e) => matches!(e, StoreErr::Diverged { .. }),
            _ => false,
        }
    }
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::ResumeMissingWeights {
                checkpoint,
                weights,
            } => write!(
                f,
                "checkpoint {} exists but its weights {} are missing, refusing to resume",
                checkpoint.display(),
                weights.display()
            ),
            Self::ThreadPanicked { thread, msg } => write!(f, "thread {thread} panicked: {msg}"),
            Self::PoolClosed(pool) => write!(f, "the {pool} pool is closed"),
            Self::Agent(e) => write!(f, "agent error: {e}"),
            Self::Store(e) => write!(f, "parameter store error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Agent(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AgentErr> for OrchestratorError {
    fn from(e: AgentErr) -> Self {
        Self::Agent(e)
    }
}

impl From<StoreErr> for OrchestratorError {
    fn from(e: StoreErr) -> Self {
        Self::Store(e)
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<io::Error> for OrchestratorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
