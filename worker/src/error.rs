use std::{error::Error, fmt, io};

use parameter_store::StoreErr;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, AgentErr>;

/// Agent failures.
#[derive(Debug)]
pub enum AgentErr {
    /// Hyperparameters that can't be trained with.
    InvalidConfig(String),
    /// A shared buffer contains NaN after an update.
    Diverged { buffer: &'static str, step: i64 },
    Store(StoreErr),
    Io(io::Error),
}

impl AgentErr {
    /// Whether this error reports corrupted shared state.
    pub fn is_divergence(&self) -> bool {
        matches!(
            self,
            AgentErr::Diverged { .. } | AgentErr::Store(StoreErr::Diverged { .. })
        )
    }
}

impl fmt::Display for AgentErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentErr::InvalidConfig(msg) => write!(f, "invalid agent config: {msg}"),
            AgentErr::Diverged { buffer, step } => {
                write!(f, "numeric divergence at step {step}: the {buffer} buffer contains NaN")
            }
            AgentErr::Store(e) => write!(f, "parameter store error: {e}"),
            AgentErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for AgentErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AgentErr::Store(e) => Some(e),
            AgentErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreErr> for AgentErr {
    fn from(value: StoreErr) -> Self {
        Self::Store(value)
    }
}

impl From<io::Error> for AgentErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
