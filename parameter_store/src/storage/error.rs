use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

/// The result type used across the parameter store.
pub type Result<T> = std::result::Result<T, StoreErr>;

/// Failures raised while creating, reading or persisting shared parameters.
#[derive(Debug)]
pub enum StoreErr {
    /// An external buffer doesn't match the size of the store.
    SizeMismatch { got: usize, expected: usize },
    /// The sum of a buffer is not equal to itself, some element is NaN.
    Diverged { buffer: &'static str },
    /// A random parameter generator was configured with an invalid distribution.
    InvalidDistribution(String),
    /// A snapshot file exists but can't be decoded.
    Corrupt { path: PathBuf, reason: String },
    Io(io::Error),
}

impl StoreErr {
    /// Whether this error comes from a file that doesn't exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreErr::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

impl Display for StoreErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreErr::SizeMismatch { got, expected } => write!(
                f,
                "the provided buffer length doesn't match the store size, got {got} and expected {expected}"
            ),
            StoreErr::Diverged { buffer } => {
                write!(f, "numeric divergence: the {buffer} buffer contains NaN")
            }
            StoreErr::InvalidDistribution(reason) => {
                write!(f, "invalid parameter distribution: {reason}")
            }
            StoreErr::Corrupt { path, reason } => {
                write!(f, "corrupt snapshot {}: {reason}", path.display())
            }
            StoreErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for StoreErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
