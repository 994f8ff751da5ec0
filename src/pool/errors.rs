//! Pool error types.

/// Which pool operation timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutType {
    /// Timed out waiting for a connection slot to free up.
    Wait,

    /// Timed out dialing a new backend connection.
    Create,

    /// Timed out recycling a connection before handing it back out.
    Recycle,
}

impl std::fmt::Display for TimeoutType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutType::Wait => write!(f, "timed out waiting for a free connection"),
            TimeoutType::Create => write!(f, "timed out dialing a new backend connection"),
            TimeoutType::Recycle => write!(f, "timed out recycling a backend connection"),
        }
    }
}

/// Error raised while recycling a connection back into the pool, e.g. a health
/// check failing before the connection is handed to the next caller.
#[derive(Debug)]
pub enum RecycleError {
    Message(String),
    Io(std::io::Error),
}

impl std::fmt::Display for RecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecycleError::Message(msg) => write!(f, "{msg}"),
            RecycleError::Io(e) => write!(f, "io error during recycle: {e}"),
        }
    }
}

impl std::error::Error for RecycleError {}

impl From<std::io::Error> for RecycleError {
    fn from(e: std::io::Error) -> Self {
        RecycleError::Io(e)
    }
}

pub type RecycleResult = Result<(), RecycleError>;

/// Errors returned by `Pool::get()`.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("{0}")]
    Timeout(TimeoutType),

    #[error("backend connection error: {0}")]
    Backend(#[from] std::io::Error),

    #[error("pool has been closed")]
    Closed,
}
