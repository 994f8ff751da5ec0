//! Errors.

use std::io;

/// Crate-wide error type.
///
/// `BackendProtocol` carries a backend's own protocol-level error reply verbatim
/// (e.g. a Redis `-WRONGTYPE ...` error) so it can be forwarded to the client
/// unchanged; it is distinct from `Transport`, which means the connection to the
/// backend itself failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Pool(#[from] crate::pool::PoolError),

    #[error("bad config: {0}")]
    Config(String),

    #[error("backend error: {0}")]
    BackendProtocol(String),
}
