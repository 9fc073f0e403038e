//! Server error types.

use thiserror::Error;

/// Errors starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was tried.
        addr: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Any other socket-level failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
