//! Client error types.

use relay_core::CloseReason;
use thiserror::Error;

/// Errors returned by [`ConnectionManager`](crate::ConnectionManager) calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No live socket.
    #[error("Not connected")]
    NotConnected,
    /// The payload could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A failed connection attempt, published on the manager's error channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionError {
    /// URL of the attempt.
    pub url: String,
    /// Close reason recorded for the attempt.
    pub reason: CloseReason,
}
