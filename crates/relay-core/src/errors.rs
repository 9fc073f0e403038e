//! Error types shared by event sources and their consumers.

use thiserror::Error;

/// Error emitted by an upstream event source.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SourceError {
    /// Description forwarded to subscribers.
    pub message: String,
}

impl SourceError {
    /// Build a source error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure to open a push subscription by event type.
#[derive(Debug, Error)]
pub enum OpenError {
    /// No factory is registered under this name.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
    /// The factory rejected the arguments.
    #[error(transparent)]
    Source(#[from] SourceError),
}
