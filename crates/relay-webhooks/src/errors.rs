//! Webhook error types.

use relay_core::SourceError;
use thiserror::Error;

/// Rejected registration request.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// Missing or malformed input (400).
    #[error("bad request: {0}")]
    BadRequest(String),
    /// No registration for this URL (404).
    #[error("webhook not found: {0}")]
    NotFound(String),
}

impl WebhookError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::NotFound(_) => 404,
        }
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

/// Why a registration was torn down.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The request could not be sent or timed out.
    #[error("delivery failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The endpoint answered with a non-2xx status.
    #[error("endpoint responded with status {0}")]
    Status(u16),
    /// The event source failed.
    #[error("event source failed: {0}")]
    Source(#[from] SourceError),
}
