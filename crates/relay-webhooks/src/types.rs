//! Request and response types.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Body of a webhook add/remove request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    /// Destination host; defaults to the caller's address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Destination port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Destination path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

/// Facts about the inbound request that registered the webhook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestContext {
    /// Caller's address.
    pub remote_addr: IpAddr,
}

/// Successful outcome of an add or remove.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookStatus {
    /// New registration (201).
    Created,
    /// Already registered; left untouched (204).
    NoContent,
    /// Registration removed (200).
    Removed,
}

impl WebhookStatus {
    /// HTTP status code.
    pub fn status_code(self) -> u16 {
        match self {
            Self::Created => 201,
            Self::NoContent => 204,
            Self::Removed => 200,
        }
    }
}
