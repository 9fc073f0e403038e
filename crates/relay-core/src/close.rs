//! Close codes and the reason a connection left the `Connected` state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Websocket close codes used across the relay.
///
/// Application-defined codes live in `4000..=4999`; anything from
/// [`CUSTOM_MIN`](close_code::CUSTOM_MIN) up is free for embedders.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Connection dropped without a close frame.
    pub const ABNORMAL: u16 = 1006;
    /// Unexpected condition on the closing side.
    pub const INTERNAL_ERROR: u16 = 1011;
    /// Peer is restarting.
    pub const RESTARTING: u16 = 1012;
    /// No pong arrived within the heartbeat window.
    pub const HEARTBEAT_TIMEOUT: u16 = 4000;
    /// Outbound buffer exceeded its threshold.
    pub const BACKPRESSURE: u16 = 4001;
    /// First code of the custom range.
    pub const CUSTOM_MIN: u16 = 4001;
    /// Last code of the custom range.
    pub const CUSTOM_MAX: u16 = 4999;

    /// Whether `code` is in the application-defined range.
    pub fn is_custom(code: u16) -> bool {
        (CUSTOM_MIN..=CUSTOM_MAX).contains(&code)
    }
}

/// Who initiated a close.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseSource {
    /// The local owner called `close()`.
    User,
    /// The local connection logic (heartbeat, connect failure).
    Client,
    /// The remote peer or the transport.
    Server,
}

/// Why the connection is not currently connected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReason {
    /// Initiator.
    pub source: CloseSource,
    /// Close code, when one is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    /// Human-readable reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CloseReason {
    /// Build a close reason.
    #[must_use]
    pub fn new(source: CloseSource, code: Option<u16>, reason: Option<String>) -> Self {
        Self {
            source,
            code,
            reason,
        }
    }

    /// User-initiated close.
    #[must_use]
    pub fn user(code: Option<u16>, reason: Option<String>) -> Self {
        Self::new(CloseSource::User, code, reason)
    }

    /// Close decided by local connection logic.
    #[must_use]
    pub fn client(code: u16, reason: impl Into<String>) -> Self {
        Self::new(CloseSource::Client, Some(code), Some(reason.into()))
    }

    /// Close coming from the peer or the transport.
    #[must_use]
    pub fn server(code: u16, reason: Option<String>) -> Self {
        Self::new(CloseSource::Server, Some(code), reason)
    }

    /// Whether the owner asked for this close.
    pub fn is_user(&self) -> bool {
        self.source == CloseSource::User
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            CloseSource::User => "user",
            CloseSource::Client => "client",
            CloseSource::Server => "server",
        };
        write!(f, "{source}")?;
        if let Some(code) = self.code {
            write!(f, " {code}")?;
        }
        if let Some(reason) = &self.reason {
            write!(f, ": {reason}")?;
        }
        Ok(())
    }
}
