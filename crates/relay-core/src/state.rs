//! Client connection state machine states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a client-side connection.
///
/// `Disconnected` is initial. `Closed` is terminal only after a user close;
/// `ConnectionLost` and `WaitingReconnect` cycle back to `Connecting`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Disconnected,
    /// Socket open in progress.
    Connecting,
    /// Socket open and usable.
    Connected,
    /// Socket dropped without a user close.
    ConnectionLost,
    /// Sleeping before the next attempt.
    WaitingReconnect,
    /// Closed by the user.
    Closed,
}

impl ConnectionState {
    /// States from which `connect()` starts a new attempt.
    pub fn can_connect(self) -> bool {
        matches!(self, Self::Disconnected | Self::Closed)
    }

    /// Stable name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ConnectionLost => "connection_lost",
            Self::WaitingReconnect => "waiting_reconnect",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
