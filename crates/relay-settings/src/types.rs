//! Settings types.
//!
//! All sections use camelCase keys on disk and fill missing keys from
//! their `Default` impls.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Client-side connection manager settings.
    pub client: ClientSettings,
    /// Server settings.
    pub server: ServerSettings,
    /// Webhook delivery settings.
    pub webhooks: WebhookSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.client.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "client.heartbeatIntervalMs must be positive".into(),
            ));
        }
        if self.client.connect_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "client.connectTimeoutMs must be positive".into(),
            ));
        }
        if self.server.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalMs must be positive".into(),
            ));
        }
        if self.server.heartbeat_timeout_ms < self.server.heartbeat_interval_ms {
            return Err(SettingsError::InvalidValue(format!(
                "server.heartbeatTimeoutMs ({}) is below server.heartbeatIntervalMs ({})",
                self.server.heartbeat_timeout_ms, self.server.heartbeat_interval_ms
            )));
        }
        if self.server.max_buffered_bytes == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxBufferedBytes must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// How the client interprets text frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireProtocol {
    /// Frames are delivered as raw text.
    #[default]
    Text,
    /// Frames are parsed as JSON; malformed frames are dropped.
    Json,
}

/// Client connection manager settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Endpoint to connect to.
    pub url: String,
    /// Heartbeat probe interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Fixed delay before each reconnect attempt in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Give up on a connect attempt (TCP plus websocket handshake) after
    /// this many milliseconds.
    pub connect_timeout_ms: u64,
    /// Whether `"ping"`/`"pong"` text frames are heartbeat traffic.
    pub heartbeat_enabled: bool,
    /// Inbound frame interpretation.
    pub protocol: WireProtocol,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws/commands".to_string(),
            heartbeat_interval_ms: 5_000,
            reconnect_delay_ms: 10_000,
            connect_timeout_ms: 10_000,
            heartbeat_enabled: true,
            protocol: WireProtocol::Text,
        }
    }
}

/// Server network and runtime settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (0 picks an ephemeral port).
    pub port: u16,
    /// Maximum concurrent websocket connections.
    pub max_connections: usize,
    /// Protocol ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close a silent connection after this many milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Maximum inbound websocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound bytes queued per stream before it is closed.
    pub max_buffered_bytes: usize,
    /// Send `subscribeAck` after a recorded topic subscribe.
    pub subscribe_ack: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_connections: 1024,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            max_message_size: 1024 * 1024,
            max_buffered_bytes: 1024 * 1024,
            subscribe_ack: false,
        }
    }
}

/// Outbound webhook delivery settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookSettings {
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
