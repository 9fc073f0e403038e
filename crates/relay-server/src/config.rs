//! Server configuration.

use std::time::Duration;

use relay_settings::RelaySettings;
use relay_webhooks::WebhookConfig;

/// Runtime configuration for a [`RelayServer`](crate::RelayServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent websocket connections across both modes.
    pub max_connections: usize,
    /// Protocol ping interval.
    pub heartbeat_interval: Duration,
    /// Close a socket that stays silent this long.
    pub heartbeat_timeout: Duration,
    /// Max inbound websocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound bytes a stream may queue before it is closed.
    pub max_buffered_bytes: usize,
    /// Acknowledge topic subscriptions.
    pub subscribe_ack: bool,
    /// Outbound webhook delivery.
    pub webhooks: WebhookConfig,
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            heartbeat_interval: Duration::from_millis(server.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(server.heartbeat_timeout_ms),
            max_message_size: server.max_message_size,
            max_buffered_bytes: server.max_buffered_bytes,
            subscribe_ack: server.subscribe_ack,
            webhooks: WebhookConfig {
                request_timeout: Duration::from_millis(settings.webhooks.request_timeout_ms),
            },
        }
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Consecutive silent heartbeat ticks tolerated before closing.
    pub fn max_missed_pongs(&self) -> u32 {
        let interval = self.heartbeat_interval.as_millis().max(1);
        let missed = (self.heartbeat_timeout.as_millis() / interval).max(1);
        u32::try_from(missed).unwrap_or(u32::MAX)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            ..Self::from_settings(&RelaySettings::default())
        }
    }
}
