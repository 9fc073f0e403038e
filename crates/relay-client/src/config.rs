//! Client configuration.

use std::time::Duration;

use relay_settings::{ClientSettings, WireProtocol};

/// Runtime configuration for a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Initial endpoint.
    pub url: String,
    /// Heartbeat probe interval.
    pub heartbeat_interval: Duration,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Deadline for one connect attempt, handshake included.
    pub connect_timeout: Duration,
    /// Treat `"ping"`/`"pong"` text frames as heartbeat traffic.
    pub heartbeat_enabled: bool,
    /// Inbound frame interpretation.
    pub protocol: WireProtocol,
    /// Capacity of the inbound message and error broadcast channels.
    pub channel_capacity: usize,
}

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

impl ClientConfig {
    /// Config for `url` with default timings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Build from loaded settings.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            url: settings.url.clone(),
            heartbeat_interval: Duration::from_millis(settings.heartbeat_interval_ms),
            reconnect_delay: Duration::from_millis(settings.reconnect_delay_ms),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            heartbeat_enabled: settings.heartbeat_enabled,
            protocol: settings.protocol,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_settings(&ClientSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_settings() {
        let config = ClientConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.reconnect_delay, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.heartbeat_enabled);
        assert_eq!(config.protocol, WireProtocol::Text);
    }

    #[test]
    fn from_settings_converts_millis() {
        let settings = ClientSettings {
            url: "ws://example:1/ws".into(),
            heartbeat_interval_ms: 250,
            reconnect_delay_ms: 40,
            connect_timeout_ms: 300,
            heartbeat_enabled: false,
            protocol: WireProtocol::Json,
        };
        let config = ClientConfig::from_settings(&settings);
        assert_eq!(config.url, "ws://example:1/ws");
        assert_eq!(config.heartbeat_interval, Duration::from_millis(250));
        assert_eq!(config.reconnect_delay, Duration::from_millis(40));
        assert_eq!(config.connect_timeout, Duration::from_millis(300));
        assert!(!config.heartbeat_enabled);
        assert_eq!(config.protocol, WireProtocol::Json);
        assert_eq!(config.channel_capacity, 256);
    }

    #[test]
    fn new_overrides_url_only() {
        let config = ClientConfig::new("ws://localhost:9/x");
        assert_eq!(config.url, "ws://localhost:9/x");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
    }
}
