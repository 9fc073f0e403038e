//! Layered settings loading.
//!
//! Three layers, lowest first: compiled [`RelaySettings::default()`], the
//! user file at `~/.relay/settings.json`, then `RELAY_*` environment
//! variables. The merged result is validated before it is returned.
//!
//! The user file is overlaid on the defaults as JSON (see [`merge_layer`]),
//! so a file only needs the keys it changes.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{RelaySettings, WireProtocol};

/// `~/.relay/settings.json`, falling back to `/tmp` without `HOME`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
    home.join(".relay").join("settings.json")
}

/// Load from [`settings_path`] and the process environment.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` and the process environment.
///
/// A missing file means defaults. Unparseable JSON or a document that
/// fails [`RelaySettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut settings = read_layers(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_layers(path: &Path) -> Result<RelaySettings> {
    let mut document = serde_json::to_value(RelaySettings::default())?;
    if path.exists() {
        debug!(?path, "reading settings file");
        let layer: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        merge_layer(&mut document, layer);
    } else {
        debug!(?path, "no settings file");
    }
    Ok(serde_json::from_value(document)?)
}

/// Overlay `layer` onto `base` in place.
///
/// Keys present in both objects recurse. A `null` in the layer leaves the
/// base untouched; any other non-object value in the layer wins outright.
pub fn merge_layer(base: &mut Value, layer: Value) {
    match layer {
        Value::Null => {}
        Value::Object(entries) => {
            if let Value::Object(base_entries) = &mut *base {
                for (key, value) in entries {
                    if value.is_null() {
                        continue;
                    }
                    match base_entries.get_mut(&key) {
                        Some(slot) => merge_layer(slot, value),
                        None => {
                            let _ = base_entries.insert(key, value);
                        }
                    }
                }
            } else {
                *base = Value::Object(entries);
            }
        }
        other => *base = other,
    }
}

/// Apply `RELAY_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply `RELAY_*` overrides read through `lookup`.
///
/// A value that does not parse, or falls outside its range, is logged and
/// skipped.
pub fn apply_overrides(settings: &mut RelaySettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = Env(lookup);

    let server = &mut settings.server;
    env.set_text("RELAY_HOST", &mut server.host);
    env.set_number("RELAY_PORT", 0..=u16::MAX, &mut server.port);
    env.set_number("RELAY_MAX_CONNECTIONS", 1..=1_000_000, &mut server.max_connections);
    env.set_number("RELAY_HEARTBEAT_INTERVAL_MS", 100..=600_000, &mut server.heartbeat_interval_ms);
    env.set_number("RELAY_HEARTBEAT_TIMEOUT_MS", 100..=3_600_000, &mut server.heartbeat_timeout_ms);
    env.set_number("RELAY_MAX_BUFFERED_BYTES", 1024..=1 << 30, &mut server.max_buffered_bytes);
    env.set_flag("RELAY_SUBSCRIBE_ACK", &mut server.subscribe_ack);

    let client = &mut settings.client;
    env.set_text("RELAY_CLIENT_URL", &mut client.url);
    env.set_number("RELAY_CLIENT_HEARTBEAT_MS", 100..=600_000, &mut client.heartbeat_interval_ms);
    env.set_number("RELAY_RECONNECT_DELAY_MS", 0..=3_600_000, &mut client.reconnect_delay_ms);
    env.set_number("RELAY_CONNECT_TIMEOUT_MS", 100..=600_000, &mut client.connect_timeout_ms);
    env.set_flag("RELAY_CLIENT_HEARTBEAT", &mut client.heartbeat_enabled);
    if let Some(raw) = env.text("RELAY_CLIENT_PROTOCOL") {
        match serde_json::from_value::<WireProtocol>(Value::String(raw.clone())) {
            Ok(protocol) => client.protocol = protocol,
            Err(_) => warn!(key = "RELAY_CLIENT_PROTOCOL", value = %raw, "unknown protocol, ignoring"),
        }
    }

    env.set_number("RELAY_WEBHOOK_TIMEOUT_MS", 100..=600_000, &mut settings.webhooks.request_timeout_ms);
    env.set_text("RELAY_LOG_LEVEL", &mut settings.logging.level);
}

/// `true`/`yes`/`on`/`1` or `false`/`no`/`off`/`0`, ignoring case.
pub fn parse_flag(raw: &str) -> Option<bool> {
    const ON: [&str; 4] = ["true", "yes", "on", "1"];
    const OFF: [&str; 4] = ["false", "no", "off", "0"];
    let raw = raw.trim();
    if ON.iter().any(|v| v.eq_ignore_ascii_case(raw)) {
        Some(true)
    } else if OFF.iter().any(|v| v.eq_ignore_ascii_case(raw)) {
        Some(false)
    } else {
        None
    }
}

/// Parse a number and keep it only if it lies in `bounds`.
pub fn parse_bounded<T: FromStr + PartialOrd>(raw: &str, bounds: &RangeInclusive<T>) -> Option<T> {
    raw.trim().parse().ok().filter(|n| bounds.contains(n))
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn text(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.is_empty())
    }

    fn set_text(&self, name: &str, slot: &mut String) {
        if let Some(value) = self.text(name) {
            *slot = value;
        }
    }

    fn set_flag(&self, name: &str, slot: &mut bool) {
        let Some(raw) = (self.0)(name) else { return };
        match parse_flag(&raw) {
            Some(value) => *slot = value,
            None => warn!(key = name, value = %raw, "expected a boolean, ignoring"),
        }
    }

    fn set_number<T>(&self, name: &str, bounds: RangeInclusive<T>, slot: &mut T)
    where
        T: FromStr + PartialOrd + std::fmt::Display,
    {
        let Some(raw) = (self.0)(name) else { return };
        match parse_bounded(&raw, &bounds) {
            Some(value) => *slot = value,
            None => warn!(
                key = name,
                value = %raw,
                min = %bounds.start(),
                max = %bounds.end(),
                "number missing or out of range, ignoring"
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
