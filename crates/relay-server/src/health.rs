//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open websocket connections across both modes.
    pub connections: usize,
    /// Registered webhooks.
    pub webhooks: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, webhooks: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        webhooks,
    }
}
