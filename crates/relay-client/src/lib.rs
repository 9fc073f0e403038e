//! # relay-client
//!
//! Client side of the relay: a [`ConnectionManager`] that keeps one logical
//! websocket stream alive.
//!
//! - Explicit state machine ([`ConnectionState`](relay_core::ConnectionState))
//!   observable as a stream or awaited with [`ConnectionManager::wait_for`]
//! - Text `"ping"`/`"pong"` heartbeat; two unanswered intervals close the
//!   socket with `HEARTBEAT_TIMEOUT`
//! - Infinite reconnect with a fixed delay until the user calls `close()`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod heartbeat;
pub mod manager;
pub mod state;

pub use config::ClientConfig;
pub use errors::{ClientError, ConnectionError};
pub use heartbeat::{HeartbeatMonitor, Probe};
pub use manager::{ConnectionManager, InboundMessage};
pub use state::StateTracker;
