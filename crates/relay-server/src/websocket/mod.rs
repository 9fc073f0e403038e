//! Websocket plumbing shared by the command and topic endpoints.

pub mod bridge;
pub mod heartbeat;

pub use bridge::BridgeConfig;
pub use heartbeat::{HeartbeatResult, HeartbeatTracker};
