//! # relay-server
//!
//! Axum HTTP + websocket front end for the relay.
//!
//! - `GET /ws/commands`: command-mode sockets served by a `CommandSession`
//! - `GET /ws/topics`: topic-mode sockets served by the shared `TopicDispatcher`
//! - `POST`/`DELETE /webhooks`: webhook registrations fed by the event bus
//! - `GET /health`
//! - Protocol-ping heartbeat per socket, graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod clock;
pub mod config;
pub mod errors;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod webhooks;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::{AppState, RelayServer};
pub use shutdown::ShutdownCoordinator;
