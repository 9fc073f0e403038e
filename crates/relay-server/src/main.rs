//! # relay
//!
//! Relay server binary: loads settings, registers the `clock` source and
//! serves until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::clock::{self, Clock};
use relay_server::{RelayServer, ServerConfig};
use tracing::info;

/// Relay event distribution server.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "Relay event distribution server")]
struct Cli {
    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings, 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Log level when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Clock tick period in milliseconds.
    #[arg(long, default_value = "1000")]
    clock_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(relay_settings::settings_path);
    let mut settings = relay_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    if let Some(host) = cli.host {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    let level = cli.log_level.unwrap_or_else(|| settings.logging.level.clone());
    relay_core::logging::init_subscriber(&level);

    let period = Duration::from_millis(cli.clock_interval_ms.max(1));
    let sources = Arc::new(clock::registry(Clock::new(period)));
    let server = RelayServer::new(ServerConfig::from_settings(&settings), sources);

    let (addr, handle) = server.listen().await.context("Failed to start server")?;
    let _clock = tokio::spawn(clock::publish_ticks(
        Arc::clone(server.dispatcher()),
        server.event_bus(),
        period,
        server.shutdown().token(),
    ));
    info!(%addr, "relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    info!("shutting down");
    let _ = server.stop(None).await;
    let _ = handle.await;
    Ok(())
}
