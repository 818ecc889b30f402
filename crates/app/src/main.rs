//! Huddle - LAN chat and file relay
//!
//! Runs the relay server until Ctrl-C. The chat log lives exactly as long
//! as the server: opened before it starts, closed after it stops.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use huddle_core::{ChatLog, RelayConfig};
use huddle_net::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting Huddle");

    let cli = Cli::parse();
    let mut config = RelayConfig::load().context("failed to load config")?;
    cli.apply(&mut config);
    config.validate().context("invalid config")?;

    // A missing chat log never stops the relay
    let log = match ChatLog::create(&config.log_dir, chrono::Local::now()) {
        Ok(log) => Arc::new(log),
        Err(e) => {
            tracing::error!(error = %e, "Chat log unavailable, continuing without it");
            Arc::new(ChatLog::disabled())
        }
    };

    let server = Server::start(&config, log.clone())
        .await
        .with_context(|| format!("failed to listen on {}", config.listen_addr()))?;
    tracing::info!(addr = %server.addr(), "Chat server ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    tracing::info!("Shutting down");
    server.stop().await;
    log.close();

    Ok(())
}
