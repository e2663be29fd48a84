//! Canon node binary
//!
//! Opens the chain, starts the block pool tasks and, with `--mine`, the
//! block producer.

mod cli;
mod config;
mod network;
mod node;

use anyhow::Result;
use cli::Cli;
use network::StandaloneNetwork;
use node::Node;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(&cli.log_level, cli.log_json);

    let config = cli.node_config()?;
    let node = Node::new(config, Arc::new(StandaloneNetwork))?;

    // Handle Ctrl+C for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    node.run(shutdown_rx).await?;
    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
