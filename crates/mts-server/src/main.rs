mod config;
mod network;
mod state;
mod tick;

use config::ServerConfig;
use state::ServerContext;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting MTS relay server...");

    let config = Arc::new(ServerConfig::load(Path::new("config/server.toml"))?);
    info!(
        "Config loaded: bind={}, max_players={}, channel={} v{}",
        config.addr(),
        config.max_players,
        config.channel,
        config.protocol_version
    );

    let (ctx, executor) = ServerContext::new(config.clone())?;

    let listener = TcpListener::bind(config.addr()).await?;
    info!("Listening on {}", config.addr());

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    // The tick loop stays on this task and owns the executor.
    tokio::select! {
        _ = tick::run_tick_loop(config.tick_rate, executor, shutdown_rx) => {
            info!("Server shut down cleanly");
        }
        _ = network::accept_loop(listener, ctx.clone()) => {
            error!("Accept loop exited unexpectedly");
        }
    }

    info!(
        "{} players online, {} entities known at shutdown",
        ctx.worlds.player_count(),
        ctx.worlds.overworld().entity_count()
    );
    Ok(())
}
