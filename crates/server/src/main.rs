//! FinTrack server - HTTP entry point

use std::sync::Arc;

use anyhow::Context;
use fintrack_core::{SessionSweeper, SessionSweeperConfig};
use fintrack_server::AppState;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging FIRST so we can see .env loading
    init_tracing();

    match dotenvy::dotenv() {
        Ok(path) => info!(path = %path.display(), "Loaded .env"),
        Err(e) => warn!(error = %e, "Could not load .env file"),
    }

    let config = fintrack_infra::config::load_or_default().context("failed to load configuration")?;

    let state = AppState::from_config(&config);
    let mut sweeper = SessionSweeper::new(
        Arc::clone(&state.sessions),
        SessionSweeperConfig { interval: config.session.sweep_interval(), ..Default::default() },
    )
    .also_sweep(state.idempotency.clone());
    sweeper.start().context("failed to start session sweeper")?;

    let listener = TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;

    fintrack_server::serve(listener, state, shutdown_signal()).await?;

    if let Err(err) = sweeper.stop().await {
        warn!(error = %err, "Session sweeper did not stop cleanly");
    }
    info!("FinTrack server stopped");
    Ok(())
}

/// `RUST_LOG` filter (default `info`); `FINTRACK_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("FINTRACK_LOG_JSON").is_ok_and(|value| value == "1" || value == "true");

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
