//! Playback Session (quaver-ps) - Main entry point
//!
//! Coordinator daemon for Quaver playback: restores the persisted playlist,
//! drives the audio sink, and serves the HTTP/SSE control surface that
//! display clients attach to.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quaver_ps::config::{Config, ConfigOverrides};
use quaver_ps::{api, Session};

/// Command-line arguments for quaver-ps
#[derive(Parser, Debug)]
#[command(name = "quaver-ps")]
#[command(about = "Playback session coordinator for Quaver")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "QUAVER_PS_PORT")]
    port: Option<u16>,

    /// Path to the TOML configuration file
    #[arg(short, long, env = "QUAVER_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the SQLite database file (overrides the config file)
    #[arg(short, long, env = "QUAVER_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quaver_ps=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    let config = Config::load(
        args.config.as_deref(),
        ConfigOverrides {
            database_path: args.database,
            port: args.port,
        },
    )
    .await
    .context("Failed to load configuration")?;

    info!("Starting Quaver Playback Session on port {}", config.port);
    info!("Database: {:?}", config.database_path);

    let session: Arc<Session> = Session::new(config.db_pool.clone(), config.runtime.clone())
        .await
        .context("Failed to initialize playback session")?;
    info!("Playback session initialized");

    api::run(config.port, session.clone(), shutdown_signal())
        .await
        .context("Server error")?;

    session.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}
