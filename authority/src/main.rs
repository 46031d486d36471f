//! GameSync authority server
//!
//! Runs one authoritative game: the sync engine, the realtime session and
//! the consistency validator, with snapshots persisted to disk and an HTTP
//! API for introspection and manual conflict resolution.
//!
//! Usage:
//!   gamesync-authority --config authority.json --http-port 4100

use std::{path::PathBuf, sync::Arc};
use anyhow::{Context, Result};
use clap::Parser;
use gamesync_authority::{build_router, Authority, AuthorityConfig, FilePersistence};
use gamesync_types::GameState;
use serde_json::json;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "gamesync-authority")]
#[command(about = "Authoritative game state server")]
struct Args {
    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP API port (overrides the config file)
    #[arg(long)]
    http_port: Option<u16>,

    /// Snapshot directory (overrides the config file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let mut config = AuthorityConfig::load(args.config.as_deref())?;
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    info!("GameSync authority starting...");
    let store = Arc::new(FilePersistence::new(&config.data_dir));
    let restored = store
        .latest()
        .await
        .with_context(|| format!("Failed to restore from {}", config.data_dir.display()))?;
    let (state, snapshot_version) = match restored {
        Some(snapshot) => {
            info!("Restored snapshot {} from {}", snapshot.version, config.data_dir.display());
            (snapshot.state, snapshot.version)
        }
        None => {
            info!("No snapshot found, starting a fresh game");
            (GameState::new(json!({ "id": "game", "players": [] })), 0)
        }
    };

    let http_port = config.http_port;
    let authority = Arc::new(Authority::new(config, state, store, snapshot_version));
    let _background = authority.spawn_background();

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", http_port))
        .await
        .with_context(|| format!("Failed to bind HTTP port {}", http_port))?;
    info!(
        "HTTP API listening on port {} (strategy: {:?})",
        http_port,
        authority.engine().strategy()
    );
    axum::serve(listener, build_router(authority))
        .await
        .context("HTTP server failed")?;
    Ok(())
}
