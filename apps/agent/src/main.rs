//! # Ironstock Agent
//!
//! Headless sync daemon: keeps the local ledger reconciled with the remote
//! document store until Ctrl+C or SIGTERM.
//!
//! ## Environment
//! - `RUST_LOG` - log filter (default `info,sqlx=warn`)
//! - `IRONSTOCK_CONFIG` - path to `sync.toml` (default: platform config dir)
//! - `IRONSTOCK_SYNC_TOKEN` - if set, stored as the credential and sync is
//!   enabled before the engine starts
//! - `IRONSTOCK_*` overrides understood by `SyncConfig`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ironstock_db::{Database, DbConfig, LedgerStore, SharedStore};
use ironstock_sync::{write_settings, HttpRemote, SyncConfig, SyncEngine};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How often the current sync status is logged.
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    info!("Starting Ironstock sync agent...");

    // Load configuration
    let config_path = std::env::var("IRONSTOCK_CONFIG").ok().map(PathBuf::from);
    let config = SyncConfig::load(config_path)?;
    info!(
        remote = %config.remote.base_url,
        database = %config.storage.database_path.display(),
        "Configuration loaded"
    );

    // Open the local store
    if let Some(parent) = config.storage.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = Database::new(DbConfig::new(&config.storage.database_path)).await?;
    let kv: SharedStore = Arc::new(db.kv());
    let ledger = Arc::new(LedgerStore::open(kv.clone()).await?);

    if let Ok(token) = std::env::var("IRONSTOCK_SYNC_TOKEN") {
        write_settings(kv.as_ref(), &token, !token.is_empty()).await?;
    }

    // Start syncing
    let remote = Arc::new(HttpRemote::new(&config.remote)?);
    let engine = SyncEngine::spawn(&config.engine, ledger, kv, remote);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut status_tick = tokio::time::interval(STATUS_LOG_INTERVAL);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = status_tick.tick() => match engine.status().await {
                Ok(status) => info!(
                    last_import = ?status.last_import_at,
                    last_export = ?status.last_export_at,
                    last_error = ?status.last_error,
                    failures = status.consecutive_failures,
                    "Sync status"
                ),
                Err(e) => warn!(error = %e, "Could not read sync status"),
            },
        }
    }

    engine.shutdown().await?;
    db.close().await;
    info!("Agent shutdown complete");
    Ok(())
}

/// Initializes tracing.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
