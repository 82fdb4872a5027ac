//! # Local Schema
//!
//! ```text
//! migrations/sqlite/
//!   001_kv_store.sql   kv_store(key PK, value, updated_at)
//! ```
//!
//! The local store has a single table; everything else (ledger, sync
//! settings, sync status) is a JSON value under a well-known key. New
//! files are added with the next `NNN_` prefix and applied in order.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies pending schema files. Safe to call on every open.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let (total, applied) = migration_status(pool).await?;
    debug!(total, applied, "Local schema status");

    MIGRATOR.run(pool).await?;

    if applied < total {
        info!(applied = total - applied, "Local schema upgraded");
    }
    Ok(())
}

/// `(embedded, applied)` schema file counts. A store that has never been
/// migrated reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, applied.max(0) as usize))
}
