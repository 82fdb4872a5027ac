//! Database layer for the Sheets API.
//!
//! Each named region of the document is one row; a write replaces the whole
//! region.

use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::error::ApiError;

/// Named regions of the remote document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Items,
    Transactions,
    CementTransactions,
    Meta,
}

impl Region {
    pub fn name(self) -> &'static str {
        match self {
            Region::Items => "Items",
            Region::Transactions => "Transactions",
            Region::CementTransactions => "CementTransactions",
            Region::Meta => "Meta",
        }
    }
}

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `path`. `:memory:` keeps a
    /// single connection for the life of the pool.
    pub async fn connect(path: &Path) -> Result<Self, ApiError> {
        let memory = path.as_os_str() == ":memory:";
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(if memory {
                SqliteJournalMode::Memory
            } else {
                SqliteJournalMode::Wal
            });

        let mut pool_options = SqlitePoolOptions::new().max_connections(if memory { 1 } else { 4 });
        if memory {
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;
        info!(path = %path.display(), "Document store opened");
        Ok(Database { pool })
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<(), ApiError> {
        sqlx::migrate!("../../migrations/sheets").run(&self.pool).await?;
        Ok(())
    }

    /// `true` when a trivial query succeeds.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    // =========================================================================
    // Region Operations
    // =========================================================================

    /// Stored body of `region`, or `None` if it was never written.
    pub async fn read_region(&self, region: Region) -> Result<Option<Value>, ApiError> {
        let body: Option<String> = sqlx::query_scalar("SELECT body FROM regions WHERE name = ?")
            .bind(region.name())
            .fetch_optional(&self.pool)
            .await?;

        Ok(match body {
            Some(body) => Some(serde_json::from_str(&body)?),
            None => None,
        })
    }

    /// Replaces the whole region.
    pub async fn write_region(&self, region: Region, body: &Value) -> Result<(), ApiError> {
        let body = serde_json::to_string(body)?;
        sqlx::query(
            r#"
            INSERT INTO regions (name, body, written_at)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                body = excluded.body,
                written_at = excluded.written_at
            "#,
        )
        .bind(region.name())
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(region = region.name(), "Region written");
        Ok(())
    }

    /// Current `updatedAt` marker from the Meta region.
    pub async fn updated_at(&self) -> Result<Option<String>, ApiError> {
        Ok(self
            .read_region(Region::Meta)
            .await?
            .and_then(|meta| meta.get("updatedAt")?.as_str().map(str::to_string)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn memory_db() -> Database {
        let db = Database::connect(Path::new(":memory:")).await.unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_unwritten_region_is_none() {
        let db = memory_db().await;
        assert_eq!(db.read_region(Region::Items).await.unwrap(), None);
        assert_eq!(db.updated_at().await.unwrap(), None);
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_write_replaces_region() {
        let db = memory_db().await;
        db.write_region(Region::Transactions, &json!([1])).await.unwrap();
        db.write_region(Region::Transactions, &json!([2, 3])).await.unwrap();
        assert_eq!(
            db.read_region(Region::Transactions).await.unwrap(),
            Some(json!([2, 3]))
        );

        db.write_region(Region::Meta, &json!({ "updatedAt": "2024-05-01T00:00:00.000Z" }))
            .await
            .unwrap();
        assert_eq!(
            db.updated_at().await.unwrap().as_deref(),
            Some("2024-05-01T00:00:00.000Z")
        );
    }
}
