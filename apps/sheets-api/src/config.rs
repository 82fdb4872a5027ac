//! Sheets API configuration module.
//!
//! Configuration is loaded from environment variables with fallback to defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Sheets API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsApiConfig {
    /// HTTP server port
    pub port: u16,

    /// SQLite file holding the document regions
    pub database_path: PathBuf,

    /// Shared secret clients must send as `x-sync-token`. The server starts
    /// without it, but every guarded route then answers 500.
    pub sync_token: Option<String>,
}

impl SheetsApiConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config = SheetsApiConfig {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8787".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,

            database_path: env::var("SHEETS_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("sheets.db")),

            sync_token: env::var("SHEETS_SYNC_TOKEN").ok().filter(|t| !t.is_empty()),
        };

        if config.database_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue("SHEETS_DATABASE_PATH".to_string()));
        }

        Ok(config)
    }

    /// In-memory store with the given token; used by tests.
    pub fn in_memory(sync_token: Option<&str>) -> Self {
        SheetsApiConfig {
            port: 0,
            database_path: PathBuf::from(":memory:"),
            sync_token: sync_token.map(str::to_string),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
