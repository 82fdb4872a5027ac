//! # Sync Configuration
//!
//! Static configuration for the sync agent: where the remote store lives,
//! engine timings and the local database path.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     IRONSTOCK_REMOTE_URL=https://stock.example.com                     │
//! │     IRONSTOCK_DATABASE_PATH=/var/lib/ironstock/ironstock.db            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/ironstock/sync.toml (Linux)                              │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The credential and the enabled flag are NOT here: they live in the local
//! key-value store (see `settings.rs`) so they can change at runtime.
//!
//! ## Configuration File Format
//! ```toml
//! [remote]
//! base_url = "http://127.0.0.1:8787"
//! request_timeout_secs = 20
//!
//! [engine]
//! meta_poll_interval_ms = 30000
//! export_debounce_ms = 1500
//! base_backoff_ms = 1000
//! max_backoff_ms = 30000
//! settings_poll_interval_ms = 1000
//!
//! [storage]
//! database_path = "ironstock.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Remote Settings
// =============================================================================

/// Where the remote document store lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL; the `/api/sheets/...` routes are resolved against it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_request_timeout() -> u64 {
    20
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl RemoteSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Engine Settings
// =============================================================================

/// Engine timings.
///
/// ```text
/// meta poll        30s   lightweight marker check
/// export debounce  1.5s  coalesces bursts of ledger edits
/// backoff          1s..30s exponential with jitter (exports only)
/// settings poll    1s    re-reads token / enabled / retry flag
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_meta_poll")]
    pub meta_poll_interval_ms: u64,

    #[serde(default = "default_export_debounce")]
    pub export_debounce_ms: u64,

    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_settings_poll")]
    pub settings_poll_interval_ms: u64,
}

fn default_meta_poll() -> u64 {
    30_000
}
fn default_export_debounce() -> u64 {
    1_500
}
fn default_base_backoff() -> u64 {
    1_000
}
fn default_max_backoff() -> u64 {
    30_000
}
fn default_settings_poll() -> u64 {
    1_000
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            meta_poll_interval_ms: default_meta_poll(),
            export_debounce_ms: default_export_debounce(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
            settings_poll_interval_ms: default_settings_poll(),
        }
    }
}

impl EngineSettings {
    pub fn meta_poll_interval(&self) -> Duration {
        Duration::from_millis(self.meta_poll_interval_ms)
    }

    pub fn export_debounce(&self) -> Duration {
        Duration::from_millis(self.export_debounce_ms)
    }

    pub fn settings_poll_interval(&self) -> Duration {
        Duration::from_millis(self.settings_poll_interval_ms)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.base_backoff_ms, self.max_backoff_ms)
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Local database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "ironstock", "ironstock")
        .map(|dirs| dirs.data_dir().join("ironstock.db"))
        .unwrap_or_else(|| PathBuf::from("ironstock.db"))
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            database_path: default_database_path(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl SyncConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let url = url::Url::parse(&self.remote.base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "Remote URL must start with http:// or https://, got: {}",
                self.remote.base_url
            )));
        }

        if self.remote.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        let engine = &self.engine;
        if engine.meta_poll_interval_ms == 0 || engine.settings_poll_interval_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "poll intervals must be greater than 0".into(),
            ));
        }
        if engine.base_backoff_ms > engine.max_backoff_ms {
            return Err(SyncError::InvalidConfig(format!(
                "base_backoff_ms ({}) exceeds max_backoff_ms ({})",
                engine.base_backoff_ms, engine.max_backoff_ms
            )));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("IRONSTOCK_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.base_url = url;
        }

        if let Ok(timeout) = std::env::var("IRONSTOCK_REQUEST_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.remote.request_timeout_secs = secs,
                Err(_) => warn!(value = %timeout, "Ignoring invalid IRONSTOCK_REQUEST_TIMEOUT_SECS"),
            }
        }

        if let Ok(path) = std::env::var("IRONSTOCK_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.database_path = PathBuf::from(path);
        }

        if let Ok(ms) = std::env::var("IRONSTOCK_META_POLL_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                self.engine.meta_poll_interval_ms = ms;
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "ironstock", "ironstock")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }
}
