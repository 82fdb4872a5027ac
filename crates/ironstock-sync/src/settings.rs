//! # Durable Sync Settings
//!
//! The credential, the enabled flag, the pending-export slot and the manual
//! retry token. All of them live in the local key-value store so that an
//! operator (or another process sharing the store) can change them while
//! the engine runs; the engine re-reads them every second.
//!
//! ## Keys
//! ```text
//! hardware-stock-manager:syncToken              credential
//! hardware-stock-manager:autoSyncEnabled        "true" | "false" | absent
//! hardware-stock-manager:syncStatus             see status.rs
//! hardware-stock-manager:pendingExportPayload   snapshot awaiting export
//! hardware-stock-manager:syncRetryRequestedAt   millisecond timestamp
//! ```

use chrono::Utc;
use ironstock_db::KeyValueStore;
use tracing::info;

use crate::error::SyncResult;

pub const SYNC_TOKEN_KEY: &str = "hardware-stock-manager:syncToken";
pub const AUTO_SYNC_KEY: &str = "hardware-stock-manager:autoSyncEnabled";
pub const SYNC_STATUS_KEY: &str = "hardware-stock-manager:syncStatus";
pub const PENDING_EXPORT_KEY: &str = "hardware-stock-manager:pendingExportPayload";
pub const RETRY_REQUESTED_AT_KEY: &str = "hardware-stock-manager:syncRetryRequestedAt";

/// Enabled flag and credential, as last read from storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSettings {
    pub enabled: bool,
    pub token: String,
}

impl SyncSettings {
    /// Reads the settings. An absent enabled flag means "enabled if a token
    /// is present".
    pub async fn read(kv: &dyn KeyValueStore) -> SyncResult<Self> {
        let token = kv.get(SYNC_TOKEN_KEY).await?.unwrap_or_default();
        let enabled = match kv.get(AUTO_SYNC_KEY).await? {
            Some(raw) => raw == "true",
            None => !token.is_empty(),
        };
        Ok(SyncSettings { enabled, token })
    }

    /// Sync runs only when enabled with a non-empty credential.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.token.is_empty()
    }
}

/// Stores the credential and the enabled flag.
pub async fn write_settings(kv: &dyn KeyValueStore, token: &str, enabled: bool) -> SyncResult<()> {
    kv.set(SYNC_TOKEN_KEY, token).await?;
    kv.set(AUTO_SYNC_KEY, if enabled { "true" } else { "false" })
        .await?;
    info!(enabled, has_token = !token.is_empty(), "Sync settings saved");
    Ok(())
}

/// Bumps the retry-request token; the engine picks it up on its next
/// settings tick. Returns the new token.
pub async fn bump_retry_request(kv: &dyn KeyValueStore) -> SyncResult<String> {
    let mut stamp = Utc::now().timestamp_millis();
    // Two bumps within one millisecond must still differ
    if let Some(previous) = read_retry_request(kv).await? {
        if let Ok(previous) = previous.parse::<i64>() {
            stamp = stamp.max(previous + 1);
        }
    }
    let token = stamp.to_string();
    kv.set(RETRY_REQUESTED_AT_KEY, &token).await?;
    Ok(token)
}

pub async fn read_retry_request(kv: &dyn KeyValueStore) -> SyncResult<Option<String>> {
    Ok(kv.get(RETRY_REQUESTED_AT_KEY).await?.filter(|v| !v.is_empty()))
}

// =============================================================================
// Pending Export Slot
// =============================================================================

pub async fn read_pending_export(kv: &dyn KeyValueStore) -> SyncResult<Option<String>> {
    Ok(kv.get(PENDING_EXPORT_KEY).await?.filter(|v| !v.is_empty()))
}

pub async fn write_pending_export(kv: &dyn KeyValueStore, payload: &str) -> SyncResult<()> {
    kv.set(PENDING_EXPORT_KEY, payload).await?;
    Ok(())
}

pub async fn clear_pending_export(kv: &dyn KeyValueStore) -> SyncResult<()> {
    kv.remove(PENDING_EXPORT_KEY).await?;
    Ok(())
}
