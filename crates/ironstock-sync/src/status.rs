//! # Sync Status Record
//!
//! The only user-visible channel for sync health. Persisted as JSON under
//! `hardware-stock-manager:syncStatus` and read back tolerantly: each field
//! that is missing or of the wrong type falls back to its default.
//!
//! ## Record
//! ```text
//! {
//!   "lastImportAt":        ISO-8601 | null,
//!   "lastExportAt":        ISO-8601 | null,
//!   "lastError":           string   | null,
//!   "lastErrorAt":         ISO-8601 | null,
//!   "consecutiveFailures": number,
//!   "lastRemoteUpdatedAt": marker   | null
//! }
//! ```

use chrono::{SecondsFormat, Utc};
use ironstock_db::SharedStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use ts_rs::TS;

use crate::error::SyncResult;
use crate::settings::SYNC_STATUS_KEY;

/// Current time in the record's timestamp format (millisecond precision).
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Persisted sync health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SyncStatus {
    pub last_import_at: Option<String>,
    pub last_export_at: Option<String>,
    pub last_error: Option<String>,
    pub last_error_at: Option<String>,
    pub consecutive_failures: u32,
    /// Last remote version marker seen.
    pub last_remote_updated_at: Option<String>,
}

impl SyncStatus {
    /// Field-by-field tolerant parse. Never fails.
    pub fn parse(raw: &str) -> Self {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(_) => return SyncStatus::default(),
        };

        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let consecutive_failures = value
            .get("consecutiveFailures")
            .and_then(Value::as_f64)
            .filter(|n| n.is_finite())
            .map(|n| n.clamp(0.0, u32::MAX as f64) as u32)
            .unwrap_or(0);

        SyncStatus {
            last_import_at: text("lastImportAt"),
            last_export_at: text("lastExportAt"),
            last_error: text("lastError"),
            last_error_at: text("lastErrorAt"),
            consecutive_failures,
            last_remote_updated_at: text("lastRemoteUpdatedAt"),
        }
    }

    /// Applies the fields present in `patch`.
    pub fn apply(&mut self, patch: SyncStatusPatch) {
        if let Some(v) = patch.last_import_at {
            self.last_import_at = v;
        }
        if let Some(v) = patch.last_export_at {
            self.last_export_at = v;
        }
        if let Some(v) = patch.last_error {
            self.last_error = v;
        }
        if let Some(v) = patch.last_error_at {
            self.last_error_at = v;
        }
        if let Some(v) = patch.consecutive_failures {
            self.consecutive_failures = v;
        }
        if let Some(v) = patch.last_remote_updated_at {
            self.last_remote_updated_at = v;
        }
    }
}

// =============================================================================
// Patch
// =============================================================================

/// Partial update. `None` leaves a field alone; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatusPatch {
    pub last_import_at: Option<Option<String>>,
    pub last_export_at: Option<Option<String>>,
    pub last_error: Option<Option<String>>,
    pub last_error_at: Option<Option<String>>,
    pub consecutive_failures: Option<u32>,
    pub last_remote_updated_at: Option<Option<String>>,
}

impl SyncStatusPatch {
    /// A failed import or export.
    pub fn failure(message: impl Into<String>, consecutive_failures: u32) -> Self {
        SyncStatusPatch {
            consecutive_failures: Some(consecutive_failures),
            ..Self::error(message)
        }
    }

    /// A failed poll: error text only, the failure count is left alone.
    pub fn error(message: impl Into<String>) -> Self {
        SyncStatusPatch {
            last_error: Some(Some(message.into())),
            last_error_at: Some(Some(now_iso())),
            ..Default::default()
        }
    }

    /// A successful import.
    pub fn imported(marker: Option<String>) -> Self {
        SyncStatusPatch {
            last_import_at: Some(Some(now_iso())),
            last_remote_updated_at: Some(marker),
            ..Self::cleared()
        }
    }

    /// A successful export.
    pub fn exported(marker: Option<String>) -> Self {
        SyncStatusPatch {
            last_export_at: Some(Some(now_iso())),
            last_remote_updated_at: Some(marker),
            ..Self::cleared()
        }
    }

    /// A newly observed remote marker.
    pub fn remote_marker(marker: impl Into<String>) -> Self {
        SyncStatusPatch {
            last_remote_updated_at: Some(Some(marker.into())),
            ..Default::default()
        }
    }

    fn cleared() -> Self {
        SyncStatusPatch {
            last_error: Some(None),
            last_error_at: Some(None),
            consecutive_failures: Some(0),
            ..Default::default()
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// Read-modify-write access to the persisted record.
#[derive(Clone)]
pub struct SyncStatusStore {
    kv: SharedStore,
}

impl SyncStatusStore {
    pub fn new(kv: SharedStore) -> Self {
        SyncStatusStore { kv }
    }

    pub async fn read(&self) -> SyncResult<SyncStatus> {
        Ok(self
            .kv
            .get(SYNC_STATUS_KEY)
            .await?
            .map(|raw| SyncStatus::parse(&raw))
            .unwrap_or_default())
    }

    pub async fn write(&self, status: &SyncStatus) -> SyncResult<()> {
        let raw = serde_json::to_string(status)?;
        self.kv.set(SYNC_STATUS_KEY, &raw).await?;
        Ok(())
    }

    /// Merges `patch` into the stored record and returns the result.
    pub async fn update(&self, patch: SyncStatusPatch) -> SyncResult<SyncStatus> {
        let mut status = self.read().await?;
        status.apply(patch);
        self.write(&status).await?;
        debug!(
            failures = status.consecutive_failures,
            last_error = ?status.last_error,
            "Sync status updated"
        );
        Ok(status)
    }

    /// Back to the all-default record.
    pub async fn reset(&self) -> SyncResult<()> {
        self.write(&SyncStatus::default()).await
    }
}
