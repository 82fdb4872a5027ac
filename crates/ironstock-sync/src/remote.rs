//! # Remote Store Contract
//!
//! What the engine needs from the remote document store, and an in-process
//! implementation that echoes back whatever was last written.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  import(token)           → full snapshot JSON + version marker         │
//! │                            idempotent, safe to poll                     │
//! │  meta(token)             → version marker only (cheap)                 │
//! │  export(token, payload)  → writes every region, then stamps and        │
//! │                            returns a fresh marker                      │
//! │                                                                         │
//! │  Errors: SyncError::{Unauthorized, RateLimited, Server, Request,       │
//! │                      Network, Rejected}                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use ironstock_core::{Ledger, LedgerSnapshot};
use serde_json::Value;

use crate::error::{SyncError, SyncResult};

/// Opaque remote version marker (an ISO-8601 timestamp in practice).
pub type RemoteMarker = String;

/// Body of a successful import.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSnapshot {
    /// Unvalidated `data` object, if the response had one.
    pub data: Option<Value>,
    pub marker: Option<RemoteMarker>,
}

/// The remote document store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Reads the full snapshot and its marker.
    async fn import(&self, token: &str) -> SyncResult<RemoteSnapshot>;

    /// Reads only the version marker.
    async fn meta(&self, token: &str) -> SyncResult<Option<RemoteMarker>>;

    /// Writes the serialized snapshot; returns the new marker.
    async fn export(&self, token: &str, payload: &str) -> SyncResult<Option<RemoteMarker>>;
}

// =============================================================================
// In-memory Remote
// =============================================================================

#[derive(Debug, Default)]
struct Document {
    data: Option<Value>,
    marker: Option<DateTime<Utc>>,
}

/// Echo remote: `import` returns exactly what the last `export` wrote.
///
/// Failures can be queued per operation; each queued error is returned
/// once, in order, before normal behaviour resumes.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    token: Option<String>,
    document: Mutex<Document>,
    import_failures: Mutex<VecDeque<SyncError>>,
    export_failures: Mutex<VecDeque<SyncError>>,
    meta_failures: Mutex<VecDeque<SyncError>>,
    imports: AtomicUsize,
    exports: AtomicUsize,
    metas: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only `token` is accepted; anything else is a 401.
    pub fn with_token(token: impl Into<String>) -> Self {
        MemoryRemote {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Seeds the document as if `snapshot` had been exported.
    pub fn seeded(self, snapshot: &LedgerSnapshot) -> SyncResult<Self> {
        let value = serde_json::to_value(snapshot)?;
        {
            let mut document = self.lock_document()?;
            document.data = Some(value);
            document.marker = Some(Utc::now());
        }
        Ok(self)
    }

    pub fn fail_next_import(&self, err: SyncError) {
        if let Ok(mut queue) = self.import_failures.lock() {
            queue.push_back(err);
        }
    }

    pub fn fail_next_export(&self, err: SyncError) {
        if let Ok(mut queue) = self.export_failures.lock() {
            queue.push_back(err);
        }
    }

    pub fn fail_next_meta(&self, err: SyncError) {
        if let Ok(mut queue) = self.meta_failures.lock() {
            queue.push_back(err);
        }
    }

    /// Last written `data`, as stored.
    pub fn document(&self) -> Option<Value> {
        self.document.lock().ok().and_then(|d| d.data.clone())
    }

    /// Current marker, as returned by `meta`.
    pub fn marker(&self) -> Option<RemoteMarker> {
        self.document
            .lock()
            .ok()
            .and_then(|d| d.marker.map(format_marker))
    }

    /// Simulates a write from another client: replaces the document and
    /// stamps a fresh marker.
    pub fn overwrite(&self, snapshot: &LedgerSnapshot) -> SyncResult<RemoteMarker> {
        let value = serde_json::to_value(snapshot)?;
        self.store(value)
    }

    pub fn import_count(&self) -> usize {
        self.imports.load(Ordering::SeqCst)
    }

    pub fn export_count(&self) -> usize {
        self.exports.load(Ordering::SeqCst)
    }

    pub fn meta_count(&self) -> usize {
        self.metas.load(Ordering::SeqCst)
    }

    fn authorize(&self, token: &str) -> SyncResult<()> {
        match &self.token {
            Some(expected) if expected != token => Err(SyncError::Unauthorized {
                detail: Some("Unauthorized".to_string()),
            }),
            _ => Ok(()),
        }
    }

    fn lock_document(&self) -> SyncResult<std::sync::MutexGuard<'_, Document>> {
        self.document
            .lock()
            .map_err(|_| SyncError::ChannelError("remote document lock poisoned".into()))
    }

    fn next_failure(queue: &Mutex<VecDeque<SyncError>>) -> Option<SyncError> {
        queue.lock().ok().and_then(|mut q| q.pop_front())
    }

    fn store(&self, value: Value) -> SyncResult<RemoteMarker> {
        let mut document = self.lock_document()?;
        // Markers must differ even for writes within one millisecond
        let mut stamp = Utc::now();
        if let Some(previous) = document.marker {
            if stamp <= previous {
                stamp = previous + ChronoDuration::milliseconds(1);
            }
        }
        document.data = Some(value);
        document.marker = Some(stamp);
        Ok(format_marker(stamp))
    }
}

fn format_marker(stamp: DateTime<Utc>) -> RemoteMarker {
    stamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn import(&self, token: &str) -> SyncResult<RemoteSnapshot> {
        self.imports.fetch_add(1, Ordering::SeqCst);
        self.authorize(token)?;
        if let Some(err) = Self::next_failure(&self.import_failures) {
            return Err(err);
        }

        let document = self.lock_document()?;
        let data = match &document.data {
            Some(data) => data.clone(),
            // Never written: default items, empty histories
            None => serde_json::to_value(Ledger::default().snapshot())?,
        };
        Ok(RemoteSnapshot {
            data: Some(data),
            marker: document.marker.map(format_marker),
        })
    }

    async fn meta(&self, token: &str) -> SyncResult<Option<RemoteMarker>> {
        self.metas.fetch_add(1, Ordering::SeqCst);
        self.authorize(token)?;
        if let Some(err) = Self::next_failure(&self.meta_failures) {
            return Err(err);
        }
        Ok(self.lock_document()?.marker.map(format_marker))
    }

    async fn export(&self, token: &str, payload: &str) -> SyncResult<Option<RemoteMarker>> {
        self.exports.fetch_add(1, Ordering::SeqCst);
        self.authorize(token)?;
        if let Some(err) = Self::next_failure(&self.export_failures) {
            return Err(err);
        }

        let value: Value = serde_json::from_str(payload)
            .map_err(|_| SyncError::from_status(400, "memory://export", Some("Invalid JSON body".into()), None))?;
        if !value.is_object() {
            return Err(SyncError::from_status(
                400,
                "memory://export",
                Some("Invalid JSON body".into()),
                None,
            ));
        }
        self.store(value).map(Some)
    }
}
