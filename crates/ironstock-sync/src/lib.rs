//! # ironstock-sync: Sync Engine for Ironstock
//!
//! Keeps a locally persisted ledger eventually consistent with a remote
//! document store, over an unreliable network.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Engine Architecture                        │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  SyncEngine (single coordinator task)            │  │
//! │  │                                                                  │  │
//! │  │  Owns in-flight guards, timers, failure count, last marker       │  │
//! │  │  Watches LedgerStore payloads; re-reads durable settings         │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  RemoteStore   │  │ SyncStatusStore│  │  Durable settings      │    │
//! │  │                │  │                │  │                        │    │
//! │  │ HttpRemote     │  │ lastImportAt   │  │ token, enabled flag    │    │
//! │  │ MemoryRemote   │  │ lastError ...  │  │ pending export slot    │    │
//! │  │                │  │                │  │ retry request token    │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  Failed exports are retried with exponential backoff plus jitter;     │
//! │  a 429 `retry-after` hint replaces the schedule.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`backoff`] - Retry delay calculation
//! - [`config`] - TOML/env configuration (remote URL, timings, db path)
//! - [`engine`] - `SyncEngine` coordinator and its handle
//! - [`error`] - Sync error types
//! - [`http`] - `RemoteStore` over the sheets REST API
//! - [`remote`] - `RemoteStore` trait and the in-memory echo remote
//! - [`settings`] - Durable keys: credential, enabled flag, pending slot
//! - [`status`] - Persisted sync status record
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ironstock_db::{Database, DbConfig, LedgerStore};
//! use ironstock_sync::{HttpRemote, SyncConfig, SyncEngine};
//!
//! let config = SyncConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new(&config.storage.database_path)).await?;
//! let kv = Arc::new(db.kv());
//! let ledger = Arc::new(LedgerStore::open(kv.clone()).await?);
//! let remote = Arc::new(HttpRemote::new(&config.remote)?);
//!
//! let engine = SyncEngine::spawn(&config.engine, ledger, kv, remote);
//! println!("{:?}", engine.status().await?);
//! engine.shutdown().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backoff;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod remote;
pub mod settings;
pub mod status;

// =============================================================================
// Re-exports
// =============================================================================

pub use backoff::{compute_backoff_ms, BackoffPolicy};
pub use config::{EngineSettings, RemoteSettings, StorageSettings, SyncConfig};
pub use engine::{SyncEngine, SyncEngineHandle};
pub use error::{SyncError, SyncResult};
pub use http::HttpRemote;
pub use remote::{MemoryRemote, RemoteMarker, RemoteSnapshot, RemoteStore};
pub use settings::{bump_retry_request, write_settings, SyncSettings};
pub use status::{SyncStatus, SyncStatusPatch, SyncStatusStore};
