//! # ironstock-db: Local Persistence for Ironstock
//!
//! Durable key-value storage and the persisted, observable ledger.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Ironstock Data Flow                              │
//! │                                                                         │
//! │  agent / sync engine                                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   ironstock-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  LedgerStore  │───►│ KeyValueStore │    │  Migrations  │  │   │
//! │  │   │ (shared state)│    │ Sqlite/Memory │    │  (embedded)  │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │                               │   │
//! │  └────────────────────────────────┼───────────────────────────────┘   │
//! │                                   ▼                                    │
//! │                     SQLite file (kv_store table)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ironstock_db::{Database, DbConfig, LedgerStore};
//!
//! let db = Database::new(DbConfig::new("ironstock.db")).await?;
//! let ledger = LedgerStore::open(Arc::new(db.kv())).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod kv;
pub mod ledger_store;
pub mod migrations;
pub mod pool;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use kv::{KeyValueStore, MemoryStore, SharedStore, SqliteStore};
pub use ledger_store::LedgerStore;
pub use pool::{Database, DbConfig};
