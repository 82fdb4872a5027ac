//! # Ledger Store
//!
//! The single shared, persisted copy of the [`Ledger`].
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        LedgerStore                                      │
//! │                                                                         │
//! │  add_stock / deduct_stock / set_* / set_all / reset                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  clone of RwLock<Ledger> ── mutate (errors leave the original alone)  │
//! │       │                                                                 │
//! │       ├──► KeyValueStore  "hardware-stock-manager:v1"                  │
//! │       │         { "state": <snapshot>, "version": 1 }                  │
//! │       │                                                                 │
//! │       └──► swap into the RwLock, then watch::Sender<Arc<str>>          │
//! │                 (sync engine subscribes; fires only on real change)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Loading is tolerant: a missing or unreadable value yields the default
//! ledger, and a value written before cement existed yields an empty cement
//! group.

use std::sync::Arc;

use ironstock_core::{
    ItemClass, Ledger, LedgerSnapshot, StockAddition, StockDeduction, Transaction,
    LEDGER_STORAGE_KEY, LEDGER_STORAGE_VERSION,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::error::DbResult;
use crate::kv::SharedStore;

/// On-disk envelope around the snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedLedger {
    state: LedgerSnapshot,
    #[serde(default)]
    version: u32,
}

/// Shared ledger with write-through persistence and change notification.
pub struct LedgerStore {
    kv: SharedStore,
    ledger: RwLock<Ledger>,
    payload_tx: watch::Sender<Arc<str>>,
}

impl LedgerStore {
    /// Loads the persisted ledger (or the default one) from `kv`.
    pub async fn open(kv: SharedStore) -> DbResult<Self> {
        let ledger = match kv.get(LEDGER_STORAGE_KEY).await? {
            Some(raw) => match serde_json::from_str::<PersistedLedger>(&raw) {
                Ok(persisted) => {
                    debug!(version = persisted.version, "Loaded persisted ledger");
                    Ledger::from(persisted.state)
                }
                Err(e) => {
                    warn!(error = %e, "Persisted ledger unreadable, starting empty");
                    Ledger::default()
                }
            },
            None => {
                info!("No persisted ledger, starting empty");
                Ledger::default()
            }
        };

        let payload: Arc<str> = ledger.snapshot().to_payload()?.into();
        let (payload_tx, _) = watch::channel(payload);

        Ok(LedgerStore {
            kv,
            ledger: RwLock::new(ledger),
            payload_tx,
        })
    }

    /// Receiver that observes the canonical payload after every change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<str>> {
        self.payload_tx.subscribe()
    }

    /// Canonical payload of the current state.
    pub fn payload(&self) -> Arc<str> {
        self.payload_tx.borrow().clone()
    }

    /// Copy of the current ledger.
    pub async fn ledger(&self) -> Ledger {
        self.ledger.read().await.clone()
    }

    /// Snapshot of the current ledger.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.read().await.snapshot()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// See [`Ledger::add_stock`]. No-ops are not persisted.
    pub async fn add_stock<C: ItemClass>(
        &self,
        class: C,
        input: StockAddition,
    ) -> DbResult<Option<Transaction<C>>> {
        let mut current = self.ledger.write().await;
        let mut next = current.clone();
        let recorded = next.add_stock(class, input).cloned();
        if recorded.is_some() {
            self.commit(&mut current, next).await?;
        }
        Ok(recorded)
    }

    /// See [`Ledger::deduct_stock`]. A rejected deduction leaves both memory
    /// and storage untouched.
    pub async fn deduct_stock<C: ItemClass>(
        &self,
        class: C,
        input: StockDeduction,
    ) -> DbResult<Option<Transaction<C>>> {
        let mut current = self.ledger.write().await;
        let mut next = current.clone();
        let recorded = next.deduct_stock(class, input)?.cloned();
        if recorded.is_some() {
            self.commit(&mut current, next).await?;
        }
        Ok(recorded)
    }

    pub async fn set_average_cost_price<C: ItemClass>(&self, class: C, value: f64) -> DbResult<()> {
        self.mutate(|ledger| ledger.set_average_cost_price(class, value))
            .await
            .map(|_| ())
    }

    pub async fn set_selling_price<C: ItemClass>(&self, class: C, value: f64) -> DbResult<()> {
        self.mutate(|ledger| ledger.set_selling_price(class, value))
            .await
            .map(|_| ())
    }

    pub async fn set_low_stock_threshold<C: ItemClass>(&self, class: C, value: f64) -> DbResult<()> {
        self.mutate(|ledger| ledger.set_low_stock_threshold(class, value))
            .await
            .map(|_| ())
    }

    /// Replaces the whole ledger and returns the resulting payload.
    pub async fn set_all(&self, snapshot: LedgerSnapshot) -> DbResult<Arc<str>> {
        self.mutate(|ledger| ledger.set_all(snapshot)).await
    }

    /// Discards everything.
    pub async fn reset(&self) -> DbResult<()> {
        info!("Resetting ledger");
        self.mutate(Ledger::reset).await.map(|_| ())
    }

    async fn mutate(&self, f: impl FnOnce(&mut Ledger)) -> DbResult<Arc<str>> {
        let mut current = self.ledger.write().await;
        let mut next = current.clone();
        f(&mut next);
        self.commit(&mut current, next).await
    }

    /// Writes `next` through to storage, then swaps it in and publishes its
    /// payload. A failed write leaves memory and subscribers on `current`.
    async fn commit(&self, current: &mut Ledger, next: Ledger) -> DbResult<Arc<str>> {
        let state = next.snapshot();
        let payload: Arc<str> = state.to_payload()?.into();

        let persisted = serde_json::to_string(&PersistedLedger {
            state,
            version: LEDGER_STORAGE_VERSION,
        })?;
        self.kv.set(LEDGER_STORAGE_KEY, &persisted).await?;

        *current = next;
        self.payload_tx.send_if_modified(|published| {
            if **published == *payload {
                false
            } else {
                *published = payload.clone();
                true
            }
        });

        Ok(payload)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
