//! # Ledger Snapshot
//!
//! The unit of export, import and local persistence.
//!
//! ## Wire Format
//! ```text
//! {
//!   "items":              { "8mm": Item, "10mm": Item, "12mm": Item },
//!   "transactions":       [ Transaction<RodSize>, ... ],     newest first
//!   "cementItems":        { "PPC": Item, "OPC": Item },      optional on input
//!   "cementTransactions": [ Transaction<CementProduct>, ... ] optional on input
//! }
//! ```
//!
//! Serialization is deterministic (ordered maps, fixed field order), so two
//! snapshots of equal ledgers produce byte-identical payloads. The sync
//! engine relies on this for change detection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ledger::{ItemGroup, Ledger};
use crate::types::{CementProduct, Item, RodSize, Transaction};
use crate::validation::validate_snapshot;

/// Serialized form of a [`Ledger`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub items: BTreeMap<RodSize, Item>,

    #[serde(default)]
    pub transactions: Vec<Transaction<RodSize>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cement_items: Option<BTreeMap<CementProduct, Item>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cement_transactions: Option<Vec<Transaction<CementProduct>>>,
}

impl LedgerSnapshot {
    /// Serializes to the canonical JSON payload.
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses a payload received from the remote store.
    ///
    /// Unlike plain deserialization this is strict: every rod item and every
    /// transaction must be complete and well-typed, and the cement fields
    /// are checked whenever they are present.
    pub fn from_remote(value: serde_json::Value) -> Result<Self, ValidationError> {
        validate_snapshot(&value)?;
        serde_json::from_value(value).map_err(|e| ValidationError::InvalidFormat {
            field: "data".to_string(),
            reason: e.to_string(),
        })
    }
}

impl From<&Ledger> for LedgerSnapshot {
    fn from(ledger: &Ledger) -> Self {
        LedgerSnapshot {
            items: ledger.rods().items().clone(),
            transactions: ledger.rods().transactions().to_vec(),
            cement_items: Some(ledger.cement().items().clone()),
            cement_transactions: Some(ledger.cement().transactions().to_vec()),
        }
    }
}

impl From<LedgerSnapshot> for Ledger {
    /// Full replacement semantics: missing items default, missing cement
    /// data means an empty cement group, history is capped.
    fn from(snapshot: LedgerSnapshot) -> Self {
        Ledger::from_groups(
            ItemGroup::from_parts(snapshot.items, snapshot.transactions),
            ItemGroup::from_parts(
                snapshot.cement_items.unwrap_or_default(),
                snapshot.cement_transactions.unwrap_or_default(),
            ),
        )
    }
}

impl Ledger {
    /// Full snapshot of the current state.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::from(self)
    }

    /// Replaces the whole ledger from an external snapshot. No merge.
    pub fn set_all(&mut self, snapshot: LedgerSnapshot) {
        *self = Ledger::from(snapshot);
    }
}
