//! # ironstock-core: Pure Inventory Logic for Ironstock
//!
//! Ledger of on-hand quantities, weighted-average costs, selling prices and
//! a capped transaction history for two item groups: iron rods (by size) and
//! cement (by product). Everything here is deterministic and free of I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Ironstock Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/agent (headless sync daemon)               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌──────────────────────┐  ┌───▼──────────────────────────────────┐    │
//! │  │  ironstock-sync      │  │  ironstock-db                        │    │
//! │  │  engine, backoff,    │  │  key-value store, persisted ledger   │    │
//! │  │  status, remote      │  │                                      │    │
//! │  └──────────┬───────────┘  └───┬──────────────────────────────────┘    │
//! │             │                  │                                        │
//! │  ┌──────────▼──────────────────▼──────────────────────────────────┐    │
//! │  │               ★ ironstock-core (THIS CRATE) ★                  │    │
//! │  │                                                                │    │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ │    │
//! │  │   │  money  │ │  types  │ │ costing │ │ ledger  │ │snapshot │ │    │
//! │  │   │  Money  │ │  Item   │ │ avg cost│ │ add /   │ │ payload │ │    │
//! │  │   │ rounding│ │  Tx<C>  │ │ profit  │ │ deduct  │ │ + check │ │    │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘ │    │
//! │  │                                                                │    │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS          │    │
//! │  └────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money in cents, sanitizers and half-up rounding
//! - [`types`] - Item classes, items and transactions
//! - [`costing`] - Weighted-average cost and sale profit
//! - [`ledger`] - Mutations with stock guards and history capping
//! - [`snapshot`] - The serialized ledger exchanged with storage and remote
//! - [`validation`] - Strict shape checks for remote payloads
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use ironstock_core::{Ledger, RodSize, StockAddition, StockDeduction};
//!
//! let mut ledger = Ledger::default();
//! ledger.add_stock(RodSize::Mm10, StockAddition::new(10.0, 100.0));
//! ledger.add_stock(RodSize::Mm10, StockAddition::new(10.0, 200.0));
//! assert_eq!(ledger.item(RodSize::Mm10).average_cost_price.cents(), 15000);
//!
//! let sale = ledger
//!     .deduct_stock(RodSize::Mm10, StockDeduction::new(5.0).at_price(200.0))
//!     .unwrap()
//!     .cloned()
//!     .unwrap();
//! assert_eq!(sale.profit.cents(), 25000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod costing;
pub mod error;
pub mod ledger;
pub mod money;
pub mod snapshot;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::{ItemGroup, Ledger, StockAddition, StockDeduction, MAX_TRANSACTIONS};
pub use money::Money;
pub use snapshot::LedgerSnapshot;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Key under which the ledger is persisted in the local key-value store.
///
/// Shared with the browser build, which writes the same key to
/// `localStorage`, so the value is fixed.
pub const LEDGER_STORAGE_KEY: &str = "hardware-stock-manager:v1";

/// Version tag written next to the persisted ledger state.
pub const LEDGER_STORAGE_VERSION: u32 = 1;
