//! # Inventory Ledger
//!
//! Stock levels, pricing and transaction history for every tracked item
//! class, with the two mutating entry points (`add_stock`, `deduct_stock`)
//! and the sanitizing field setters.
//!
//! ## Mutation Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  add_stock / deduct_stock                               │
//! │                                                                         │
//! │   1. Sanitize inputs      NaN / negative → 0, prices → 2 decimals      │
//! │          │                                                              │
//! │          ▼                                                              │
//! │   2. No-op check          quantity == 0 && bundles == 0 → return       │
//! │          │                                                              │
//! │          ▼                                                              │
//! │   3. Guard (deduct only)  quantity/bundles > on hand → Err, no change  │
//! │          │                                                              │
//! │          ▼                                                              │
//! │   4. Compute              new average cost / profit                    │
//! │          │                                                              │
//! │          ▼                                                              │
//! │   5. Commit               item replaced, transaction prepended,        │
//! │                           history truncated to 500                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The ledger is generic over [`ItemClass`] groups: rods and cement share
//! one implementation in [`ItemGroup`].

use std::collections::BTreeMap;

use chrono::Utc;
use uuid::Uuid;

use crate::costing::{sale_profit, weighted_average_cost_price};
use crate::error::{CoreError, CoreResult};
use crate::money::{to_count, to_non_negative, Money};
use crate::types::{CementProduct, Item, ItemClass, RodSize, Transaction, TransactionType};

/// Maximum transactions kept per group; the oldest are evicted first.
pub const MAX_TRANSACTIONS: usize = 500;

// =============================================================================
// Inputs
// =============================================================================

/// Stock received.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockAddition {
    pub quantity: f64,
    /// Ignored for groups that do not track bundles.
    pub bundles: Option<f64>,
    pub unit_cost_price: f64,
}

impl StockAddition {
    pub fn new(quantity: f64, unit_cost_price: f64) -> Self {
        StockAddition {
            quantity,
            bundles: None,
            unit_cost_price,
        }
    }

    pub fn with_bundles(mut self, bundles: f64) -> Self {
        self.bundles = Some(bundles);
        self
    }
}

/// Stock sold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockDeduction {
    pub quantity: f64,
    /// Ignored for groups that do not track bundles.
    pub bundles: Option<f64>,
    /// Falls back to the item's current selling price when `None`.
    pub unit_selling_price: Option<f64>,
}

impl StockDeduction {
    pub fn new(quantity: f64) -> Self {
        StockDeduction {
            quantity,
            bundles: None,
            unit_selling_price: None,
        }
    }

    pub fn with_bundles(mut self, bundles: f64) -> Self {
        self.bundles = Some(bundles);
        self
    }

    pub fn at_price(mut self, unit_selling_price: f64) -> Self {
        self.unit_selling_price = Some(unit_selling_price);
        self
    }
}

// =============================================================================
// Item Group
// =============================================================================

/// Items and transaction history for one item-class group.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemGroup<C: ItemClass> {
    items: BTreeMap<C, Item>,
    /// Newest first.
    transactions: Vec<Transaction<C>>,
}

impl<C: ItemClass> Default for ItemGroup<C> {
    fn default() -> Self {
        ItemGroup {
            items: C::ALL.iter().map(|c| (*c, C::default_item())).collect(),
            transactions: Vec::new(),
        }
    }
}

impl<C: ItemClass> ItemGroup<C> {
    /// Builds a group from externally supplied parts.
    ///
    /// Classes missing from `items` get the zero-value item, bundle fields
    /// are normalized to the group's shape, and history is truncated to
    /// [`MAX_TRANSACTIONS`].
    pub fn from_parts(mut supplied: BTreeMap<C, Item>, mut transactions: Vec<Transaction<C>>) -> Self {
        let items = C::ALL
            .iter()
            .map(|class| {
                let mut item = supplied.remove(class).unwrap_or_else(C::default_item);
                item.bundles = if C::TRACKS_BUNDLES {
                    Some(item.bundle_count())
                } else {
                    None
                };
                (*class, item)
            })
            .collect();
        transactions.truncate(MAX_TRANSACTIONS);
        ItemGroup {
            items,
            transactions,
        }
    }

    /// Current state of one item.
    pub fn item(&self, class: C) -> &Item {
        // Every class is populated at construction and never removed.
        &self.items[&class]
    }

    /// All items, in class order.
    pub fn items(&self) -> &BTreeMap<C, Item> {
        &self.items
    }

    /// Transaction history, newest first.
    pub fn transactions(&self) -> &[Transaction<C>] {
        &self.transactions
    }

    /// Items at or below their low-stock threshold.
    pub fn low_stock(&self) -> Vec<C> {
        self.items
            .iter()
            .filter(|(_, item)| item.is_low_stock())
            .map(|(class, _)| *class)
            .collect()
    }

    /// Value of all stock on hand at average cost.
    pub fn stock_value(&self) -> Money {
        self.items.values().map(Item::stock_value).sum()
    }

    /// Sum of profit over the retained SALE history.
    pub fn realised_profit(&self) -> Money {
        self.transactions
            .iter()
            .filter(|tx| tx.kind == TransactionType::Sale)
            .map(|tx| tx.profit)
            .sum()
    }

    fn item_mut(&mut self, class: C) -> &mut Item {
        self.items.entry(class).or_insert_with(C::default_item)
    }

    fn sanitized_bundles(raw: Option<f64>) -> u32 {
        if C::TRACKS_BUNDLES {
            to_count(raw.unwrap_or(0.0))
        } else {
            0
        }
    }

    fn record(&mut self, transaction: Transaction<C>) {
        self.transactions.insert(0, transaction);
        self.transactions.truncate(MAX_TRANSACTIONS);
    }

    /// Adds stock and recomputes the weighted average cost.
    ///
    /// Returns the recorded transaction, or `None` for a no-op
    /// (quantity and bundles both zero after sanitizing).
    pub fn add_stock(&mut self, class: C, input: StockAddition) -> Option<&Transaction<C>> {
        let quantity = to_non_negative(input.quantity);
        let bundles = Self::sanitized_bundles(input.bundles);
        let unit_cost = Money::sanitized(input.unit_cost_price);
        if quantity == 0.0 && bundles == 0 {
            return None;
        }

        let item = self.item_mut(class);
        let average_cost_price = weighted_average_cost_price(
            item.quantity,
            item.average_cost_price.as_decimal(),
            quantity,
            unit_cost.as_decimal(),
        );
        item.quantity += quantity;
        item.average_cost_price = average_cost_price;
        if C::TRACKS_BUNDLES {
            item.bundles = Some(item.bundle_count() + bundles);
        }

        self.record(Transaction {
            id: Uuid::new_v4().to_string(),
            kind: TransactionType::Add,
            item: class,
            quantity,
            bundles: C::TRACKS_BUNDLES.then_some(bundles),
            unit_cost: Some(unit_cost),
            unit_price: None,
            profit: Money::ZERO,
            created_at: Utc::now(),
        });
        self.transactions.first()
    }

    /// Deducts stock for a sale.
    ///
    /// Fails with [`CoreError::InsufficientStock`] or
    /// [`CoreError::InsufficientBundles`] before touching any state. The
    /// average cost never changes here; the item's selling price becomes
    /// the price used for this sale.
    pub fn deduct_stock(
        &mut self,
        class: C,
        input: StockDeduction,
    ) -> CoreResult<Option<&Transaction<C>>> {
        let quantity = to_non_negative(input.quantity);
        let bundles = Self::sanitized_bundles(input.bundles);
        if quantity == 0.0 && bundles == 0 {
            return Ok(None);
        }

        let current = self.item(class);
        if quantity > current.quantity {
            return Err(CoreError::InsufficientStock {
                item: class.to_string(),
                available: current.quantity,
                requested: quantity,
            });
        }
        if bundles > current.bundle_count() {
            return Err(CoreError::InsufficientBundles {
                item: class.to_string(),
                available: current.bundle_count(),
                requested: bundles,
            });
        }

        let unit_price = match input.unit_selling_price {
            Some(raw) => Money::sanitized(raw),
            None => current.selling_price,
        };
        let unit_cost = current.average_cost_price;
        let profit = sale_profit(quantity, unit_price.as_decimal(), unit_cost.as_decimal());

        let item = self.item_mut(class);
        item.quantity -= quantity;
        if C::TRACKS_BUNDLES {
            item.bundles = Some(item.bundle_count() - bundles);
        }
        item.selling_price = unit_price;

        self.record(Transaction {
            id: Uuid::new_v4().to_string(),
            kind: TransactionType::Sale,
            item: class,
            quantity,
            bundles: C::TRACKS_BUNDLES.then_some(bundles),
            unit_cost: Some(unit_cost),
            unit_price: Some(unit_price),
            profit,
            created_at: Utc::now(),
        });
        Ok(self.transactions.first())
    }

    /// Replaces the average cost price. No transaction is recorded.
    pub fn set_average_cost_price(&mut self, class: C, value: f64) {
        self.item_mut(class).average_cost_price = Money::sanitized(value);
    }

    /// Replaces the default selling price. No transaction is recorded.
    pub fn set_selling_price(&mut self, class: C, value: f64) {
        self.item_mut(class).selling_price = Money::sanitized(value);
    }

    /// Replaces the low-stock threshold. No transaction is recorded.
    pub fn set_low_stock_threshold(&mut self, class: C, value: f64) {
        self.item_mut(class).low_stock_threshold = to_count(value);
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// The whole inventory: one [`ItemGroup`] per tracked item-class group.
///
/// ## Usage
/// ```rust
/// use ironstock_core::ledger::{Ledger, StockAddition, StockDeduction};
/// use ironstock_core::types::RodSize;
///
/// let mut ledger = Ledger::default();
/// ledger.add_stock(RodSize::Mm8, StockAddition::new(10.0, 100.0));
/// ledger.add_stock(RodSize::Mm8, StockAddition::new(10.0, 200.0));
/// assert_eq!(ledger.item(RodSize::Mm8).average_cost_price.cents(), 15000);
///
/// let err = ledger.deduct_stock(RodSize::Mm8, StockDeduction::new(21.0));
/// assert!(err.is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    rods: ItemGroup<RodSize>,
    cement: ItemGroup<CementProduct>,
}

impl Ledger {
    /// Builds a ledger from its groups.
    pub fn from_groups(rods: ItemGroup<RodSize>, cement: ItemGroup<CementProduct>) -> Self {
        Ledger { rods, cement }
    }

    pub fn rods(&self) -> &ItemGroup<RodSize> {
        &self.rods
    }

    pub fn rods_mut(&mut self) -> &mut ItemGroup<RodSize> {
        &mut self.rods
    }

    pub fn cement(&self) -> &ItemGroup<CementProduct> {
        &self.cement
    }

    pub fn cement_mut(&mut self) -> &mut ItemGroup<CementProduct> {
        &mut self.cement
    }

    /// Current state of one item of any group.
    pub fn item<C: ItemClass>(&self, class: C) -> &Item {
        C::group(self).item(class)
    }

    /// See [`ItemGroup::add_stock`].
    pub fn add_stock<C: ItemClass>(
        &mut self,
        class: C,
        input: StockAddition,
    ) -> Option<&Transaction<C>> {
        C::group_mut(self).add_stock(class, input)
    }

    /// See [`ItemGroup::deduct_stock`].
    pub fn deduct_stock<C: ItemClass>(
        &mut self,
        class: C,
        input: StockDeduction,
    ) -> CoreResult<Option<&Transaction<C>>> {
        C::group_mut(self).deduct_stock(class, input)
    }

    pub fn set_average_cost_price<C: ItemClass>(&mut self, class: C, value: f64) {
        C::group_mut(self).set_average_cost_price(class, value);
    }

    pub fn set_selling_price<C: ItemClass>(&mut self, class: C, value: f64) {
        C::group_mut(self).set_selling_price(class, value);
    }

    pub fn set_low_stock_threshold<C: ItemClass>(&mut self, class: C, value: f64) {
        C::group_mut(self).set_low_stock_threshold(class, value);
    }

    /// Discards all stock, pricing and history.
    pub fn reset(&mut self) {
        *self = Ledger::default();
    }

    /// Value of all stock on hand across groups.
    pub fn stock_value(&self) -> Money {
        self.rods.stock_value() + self.cement.stock_value()
    }

    /// Realised profit across groups.
    pub fn realised_profit(&self) -> Money {
        self.rods.realised_profit() + self.cement.realised_profit()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn stocked_8mm() -> Ledger {
        let mut ledger = Ledger::default();
        ledger.add_stock(RodSize::Mm8, StockAddition::new(10.0, 100.0));
        ledger.add_stock(RodSize::Mm8, StockAddition::new(10.0, 200.0));
        ledger
    }

    #[test]
    fn test_default_ledger() {
        let ledger = Ledger::default();
        assert_eq!(ledger.rods().items().len(), 3);
        assert_eq!(ledger.cement().items().len(), 2);
        assert_eq!(ledger.item(RodSize::Mm12).bundles, Some(0));
        assert_eq!(ledger.item(CementProduct::Ppc).bundles, None);
        assert!(ledger.rods().transactions().is_empty());
    }

    #[test]
    fn test_add_stock_weighted_average() {
        let ledger = stocked_8mm();
        let item = ledger.item(RodSize::Mm8);
        assert_eq!(item.average_cost_price.cents(), 15000);
        assert_eq!(item.quantity, 20.0);

        let txs = ledger.rods().transactions();
        assert_eq!(txs.len(), 2);
        assert!(txs.iter().all(|tx| tx.kind == TransactionType::Add));
        // Newest first
        assert_eq!(txs[0].unit_cost, Some(Money::from_decimal(200.0)));
        assert_eq!(txs[0].unit_price, None);
        assert_eq!(txs[0].profit, Money::ZERO);
    }

    #[test]
    fn test_add_stock_zero_is_noop() {
        let mut ledger = stocked_8mm();
        let before = ledger.clone();

        assert!(ledger
            .add_stock(RodSize::Mm8, StockAddition::new(0.0, 500.0))
            .is_none());
        assert!(ledger
            .add_stock(RodSize::Mm8, StockAddition::new(-3.0, 500.0).with_bundles(-1.0))
            .is_none());
        assert!(ledger
            .add_stock(RodSize::Mm8, StockAddition::new(f64::NAN, 1.0))
            .is_none());

        assert_eq!(ledger, before);
    }

    #[test]
    fn test_add_bundles_only() {
        let mut ledger = Ledger::default();
        let tx = ledger
            .add_stock(RodSize::Mm10, StockAddition::new(0.0, 0.0).with_bundles(2.4))
            .cloned()
            .unwrap();
        assert_eq!(tx.bundles, Some(2));
        assert_eq!(ledger.item(RodSize::Mm10).bundles, Some(2));
        assert_eq!(ledger.item(RodSize::Mm10).quantity, 0.0);
        assert_eq!(ledger.item(RodSize::Mm10).average_cost_price, Money::ZERO);
    }

    #[test]
    fn test_add_stock_sanitizes_cost() {
        let mut ledger = Ledger::default();
        ledger.add_stock(RodSize::Mm12, StockAddition::new(4.0, -50.0));
        assert_eq!(ledger.item(RodSize::Mm12).average_cost_price, Money::ZERO);

        ledger.add_stock(RodSize::Mm12, StockAddition::new(4.0, 10.456));
        // (4 × 0 + 4 × 10.46) / 8
        assert_eq!(ledger.item(RodSize::Mm12).average_cost_price.cents(), 523);
    }

    #[test]
    fn test_deduct_stock_profit() {
        let mut ledger = stocked_8mm();
        let tx = ledger
            .deduct_stock(RodSize::Mm8, StockDeduction::new(5.0).at_price(200.0))
            .unwrap()
            .cloned()
            .unwrap();

        assert_eq!(tx.kind, TransactionType::Sale);
        assert_eq!(tx.profit.cents(), 25000);
        assert_eq!(tx.unit_cost, Some(Money::from_decimal(150.0)));
        assert_eq!(tx.unit_price, Some(Money::from_decimal(200.0)));

        let item = ledger.item(RodSize::Mm8);
        assert_eq!(item.quantity, 15.0);
        assert_eq!(item.average_cost_price.cents(), 15000);
        assert_eq!(item.selling_price.cents(), 20000);
        assert_eq!(ledger.rods().transactions().len(), 3);
    }

    #[test]
    fn test_deduct_stock_at_average_cost_has_zero_profit() {
        let mut ledger = stocked_8mm();
        let tx = ledger
            .deduct_stock(RodSize::Mm8, StockDeduction::new(5.0).at_price(150.0))
            .unwrap()
            .cloned()
            .unwrap();
        assert_eq!(tx.profit, Money::ZERO);
        assert_eq!(ledger.item(RodSize::Mm8).quantity, 15.0);
    }

    #[test]
    fn test_deduct_defaults_to_current_selling_price() {
        let mut ledger = stocked_8mm();
        ledger.set_selling_price(RodSize::Mm8, 180.0);
        let tx = ledger
            .deduct_stock(RodSize::Mm8, StockDeduction::new(2.0))
            .unwrap()
            .cloned()
            .unwrap();
        assert_eq!(tx.unit_price, Some(Money::from_decimal(180.0)));
        assert_eq!(tx.profit.cents(), 6000);
    }

    #[test]
    fn test_deduct_more_than_available_leaves_state_unchanged() {
        let mut ledger = stocked_8mm();
        let before = ledger.clone();
        let before_json = format!("{:?}", ledger);

        let available = ledger.item(RodSize::Mm8).quantity;
        let err = ledger
            .deduct_stock(RodSize::Mm8, StockDeduction::new(available + 1.0).at_price(500.0))
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { .. }));
        assert_eq!(err.to_string(), "Cannot deduct more stock than available.");

        assert_eq!(ledger, before);
        assert_eq!(format!("{:?}", ledger), before_json);
    }

    #[test]
    fn test_deduct_more_bundles_than_available() {
        let mut ledger = Ledger::default();
        ledger.add_stock(
            RodSize::Mm10,
            StockAddition::new(100.0, 90.0).with_bundles(2.0),
        );
        let before = ledger.clone();

        let err = ledger
            .deduct_stock(RodSize::Mm10, StockDeduction::new(10.0).with_bundles(3.0))
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientBundles { available: 2, requested: 3, .. }));
        assert_eq!(ledger, before);

        ledger
            .deduct_stock(RodSize::Mm10, StockDeduction::new(10.0).with_bundles(2.0))
            .unwrap();
        assert_eq!(ledger.item(RodSize::Mm10).bundles, Some(0));
    }

    #[test]
    fn test_deduct_zero_is_noop() {
        let mut ledger = stocked_8mm();
        let before = ledger.clone();
        assert!(ledger
            .deduct_stock(RodSize::Mm8, StockDeduction::new(0.0).at_price(1.0))
            .unwrap()
            .is_none());
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_quantity_never_negative() {
        let mut ledger = Ledger::default();
        let steps: [(bool, f64); 8] = [
            (true, 5.0),
            (false, 3.0),
            (false, 3.0),
            (true, 1.5),
            (false, 3.5),
            (false, 0.1),
            (true, 2.0),
            (false, 2.0),
        ];
        for (add, qty) in steps {
            if add {
                ledger.add_stock(CementProduct::Opc, StockAddition::new(qty, 9.0));
            } else {
                let _ = ledger.deduct_stock(CementProduct::Opc, StockDeduction::new(qty));
            }
            assert!(ledger.item(CementProduct::Opc).quantity >= 0.0);
        }
    }

    #[test]
    fn test_cement_ignores_bundles() {
        let mut ledger = Ledger::default();
        assert!(ledger
            .add_stock(CementProduct::Ppc, StockAddition::new(0.0, 9.0).with_bundles(5.0))
            .is_none());

        let tx = ledger
            .add_stock(CementProduct::Ppc, StockAddition::new(50.0, 9.0).with_bundles(5.0))
            .cloned()
            .unwrap();
        assert_eq!(tx.bundles, None);
        assert_eq!(ledger.item(CementProduct::Ppc).bundles, None);
        assert_eq!(ledger.cement().transactions().len(), 1);
        assert!(ledger.rods().transactions().is_empty());
    }

    #[test]
    fn test_history_capped_at_max() {
        let mut ledger = Ledger::default();
        for _ in 0..(MAX_TRANSACTIONS + 20) {
            ledger.add_stock(RodSize::Mm8, StockAddition::new(1.0, 1.0));
        }
        assert_eq!(ledger.rods().transactions().len(), MAX_TRANSACTIONS);
        assert_eq!(ledger.item(RodSize::Mm8).quantity, (MAX_TRANSACTIONS + 20) as f64);
    }

    #[test]
    fn test_setters_sanitize_without_recording() {
        let mut ledger = Ledger::default();
        ledger.set_average_cost_price(RodSize::Mm8, 12.345);
        ledger.set_selling_price(CementProduct::Opc, -4.0);
        ledger.set_low_stock_threshold(RodSize::Mm8, 7.6);

        assert_eq!(ledger.item(RodSize::Mm8).average_cost_price.cents(), 1235);
        assert_eq!(ledger.item(CementProduct::Opc).selling_price, Money::ZERO);
        assert_eq!(ledger.item(RodSize::Mm8).low_stock_threshold, 8);
        assert!(ledger.rods().transactions().is_empty());
        assert!(ledger.cement().transactions().is_empty());
    }

    #[test]
    fn test_reset() {
        let mut ledger = stocked_8mm();
        ledger.reset();
        assert_eq!(ledger, Ledger::default());
    }

    #[test]
    fn test_from_parts_fills_and_normalizes() {
        let mut items = BTreeMap::new();
        items.insert(
            RodSize::Mm10,
            Item {
                quantity: 3.0,
                bundles: None,
                ..Item::default()
            },
        );
        let group = ItemGroup::from_parts(items, Vec::new());
        assert_eq!(group.items().len(), 3);
        assert_eq!(group.item(RodSize::Mm10).quantity, 3.0);
        assert_eq!(group.item(RodSize::Mm10).bundles, Some(0));
        assert_eq!(group.item(RodSize::Mm8), &RodSize::default_item());
    }

    #[test]
    fn test_reporting_helpers() {
        let mut ledger = stocked_8mm();
        ledger
            .deduct_stock(RodSize::Mm8, StockDeduction::new(5.0).at_price(200.0))
            .unwrap();

        assert_eq!(ledger.stock_value().cents(), 15.0 as i64 * 15000);
        assert_eq!(ledger.realised_profit().cents(), 25000);

        // 8mm has 15 on hand with threshold 10; everything else is empty
        let low = ledger.rods().low_stock();
        assert_eq!(low, vec![RodSize::Mm10, RodSize::Mm12]);
    }
}
