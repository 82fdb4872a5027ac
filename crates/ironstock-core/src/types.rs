//! # Domain Types
//!
//! Core domain types used throughout Ironstock.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ItemClass (trait) ── one implementor per tracked item-class group     │
//! │  ├── RodSize        8mm | 10mm | 12mm    bundles ✓   key "size"        │
//! │  └── CementProduct  PPC | OPC            bundles ✗   key "product"     │
//! │                                                                         │
//! │  ┌─────────────────────┐        ┌──────────────────────────────┐       │
//! │  │        Item         │        │       Transaction<C>         │       │
//! │  │  ─────────────────  │        │  ──────────────────────────  │       │
//! │  │  quantity           │        │  id (UUID v4)                │       │
//! │  │  bundles?           │        │  type  ADD | SALE            │       │
//! │  │  averageCostPrice   │        │  <size|product>: C           │       │
//! │  │  sellingPrice       │        │  quantity, bundles?          │       │
//! │  │  lowStockThreshold  │        │  unitCost?, unitPrice?       │       │
//! │  └─────────────────────┘        │  profit, createdAt           │       │
//! │                                 └──────────────────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Field names on the wire are camelCase and match the remote document
//! format exactly, so a snapshot can be exported without a mapping layer.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{self, DeserializeOwned, IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ts_rs::TS;

use crate::error::CoreError;
use crate::ledger::{ItemGroup, Ledger};
use crate::money::{to_count, Money};

/// Default low-stock threshold for a freshly created item.
pub const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 10;

// =============================================================================
// Item Class
// =============================================================================

/// A group of tracked item classes (sizes of rod, cement products, ...).
///
/// The ledger is generic over this trait, so add/deduct/import logic is
/// written once and shared by every group.
pub trait ItemClass:
    Copy
    + Ord
    + Hash
    + fmt::Debug
    + fmt::Display
    + FromStr<Err = CoreError>
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Every member of the group, in display order.
    const ALL: &'static [Self];

    /// Name of the field that references this class in a transaction record.
    const REFERENCE_FIELD: &'static str;

    /// Whether items of this group carry a bundle count.
    const TRACKS_BUNDLES: bool;

    /// Wire name of this class ("8mm", "PPC", ...).
    fn as_str(&self) -> &'static str;

    /// The ledger group holding this class.
    fn group(ledger: &Ledger) -> &ItemGroup<Self>;

    /// Mutable access to the ledger group holding this class.
    fn group_mut(ledger: &mut Ledger) -> &mut ItemGroup<Self>;

    /// The zero-value item for this group.
    fn default_item() -> Item {
        Item {
            bundles: Self::TRACKS_BUNDLES.then_some(0),
            ..Item::default()
        }
    }
}

// =============================================================================
// Rod Size
// =============================================================================

/// Iron rod diameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum RodSize {
    #[serde(rename = "8mm")]
    Mm8,
    #[serde(rename = "10mm")]
    Mm10,
    #[serde(rename = "12mm")]
    Mm12,
}

impl ItemClass for RodSize {
    const ALL: &'static [Self] = &[RodSize::Mm8, RodSize::Mm10, RodSize::Mm12];
    const REFERENCE_FIELD: &'static str = "size";
    const TRACKS_BUNDLES: bool = true;

    fn as_str(&self) -> &'static str {
        match self {
            RodSize::Mm8 => "8mm",
            RodSize::Mm10 => "10mm",
            RodSize::Mm12 => "12mm",
        }
    }

    fn group(ledger: &Ledger) -> &ItemGroup<Self> {
        ledger.rods()
    }

    fn group_mut(ledger: &mut Ledger) -> &mut ItemGroup<Self> {
        ledger.rods_mut()
    }
}

impl fmt::Display for RodSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RodSize {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "8mm" => Ok(RodSize::Mm8),
            "10mm" => Ok(RodSize::Mm10),
            "12mm" => Ok(RodSize::Mm12),
            other => Err(CoreError::UnknownItemClass(other.to_string())),
        }
    }
}

// =============================================================================
// Cement Product
// =============================================================================

/// Cement grade sold in bags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum CementProduct {
    /// Portland Pozzolana Cement.
    #[serde(rename = "PPC")]
    Ppc,
    /// Ordinary Portland Cement.
    #[serde(rename = "OPC")]
    Opc,
}

impl ItemClass for CementProduct {
    const ALL: &'static [Self] = &[CementProduct::Ppc, CementProduct::Opc];
    const REFERENCE_FIELD: &'static str = "product";
    const TRACKS_BUNDLES: bool = false;

    fn as_str(&self) -> &'static str {
        match self {
            CementProduct::Ppc => "PPC",
            CementProduct::Opc => "OPC",
        }
    }

    fn group(ledger: &Ledger) -> &ItemGroup<Self> {
        ledger.cement()
    }

    fn group_mut(ledger: &mut Ledger) -> &mut ItemGroup<Self> {
        ledger.cement_mut()
    }
}

impl fmt::Display for CementProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CementProduct {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PPC" => Ok(CementProduct::Ppc),
            "OPC" => Ok(CementProduct::Opc),
            other => Err(CoreError::UnknownItemClass(other.to_string())),
        }
    }
}

// =============================================================================
// Item
// =============================================================================

/// Current stock level and pricing for one item class.
///
/// Every field defaults on deserialization, which makes persisted state
/// forward compatible: an older snapshot missing a field loads with the
/// zero value for that field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct Item {
    /// Stock on hand (kg, bags, ... as the caller chooses). Never negative.
    pub quantity: f64,

    /// Secondary unit count, only tracked for rod items.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de_optional_count"
    )]
    #[ts(optional)]
    pub bundles: Option<u32>,

    /// Weighted average cost, recomputed on every addition.
    #[ts(type = "number")]
    pub average_cost_price: Money,

    /// Default unit selling price, replaced by the price of the last sale.
    #[ts(type = "number")]
    pub selling_price: Money,

    /// Quantity at or below which the item counts as low stock.
    #[serde(deserialize_with = "de_count")]
    pub low_stock_threshold: u32,
}

impl Default for Item {
    fn default() -> Self {
        Item {
            quantity: 0.0,
            bundles: None,
            average_cost_price: Money::ZERO,
            selling_price: Money::ZERO,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }
}

impl Item {
    /// Bundle count, treating an absent count as zero.
    pub fn bundle_count(&self) -> u32 {
        self.bundles.unwrap_or(0)
    }

    /// Returns true if the item is at or below its low-stock threshold.
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= f64::from(self.low_stock_threshold)
    }

    /// Value of the stock on hand at average cost.
    pub fn stock_value(&self) -> Money {
        self.average_cost_price.times_quantity(self.quantity)
    }
}

fn de_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    f64::deserialize(deserializer).map(to_count)
}

fn de_optional_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Option::<f64>::deserialize(deserializer).map(|raw| raw.map(to_count))
}

// =============================================================================
// Transaction Type
// =============================================================================

/// Kind of stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum TransactionType {
    /// Stock received at a unit cost.
    Add,
    /// Stock sold at a unit price.
    Sale,
}

impl TransactionType {
    /// Wire name ("ADD" / "SALE").
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Add => "ADD",
            TransactionType::Sale => "SALE",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Immutable record of one stock movement.
///
/// The field naming the item class depends on the group (`size` for rods,
/// `product` for cement), so serde is implemented by hand around
/// [`ItemClass::REFERENCE_FIELD`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction<C> {
    /// Opaque unique token (UUID v4).
    pub id: String,

    /// ADD or SALE.
    pub kind: TransactionType,

    /// The item class this movement applies to.
    pub item: C,

    /// Quantity moved.
    pub quantity: f64,

    /// Bundles moved (rod groups only).
    pub bundles: Option<u32>,

    /// Unit cost: the purchase cost for ADD, the average cost at sale time for SALE.
    pub unit_cost: Option<Money>,

    /// Unit selling price; `None` for ADD.
    pub unit_price: Option<Money>,

    /// Realised profit; zero for ADD.
    pub profit: Money,

    /// When the movement was recorded.
    pub created_at: DateTime<Utc>,
}

impl<C: ItemClass> Serialize for Transaction<C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.bundles.is_some() { 9 } else { 8 };
        let mut state = serializer.serialize_struct("Transaction", len)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("type", &self.kind)?;
        state.serialize_field(C::REFERENCE_FIELD, &self.item)?;
        state.serialize_field("quantity", &self.quantity)?;
        if let Some(bundles) = self.bundles {
            state.serialize_field("bundles", &bundles)?;
        }
        state.serialize_field("unitCost", &self.unit_cost)?;
        state.serialize_field("unitPrice", &self.unit_price)?;
        state.serialize_field("profit", &self.profit)?;
        state.serialize_field("createdAt", &self.created_at)?;
        state.end()
    }
}

impl<'de, C: ItemClass> Deserialize<'de> for Transaction<C> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TransactionVisitor(PhantomData))
    }
}

struct TransactionVisitor<C>(PhantomData<C>);

impl<'de, C: ItemClass> Visitor<'de> for TransactionVisitor<C> {
    type Value = Transaction<C>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a transaction record keyed by `{}`", C::REFERENCE_FIELD)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut id: Option<String> = None;
        let mut kind: Option<TransactionType> = None;
        let mut item: Option<C> = None;
        let mut quantity: Option<f64> = None;
        let mut bundles: Option<u32> = None;
        // Outer Option tracks presence; null is a valid value for both.
        let mut unit_cost: Option<Option<Money>> = None;
        let mut unit_price: Option<Option<Money>> = None;
        let mut profit: Option<Money> = None;
        let mut created_at: Option<DateTime<Utc>> = None;

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "id" => id = Some(map.next_value()?),
                "type" => kind = Some(map.next_value()?),
                "quantity" => quantity = Some(map.next_value()?),
                "bundles" => {
                    bundles = map.next_value::<Option<f64>>()?.map(to_count);
                }
                "unitCost" => unit_cost = Some(map.next_value()?),
                "unitPrice" => unit_price = Some(map.next_value()?),
                "profit" => profit = Some(map.next_value()?),
                "createdAt" => created_at = Some(map.next_value()?),
                field if field == C::REFERENCE_FIELD => item = Some(map.next_value()?),
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        Ok(Transaction {
            id: id.ok_or_else(|| de::Error::missing_field("id"))?,
            kind: kind.ok_or_else(|| de::Error::missing_field("type"))?,
            item: item.ok_or_else(|| de::Error::missing_field(C::REFERENCE_FIELD))?,
            quantity: quantity.ok_or_else(|| de::Error::missing_field("quantity"))?,
            bundles: if C::TRACKS_BUNDLES { bundles } else { None },
            unit_cost: unit_cost.ok_or_else(|| de::Error::missing_field("unitCost"))?,
            unit_price: unit_price.ok_or_else(|| de::Error::missing_field("unitPrice"))?,
            profit: profit.ok_or_else(|| de::Error::missing_field("profit"))?,
            created_at: created_at.ok_or_else(|| de::Error::missing_field("createdAt"))?,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample_sale() -> Transaction<RodSize> {
        Transaction {
            id: "tx-1".to_string(),
            kind: TransactionType::Sale,
            item: RodSize::Mm10,
            quantity: 5.0,
            bundles: Some(1),
            unit_cost: Some(Money::from_decimal(150.0)),
            unit_price: Some(Money::from_decimal(200.0)),
            profit: Money::from_decimal(250.0),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_item_class_parsing() {
        assert_eq!("8mm".parse::<RodSize>().unwrap(), RodSize::Mm8);
        assert_eq!("12mm".parse::<RodSize>().unwrap(), RodSize::Mm12);
        assert!("16mm".parse::<RodSize>().is_err());
        assert_eq!("OPC".parse::<CementProduct>().unwrap(), CementProduct::Opc);
        assert!("ppc".parse::<CementProduct>().is_err());
    }

    #[test]
    fn test_default_items_per_group() {
        let rod = RodSize::default_item();
        assert_eq!(rod.bundles, Some(0));
        assert_eq!(rod.low_stock_threshold, 10);

        let cement = CementProduct::default_item();
        assert_eq!(cement.bundles, None);
        assert_eq!(cement.quantity, 0.0);
    }

    #[test]
    fn test_item_missing_fields_default() {
        let item: Item = serde_json::from_value(json!({ "quantity": 4 })).unwrap();
        assert_eq!(item.quantity, 4.0);
        assert_eq!(item.low_stock_threshold, DEFAULT_LOW_STOCK_THRESHOLD);
        assert_eq!(item.selling_price, Money::ZERO);
    }

    #[test]
    fn test_item_counts_are_sanitized_on_load() {
        let item: Item =
            serde_json::from_value(json!({ "bundles": 2.6, "lowStockThreshold": -3 })).unwrap();
        assert_eq!(item.bundles, Some(3));
        assert_eq!(item.low_stock_threshold, 0);
    }

    #[test]
    fn test_item_wire_format() {
        let item = Item {
            quantity: 20.0,
            bundles: Some(2),
            average_cost_price: Money::from_decimal(150.0),
            selling_price: Money::from_decimal(180.5),
            low_stock_threshold: 10,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(
            value,
            json!({
                "quantity": 20.0,
                "bundles": 2,
                "averageCostPrice": 150.0,
                "sellingPrice": 180.5,
                "lowStockThreshold": 10
            })
        );
    }

    #[test]
    fn test_low_stock() {
        let mut item = RodSize::default_item();
        item.quantity = 10.0;
        assert!(item.is_low_stock());
        item.quantity = 10.5;
        assert!(!item.is_low_stock());
    }

    #[test]
    fn test_transaction_uses_group_reference_field() {
        let value = serde_json::to_value(sample_sale()).unwrap();
        assert_eq!(value["size"], "10mm");
        assert_eq!(value["type"], "SALE");
        assert_eq!(value["unitCost"], 150.0);
        assert_eq!(value["createdAt"], "2024-05-01T10:30:00Z");
        assert!(value.get("product").is_none());

        let cement = Transaction {
            id: "tx-2".to_string(),
            kind: TransactionType::Add,
            item: CementProduct::Ppc,
            quantity: 50.0,
            bundles: None,
            unit_cost: Some(Money::from_decimal(9.5)),
            unit_price: None,
            profit: Money::ZERO,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap(),
        };
        let value = serde_json::to_value(cement).unwrap();
        assert_eq!(value["product"], "PPC");
        assert!(value["unitPrice"].is_null());
        assert!(value.get("bundles").is_none());
    }

    #[test]
    fn test_transaction_parses_back() {
        let tx = sample_sale();
        let text = serde_json::to_string(&tx).unwrap();
        let parsed: Transaction<RodSize> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, tx);
    }

    #[test]
    fn test_transaction_requires_unit_cost_key() {
        let value = json!({
            "id": "x",
            "type": "ADD",
            "size": "8mm",
            "quantity": 1,
            "unitPrice": null,
            "profit": 0,
            "createdAt": "2024-05-01T10:30:00Z"
        });
        let err = serde_json::from_value::<Transaction<RodSize>>(value).unwrap_err();
        assert!(err.to_string().contains("unitCost"));
    }

    #[test]
    fn test_cement_transaction_ignores_bundles() {
        let value = json!({
            "id": "x",
            "type": "ADD",
            "product": "OPC",
            "quantity": 1,
            "bundles": 4,
            "unitCost": 9,
            "unitPrice": null,
            "profit": 0,
            "createdAt": "2024-05-01T10:30:00Z"
        });
        let parsed: Transaction<CementProduct> = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.bundles, None);
        assert_eq!(parsed.item, CementProduct::Opc);
    }
}
