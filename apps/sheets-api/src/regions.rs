//! Region shaping.
//!
//! Incoming snapshots are coerced field by field before they are stored, so
//! that whatever a client sends, an import always yields a well-formed
//! document: missing items get defaults, numbers that are not numbers become
//! 0, and unknown keys are dropped.
//!
//! ```text
//! export body ──► Items              {items, cementItems}
//!             ──► Transactions       [rod rows]
//!             ──► CementTransactions [cement rows]
//! ```

use ironstock_core::money::to_count;
use ironstock_core::{CementProduct, ItemClass, RodSize, DEFAULT_LOW_STOCK_THRESHOLD};
use serde_json::{json, Map, Value};

/// Number, numeric string, or 0.
fn to_number(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

fn to_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    }
}

fn nullable_number(value: Option<&Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::Null,
        Some(Value::String(s)) if s.is_empty() => Value::Null,
        value => json!(to_number(value)),
    }
}

fn item_row<C: ItemClass>(item: Option<&Value>) -> Value {
    let field = |name: &str| item.and_then(|item| item.get(name));

    let mut row = Map::new();
    row.insert("quantity".into(), json!(to_number(field("quantity"))));
    if C::TRACKS_BUNDLES {
        row.insert("bundles".into(), json!(to_count(to_number(field("bundles")))));
    }
    row.insert(
        "averageCostPrice".into(),
        json!(to_number(field("averageCostPrice"))),
    );
    row.insert("sellingPrice".into(), json!(to_number(field("sellingPrice"))));
    let threshold = match field("lowStockThreshold") {
        None | Some(Value::Null) => DEFAULT_LOW_STOCK_THRESHOLD,
        value => to_count(to_number(value)),
    };
    row.insert("lowStockThreshold".into(), json!(threshold));
    Value::Object(row)
}

/// Item map with every class of the group, coerced.
pub fn items<C: ItemClass>(value: Option<&Value>) -> Value {
    let items: Map<String, Value> = C::ALL
        .iter()
        .map(|class| {
            let item = value.and_then(|v| v.get(class.as_str())).filter(|v| v.is_object());
            (class.as_str().to_string(), item_row::<C>(item))
        })
        .collect();
    Value::Object(items)
}

/// Transaction rows for the group, coerced. A non-array is an empty list.
pub fn transactions<C: ItemClass>(value: Option<&Value>) -> Vec<Value> {
    let Some(list) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    list.iter()
        .map(|tx| {
            let field = |name: &str| tx.get(name);

            let mut row = Map::new();
            row.insert("id".into(), json!(to_text(field("id"))));
            row.insert("type".into(), json!(to_text(field("type"))));
            row.insert(
                C::REFERENCE_FIELD.into(),
                json!(to_text(field(C::REFERENCE_FIELD))),
            );
            row.insert("quantity".into(), json!(to_number(field("quantity"))));
            if C::TRACKS_BUNDLES {
                if let Some(bundles) = field("bundles").filter(|b| !b.is_null()) {
                    row.insert("bundles".into(), json!(to_count(to_number(Some(bundles)))));
                }
            }
            row.insert("unitCost".into(), nullable_number(field("unitCost")));
            row.insert("unitPrice".into(), nullable_number(field("unitPrice")));
            row.insert("profit".into(), json!(to_number(field("profit"))));
            row.insert("createdAt".into(), json!(to_text(field("createdAt"))));
            Value::Object(row)
        })
        .collect()
}

/// The three data regions of an export body.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRegions {
    pub items: Value,
    pub transactions: Vec<Value>,
    pub cement_transactions: Vec<Value>,
}

impl ExportRegions {
    pub fn from_body(body: &Value) -> Self {
        ExportRegions {
            items: json!({
                "items": items::<RodSize>(body.get("items")),
                "cementItems": items::<CementProduct>(body.get("cementItems")),
            }),
            transactions: transactions::<RodSize>(body.get("transactions")),
            cement_transactions: transactions::<CementProduct>(body.get("cementTransactions")),
        }
    }
}

/// Rebuilds the `data` object of an import from stored regions. Missing
/// regions read as defaults.
pub fn document(
    items_region: Option<&Value>,
    transactions_region: Option<&Value>,
    cement_transactions_region: Option<&Value>,
) -> Value {
    json!({
        "items": items::<RodSize>(items_region.and_then(|r| r.get("items"))),
        "transactions": transactions::<RodSize>(transactions_region),
        "cementItems": items::<CementProduct>(items_region.and_then(|r| r.get("cementItems"))),
        "cementTransactions": transactions::<CementProduct>(cement_transactions_region),
    })
}
