//! # Validation Module
//!
//! Shape validation for snapshots received from the remote store.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Import Validation                                  │
//! │                                                                         │
//! │  Remote JSON `data`                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  items               every rod size present, 4 numeric fields each     │
//! │  transactions        array; id, type, size, quantity, unitCost,        │
//! │                      unitPrice, profit, createdAt all well-typed       │
//! │  cementItems?        checked only when the key is present              │
//! │  cementTransactions? checked only when the key is present              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Ok → safe to hand to Ledger::set_all                                  │
//! │  Err(ValidationError) → nothing is applied                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Local persistence is lenient (missing fields default). Remote documents
//! are checked here in full before anything reaches the ledger.

use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::types::{CementProduct, ItemClass, RodSize};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const ITEM_NUMBER_FIELDS: [&str; 4] = [
    "quantity",
    "averageCostPrice",
    "sellingPrice",
    "lowStockThreshold",
];

const TRANSACTION_TYPES: [&str; 2] = ["ADD", "SALE"];

/// Validates the `data` object of an import response.
///
/// ## Example
/// ```rust
/// use ironstock_core::validation::validate_snapshot;
/// use serde_json::json;
///
/// assert!(validate_snapshot(&json!({ "items": {}, "transactions": [] })).is_err());
/// ```
pub fn validate_snapshot(data: &Value) -> ValidationResult<()> {
    let data = as_object(data, "data")?;

    validate_items::<RodSize>(required(data, "items", "items")?, "items")?;
    validate_transactions::<RodSize>(
        required(data, "transactions", "transactions")?,
        "transactions",
    )?;

    if let Some(items) = data.get("cementItems") {
        validate_items::<CementProduct>(items, "cementItems")?;
    }
    if let Some(transactions) = data.get("cementTransactions") {
        validate_transactions::<CementProduct>(transactions, "cementTransactions")?;
    }

    Ok(())
}

/// Validates an item map: every class of the group present and complete.
pub fn validate_items<C: ItemClass>(value: &Value, field: &str) -> ValidationResult<()> {
    let items = as_object(value, field)?;
    for class in C::ALL {
        let path = format!("{}.{}", field, class.as_str());
        let item = as_object(required(items, class.as_str(), &path)?, &path)?;
        for name in ITEM_NUMBER_FIELDS {
            let field_path = format!("{}.{}", path, name);
            expect_number(required(item, name, &field_path)?, &field_path)?;
        }
    }
    Ok(())
}

/// Validates a transaction array for one group.
pub fn validate_transactions<C: ItemClass>(value: &Value, field: &str) -> ValidationResult<()> {
    let list = value.as_array().ok_or_else(|| ValidationError::NotAnArray {
        field: field.to_string(),
    })?;

    for (index, entry) in list.iter().enumerate() {
        let path = format!("{}[{}]", field, index);
        let tx = as_object(entry, &path)?;
        let at = |name: &str| format!("{}.{}", path, name);

        expect_string(required(tx, "id", &at("id"))?, &at("id"))?;

        let kind = expect_string(required(tx, "type", &at("type"))?, &at("type"))?;
        if !TRANSACTION_TYPES.contains(&kind) {
            return Err(ValidationError::NotAllowed {
                field: at("type"),
                allowed: TRANSACTION_TYPES.iter().map(|s| s.to_string()).collect(),
            });
        }

        let reference = at(C::REFERENCE_FIELD);
        let class = expect_string(required(tx, C::REFERENCE_FIELD, &reference)?, &reference)?;
        if class.parse::<C>().is_err() {
            return Err(ValidationError::NotAllowed {
                field: reference,
                allowed: C::ALL.iter().map(|c| c.as_str().to_string()).collect(),
            });
        }

        expect_number(required(tx, "quantity", &at("quantity"))?, &at("quantity"))?;
        expect_number_or_null(required(tx, "unitCost", &at("unitCost"))?, &at("unitCost"))?;
        expect_number_or_null(required(tx, "unitPrice", &at("unitPrice"))?, &at("unitPrice"))?;
        expect_number(required(tx, "profit", &at("profit"))?, &at("profit"))?;
        expect_string(required(tx, "createdAt", &at("createdAt"))?, &at("createdAt"))?;
    }
    Ok(())
}

// =============================================================================
// Primitive checks
// =============================================================================

fn as_object<'a>(value: &'a Value, field: &str) -> ValidationResult<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| ValidationError::NotAnObject {
        field: field.to_string(),
    })
}

fn required<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    field: &str,
) -> ValidationResult<&'a Value> {
    object.get(key).ok_or_else(|| ValidationError::Required {
        field: field.to_string(),
    })
}

fn expect_number(value: &Value, field: &str) -> ValidationResult<()> {
    if value.is_number() {
        Ok(())
    } else {
        Err(ValidationError::NotANumber {
            field: field.to_string(),
        })
    }
}

fn expect_number_or_null(value: &Value, field: &str) -> ValidationResult<()> {
    if value.is_number() || value.is_null() {
        Ok(())
    } else {
        Err(ValidationError::NotANumberOrNull {
            field: field.to_string(),
        })
    }
}

fn expect_string<'a>(value: &'a Value, field: &str) -> ValidationResult<&'a str> {
    value.as_str().ok_or_else(|| ValidationError::NotAString {
        field: field.to_string(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
