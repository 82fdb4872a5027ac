//! # Error Types
//!
//! Domain-specific error types for ironstock-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  ironstock-core errors (this file)                                     │
//! │  ├── CoreError        - Ledger rule violations                         │
//! │  └── ValidationError  - Remote payload shape failures                  │
//! │                                                                         │
//! │  ironstock-db errors (separate crate)                                  │
//! │  └── DbError          - Local persistence failures                     │
//! │                                                                         │
//! │  ironstock-sync errors (separate crate)                                │
//! │  └── SyncError        - Absorbed into the sync status record           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the two deduction overflows are hard ledger errors. Every other bad
//! numeric input is sanitized to zero instead of rejected.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Ledger rule violations.
///
/// Raised synchronously by `deduct_stock` before any state changes, so a
/// caller that receives one can be sure the ledger is untouched.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Deduction quantity exceeds current stock.
    ///
    /// ## User Workflow
    /// ```text
    /// Record sale (8mm, qty: 25)
    ///      │
    ///      ▼
    /// Check stock: available=20
    ///      │
    ///      ▼
    /// InsufficientStock { item: "8mm", available: 20, requested: 25 }
    ///      │
    ///      ▼
    /// UI shows: "Cannot deduct more stock than available."
    /// ```
    #[error("Cannot deduct more stock than available.")]
    InsufficientStock {
        item: String,
        available: f64,
        requested: f64,
    },

    /// Deduction bundle count exceeds current bundles.
    #[error("Cannot deduct more bundles than available.")]
    InsufficientBundles {
        item: String,
        available: u32,
        requested: u32,
    },

    /// A size or product code that the ledger does not track.
    #[error("Unknown item class: {0}")]
    UnknownItemClass(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Shape validation failures for snapshots received from the remote store.
///
/// `field` is a dotted path into the payload, e.g. `transactions[3].unitCost`.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// A required field is missing.
    #[error("{field} is required")]
    Required { field: String },

    /// Field must be a JSON number.
    #[error("{field} must be a number")]
    NotANumber { field: String },

    /// Field must be a JSON string.
    #[error("{field} must be a string")]
    NotAString { field: String },

    /// Field must be a JSON object.
    #[error("{field} must be an object")]
    NotAnObject { field: String },

    /// Field must be a JSON array.
    #[error("{field} must be an array")]
    NotAnArray { field: String },

    /// Field must be a number or null.
    #[error("{field} must be a number or null")]
    NotANumberOrNull { field: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Invalid format (e.g., unparseable timestamp).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduction_messages() {
        let err = CoreError::InsufficientStock {
            item: "8mm".to_string(),
            available: 20.0,
            requested: 21.0,
        };
        assert_eq!(err.to_string(), "Cannot deduct more stock than available.");

        let err = CoreError::InsufficientBundles {
            item: "10mm".to_string(),
            available: 1,
            requested: 2,
        };
        assert_eq!(err.to_string(), "Cannot deduct more bundles than available.");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::NotANumber {
            field: "items.8mm.quantity".to_string(),
        };
        assert_eq!(err.to_string(), "items.8mm.quantity must be a number");

        let err = ValidationError::NotAllowed {
            field: "transactions[0].type".to_string(),
            allowed: vec!["ADD".to_string(), "SALE".to_string()],
        };
        assert!(err.to_string().contains("ADD"));
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "items".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
