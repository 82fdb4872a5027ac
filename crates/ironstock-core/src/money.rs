//! # Money Module
//!
//! Provides the `Money` type and the numeric sanitizers every ledger input
//! passes through.
//!
//! ## Two-Decimal Money
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  WIRE (JSON number)          IN MEMORY (i64 cents)         WIRE         │
//! │                                                                         │
//! │   150.5  ── from_decimal ──►  Money(15050)  ── serialize ──►  150.5     │
//! │   10.005 ── round_money  ──►  Money(1001)                               │
//! │   NaN    ── round_money  ──►  Money(0)                                  │
//! │                                                                         │
//! │  Every price that enters the ledger is rounded to 2 decimals exactly   │
//! │  once, on the way in. Arithmetic after that happens on integer cents.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use ironstock_core::money::Money;
//!
//! let price = Money::from_decimal(10.99);
//! assert_eq!(price.cents(), 1099);
//! assert_eq!(price.to_string(), "10.99");
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

// =============================================================================
// Numeric Sanitizers
// =============================================================================

/// Coerces a raw number to a non-negative finite value.
///
/// Non-finite input (NaN, ±∞) becomes `0`, negatives are clamped to `0`.
#[inline]
pub fn to_non_negative(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.max(0.0)
}

/// Rounds a raw number to 2 decimal places. Non-finite input becomes `0`.
///
/// Halves round toward positive infinity (`-0.125` → `-0.12`), which keeps
/// stored values identical to those produced by the web client.
#[inline]
pub fn round_money(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    round_half_up(value * 100.0) / 100.0
}

/// Sanitizes a count (bundles, thresholds): non-negative, rounded to an integer.
#[inline]
pub fn to_count(value: f64) -> u32 {
    let rounded = round_half_up(to_non_negative(value));
    if rounded >= u32::MAX as f64 {
        u32::MAX
    } else {
        rounded as u32
    }
}

#[inline]
fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary amount with 2-decimal precision, held as integer cents.
///
/// Signed: sale profit is negative when an item is sold below its average
/// cost. Prices and costs stored on items are always non-negative because
/// the ledger sanitizes them before constructing a `Money`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    /// Zero money value.
    pub const ZERO: Money = Money(0);

    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from a decimal amount, rounding to 2 decimals.
    ///
    /// ```rust
    /// use ironstock_core::money::Money;
    ///
    /// assert_eq!(Money::from_decimal(99.999).cents(), 10000);
    /// assert_eq!(Money::from_decimal(f64::NAN), Money::ZERO);
    /// ```
    pub fn from_decimal(value: f64) -> Self {
        if !value.is_finite() {
            return Money::ZERO;
        }
        Money(round_half_up(value * 100.0) as i64)
    }

    /// Creates a non-negative Money value from untrusted input.
    ///
    /// This is the sanitizer applied to every price entering the ledger.
    #[inline]
    pub fn sanitized(value: f64) -> Self {
        Money::from_decimal(to_non_negative(value))
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the value as a decimal amount (for arithmetic with quantities).
    #[inline]
    pub fn as_decimal(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a (possibly fractional) quantity,
    /// rounding the result to cents.
    pub fn times_quantity(&self, quantity: f64) -> Money {
        Money::from_decimal(self.as_decimal() * quantity)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

// =============================================================================
// Serde: decimal JSON numbers on the wire
// =============================================================================

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_decimal())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Ok(Money::from_decimal(raw))
    }
}

// =============================================================================
// Arithmetic
// =============================================================================

impl Add for Money {
    type Output = Money;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Money;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
