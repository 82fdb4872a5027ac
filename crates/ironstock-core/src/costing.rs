//! # Costing
//!
//! Weighted-average cost and sale profit. Both functions sanitize their
//! inputs, so callers may pass raw user numbers.

use crate::money::{round_money, to_non_negative, Money};

/// Weighted average unit cost after adding stock.
///
/// `(q1 × a1 + q2 × a2) / (q1 + q2)`, rounded to 2 decimals. Returns zero
/// when the resulting quantity is zero.
///
/// ```rust
/// use ironstock_core::costing::weighted_average_cost_price;
///
/// let avg = weighted_average_cost_price(10.0, 100.0, 10.0, 200.0);
/// assert_eq!(avg.cents(), 15000);
/// ```
pub fn weighted_average_cost_price(
    current_quantity: f64,
    current_average_cost_price: f64,
    added_quantity: f64,
    added_unit_cost_price: f64,
) -> Money {
    let current_quantity = to_non_negative(current_quantity);
    let current_average_cost_price = to_non_negative(current_average_cost_price);
    let added_quantity = to_non_negative(added_quantity);
    let added_unit_cost_price = to_non_negative(added_unit_cost_price);

    let new_quantity = current_quantity + added_quantity;
    if new_quantity == 0.0 {
        return Money::ZERO;
    }

    let total_cost =
        current_quantity * current_average_cost_price + added_quantity * added_unit_cost_price;

    Money::from_decimal(round_money(total_cost / new_quantity))
}

/// Profit of a sale: `(selling − cost) × quantity`, rounded to 2 decimals.
///
/// Negative when selling below cost.
pub fn sale_profit(quantity: f64, unit_selling_price: f64, unit_cost_price: f64) -> Money {
    let quantity = to_non_negative(quantity);
    let unit_selling_price = to_non_negative(unit_selling_price);
    let unit_cost_price = to_non_negative(unit_cost_price);

    Money::from_decimal(round_money((unit_selling_price - unit_cost_price) * quantity))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected_average(q1: f64, a1: f64, q2: f64, a2: f64) -> i64 {
        if q1 + q2 == 0.0 {
            return 0;
        }
        Money::from_decimal(round_money((q1 * a1 + q2 * a2) / (q1 + q2))).cents()
    }

    #[test]
    fn test_weighted_average_basic() {
        assert_eq!(weighted_average_cost_price(10.0, 100.0, 10.0, 200.0).cents(), 15000);
        assert_eq!(weighted_average_cost_price(0.0, 0.0, 5.0, 99.99).cents(), 9999);
        assert_eq!(weighted_average_cost_price(3.0, 10.0, 0.0, 50.0).cents(), 1000);
    }

    #[test]
    fn test_weighted_average_zero_total() {
        assert_eq!(weighted_average_cost_price(0.0, 120.0, 0.0, 80.0), Money::ZERO);
    }

    #[test]
    fn test_weighted_average_rounds_to_cents() {
        // (1 × 1 + 2 × 2) / 3 = 1.6666…
        assert_eq!(weighted_average_cost_price(1.0, 1.0, 2.0, 2.0).cents(), 167);
    }

    #[test]
    fn test_weighted_average_matches_formula_over_grid() {
        let values = [0.0, 0.5, 1.0, 3.0, 7.25, 120.0, 999.99];
        for &q1 in &values {
            for &a1 in &values {
                for &q2 in &values {
                    for &a2 in &values {
                        assert_eq!(
                            weighted_average_cost_price(q1, a1, q2, a2).cents(),
                            expected_average(q1, a1, q2, a2),
                            "q1={q1} a1={a1} q2={q2} a2={a2}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_weighted_average_sanitizes_inputs() {
        assert_eq!(
            weighted_average_cost_price(-5.0, 100.0, 10.0, f64::NAN),
            Money::ZERO
        );
    }

    #[test]
    fn test_sale_profit() {
        assert_eq!(sale_profit(5.0, 150.0, 100.0).cents(), 25000);
        assert_eq!(sale_profit(5.0, 150.0, 150.0), Money::ZERO);
        assert_eq!(sale_profit(2.0, 90.0, 100.0).cents(), -2000);
        assert_eq!(sale_profit(0.0, 500.0, 1.0), Money::ZERO);
    }

    #[test]
    fn test_sale_profit_matches_formula() {
        let values = [0.0, 0.25, 1.0, 4.0, 19.99, 150.0];
        for &q in &values {
            for &sp in &values {
                for &cp in &values {
                    let expected = Money::from_decimal(round_money((sp - cp) * q));
                    assert_eq!(sale_profit(q, sp, cp), expected);
                }
            }
        }
    }
}
