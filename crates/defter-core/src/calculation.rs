//! # Line Calculator
//!
//! Derives every monetary field of one invoice line, and re-sums header
//! totals from the active line set.
//!
//! ## Derivation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  quantity × unit_price ──► gross             round(2)                   │
//! │  gross × discount% ──────► discount_amount   round(2)                   │
//! │  gross − discount ───────► net (matrah)      exact                      │
//! │  net × vat% ─────────────► vat               round(2)                   │
//! │  vat × withholding% ─────► withholding       round(2)                   │
//! │  net + vat ──────────────► grand_total       exact                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every intermediate is rounded before the next step uses it, so rounding
//! compounds exactly as listed. Withholding never reduces the grand total;
//! it reduces the payable balance on the header.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::{round_amount, Precision};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

// =============================================================================
// Line
// =============================================================================

/// Normalized inputs of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInput {
    quantity: Decimal,
    unit_price: Decimal,
    vat_rate: i32,
    discount_rate: Decimal,
    withholding_rate: i32,
}

impl LineInput {
    /// Normalizes raw inputs: absolute quantity rounded to 3 places, unit
    /// price to 4 places, discount rate to 2 places.
    pub fn new(
        quantity: Decimal,
        unit_price: Decimal,
        vat_rate: i32,
        discount_rate: Decimal,
        withholding_rate: i32,
    ) -> Self {
        LineInput {
            quantity: Precision::Quantity.round(quantity.abs()),
            unit_price: Precision::UnitPrice.round(unit_price),
            vat_rate,
            discount_rate: Precision::Percent.round(discount_rate),
            withholding_rate,
        }
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn vat_rate(&self) -> i32 {
        self.vat_rate
    }

    pub fn discount_rate(&self) -> Decimal {
        self.discount_rate
    }

    pub fn withholding_rate(&self) -> i32 {
        self.withholding_rate
    }
}

/// Derived amounts of one line, all 2 places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineAmounts {
    pub gross: Decimal,
    pub discount_amount: Decimal,
    pub net: Decimal,
    pub vat: Decimal,
    pub withholding_rate: i32,
    pub withholding_amount: Decimal,
    pub grand_total: Decimal,
}

/// Runs the line derivation. Pure and deterministic.
pub fn calculate_line(input: &LineInput) -> LineAmounts {
    let gross = round_amount(input.quantity * input.unit_price);
    let discount_amount = round_amount(gross * input.discount_rate / HUNDRED);
    let net = gross - discount_amount;
    let vat = round_amount(net * Decimal::from(input.vat_rate) / HUNDRED);
    let withholding_amount = round_amount(vat * Decimal::from(input.withholding_rate) / HUNDRED);
    let grand_total = net + vat;

    LineAmounts {
        gross,
        discount_amount,
        net,
        vat,
        withholding_rate: input.withholding_rate,
        withholding_amount,
        grand_total,
    }
}

// =============================================================================
// Header Totals
// =============================================================================

/// Header totals derived from the active lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceTotals {
    /// Σ gross before discount.
    pub total_line_gross: Decimal,
    pub total_discount: Decimal,
    /// Σ net (matrah).
    pub total_net: Decimal,
    pub total_vat: Decimal,
    pub total_withholding: Decimal,
    /// total_net + total_vat.
    pub total_gross: Decimal,
    /// total_gross − total_withholding, before payments.
    pub balance: Decimal,
}

impl InvoiceTotals {
    /// Re-sums totals from scratch over the given active lines.
    ///
    /// Never adjust totals incrementally; always call this with the full
    /// active line set after a mutation.
    pub fn from_lines<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a LineAmounts>,
    {
        let mut totals = InvoiceTotals::default();
        for line in lines {
            totals.total_line_gross += line.gross;
            totals.total_discount += line.discount_amount;
            totals.total_net += line.net;
            totals.total_vat += line.vat;
            totals.total_withholding += line.withholding_amount;
        }

        totals.total_line_gross = round_amount(totals.total_line_gross);
        totals.total_discount = round_amount(totals.total_discount);
        totals.total_net = round_amount(totals.total_net);
        totals.total_vat = round_amount(totals.total_vat);
        totals.total_withholding = round_amount(totals.total_withholding);
        totals.total_gross = totals.total_net + totals.total_vat;
        totals.balance = totals.total_gross - totals.total_withholding;
        totals
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_simple_sales_line() {
        let line = calculate_line(&LineInput::new(dec!(1.000), dec!(100.0000), 20, dec!(0), 0));

        assert_eq!(line.gross, dec!(100.00));
        assert_eq!(line.discount_amount, dec!(0.00));
        assert_eq!(line.net, dec!(100.00));
        assert_eq!(line.vat, dec!(20.00));
        assert_eq!(line.withholding_amount, dec!(0.00));
        assert_eq!(line.grand_total, dec!(120.00));

        let totals = InvoiceTotals::from_lines([&line]);
        assert_eq!(totals.total_gross, dec!(120.00));
        assert_eq!(totals.balance, dec!(120.00));
    }

    #[test]
    fn test_discount_and_withholding_line() {
        let line = calculate_line(&LineInput::new(dec!(2.000), dec!(100.0000), 18, dec!(10), 50));

        assert_eq!(line.gross, dec!(200.00));
        assert_eq!(line.discount_amount, dec!(20.00));
        assert_eq!(line.net, dec!(180.00));
        assert_eq!(line.vat, dec!(32.40));
        assert_eq!(line.withholding_rate, 50);
        assert_eq!(line.withholding_amount, dec!(16.20));
        assert_eq!(line.grand_total, dec!(212.40));

        let totals = InvoiceTotals::from_lines([&line]);
        assert_eq!(totals.total_withholding, dec!(16.20));
        assert_eq!(totals.balance, dec!(196.20));
    }

    #[test]
    fn test_rounding_compounds_per_step() {
        // 3 × 0.3333 = 0.9999 → 1.00; 1.00 × 18% = 0.18
        let line = calculate_line(&LineInput::new(dec!(3), dec!(0.3333), 18, dec!(0), 0));
        assert_eq!(line.gross, dec!(1.00));
        assert_eq!(line.vat, dec!(0.18));

        // discount of 33.33% on 10.00 → 3.333 → 3.33
        let line = calculate_line(&LineInput::new(dec!(1), dec!(10), 0, dec!(33.33), 0));
        assert_eq!(line.discount_amount, dec!(3.33));
        assert_eq!(line.net, dec!(6.67));
    }

    #[test]
    fn test_midpoint_rounds_away_from_zero() {
        // 0.5 × 0.25 = 0.125 → 0.13
        let line = calculate_line(&LineInput::new(dec!(0.5), dec!(0.25), 0, dec!(0), 0));
        assert_eq!(line.gross, dec!(0.13));
    }

    #[test]
    fn test_input_normalization() {
        let input = LineInput::new(dec!(-2.0004), dec!(1.23456), 20, dec!(12.345), 0);
        assert_eq!(input.quantity(), dec!(2.000));
        assert_eq!(input.unit_price(), dec!(1.2346));
        assert_eq!(input.discount_rate(), dec!(12.35));
    }

    #[test]
    fn test_empty_totals_are_zero() {
        let totals = InvoiceTotals::from_lines(std::iter::empty());
        assert_eq!(totals, InvoiceTotals::default());
        assert!(totals.balance.is_zero());
    }

    fn quantity() -> impl Strategy<Value = Decimal> {
        (0i64..10_000_000).prop_map(|v| Decimal::new(v, 3))
    }

    fn unit_price() -> impl Strategy<Value = Decimal> {
        (0i64..100_000_000).prop_map(|v| Decimal::new(v, 4))
    }

    fn percent() -> impl Strategy<Value = Decimal> {
        (0i64..=10_000).prop_map(|v| Decimal::new(v, 2))
    }

    proptest! {
        #[test]
        fn prop_calculation_is_deterministic(
            qty in quantity(),
            price in unit_price(),
            vat in 0i32..=100,
            discount in percent(),
            withholding in 0i32..=100,
        ) {
            let input = LineInput::new(qty, price, vat, discount, withholding);
            let first = calculate_line(&input);
            let second = calculate_line(&input);
            prop_assert_eq!(first, second);
            prop_assert_eq!(first.gross.to_string(), second.gross.to_string());
            prop_assert_eq!(first.grand_total.to_string(), second.grand_total.to_string());
        }

        #[test]
        fn prop_line_composition_is_exact(
            qty in quantity(),
            price in unit_price(),
            vat in 0i32..=100,
            discount in percent(),
            withholding in 0i32..=100,
        ) {
            let line = calculate_line(&LineInput::new(qty, price, vat, discount, withholding));
            prop_assert_eq!(line.gross - line.discount_amount, line.net);
            prop_assert_eq!(line.net + line.vat, line.grand_total);
            prop_assert!(line.withholding_amount <= line.vat);
            prop_assert!(line.gross.scale() == 2 && line.vat.scale() == 2);
        }

        #[test]
        fn prop_header_equals_sum_of_lines(
            inputs in prop::collection::vec(
                (quantity(), unit_price(), 0i32..=100, percent(), 0i32..=100),
                0..12,
            )
        ) {
            let lines: Vec<LineAmounts> = inputs
                .into_iter()
                .map(|(q, p, v, d, w)| calculate_line(&LineInput::new(q, p, v, d, w)))
                .collect();
            let totals = InvoiceTotals::from_lines(&lines);

            let net: Decimal = lines.iter().map(|l| l.net).sum();
            let vat: Decimal = lines.iter().map(|l| l.vat).sum();
            let withholding: Decimal = lines.iter().map(|l| l.withholding_amount).sum();
            prop_assert_eq!(totals.total_net, round_amount(net));
            prop_assert_eq!(totals.total_vat, round_amount(vat));
            prop_assert_eq!(totals.total_gross, totals.total_net + totals.total_vat);
            prop_assert_eq!(totals.balance, totals.total_gross - round_amount(withholding));
        }
    }
}
