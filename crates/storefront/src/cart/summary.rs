//! Checkout summary derived from a cart snapshot.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::snapshot::CartSnapshot;

/// Shipping and tax rules applied when summarising a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRules {
    /// Subtotals strictly above this amount ship for free.
    pub free_shipping_threshold: Decimal,
    /// Flat shipping fee below the threshold.
    pub shipping_fee: Decimal,
    /// Tax rate as a fraction (0.18 = 18%).
    pub tax_rate: Decimal,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Decimal::new(1999, 0),
            shipping_fee: Decimal::new(99, 0),
            tax_rate: Decimal::new(18, 2),
        }
    }
}

/// Price breakdown shown on the cart page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub item_count: u32,
    pub subtotal: Decimal,
    /// Discount against comparison prices.
    pub savings: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    /// How much more must be added to qualify for free shipping.
    pub amount_to_free_shipping: Decimal,
}

impl CartSummary {
    /// Summarise a snapshot. Every figure is derived from the lines.
    #[must_use]
    pub fn from_snapshot(snapshot: &CartSnapshot, rules: &PricingRules) -> Self {
        let subtotal = snapshot.subtotal();
        let savings: Decimal = snapshot
            .lines()
            .iter()
            .map(|line| line.unit_savings() * Decimal::from(line.quantity()))
            .sum();

        let ships_free = snapshot.is_empty() || subtotal > rules.free_shipping_threshold;
        let shipping = if ships_free {
            Decimal::ZERO
        } else {
            rules.shipping_fee
        };
        let amount_to_free_shipping = if ships_free {
            Decimal::ZERO
        } else {
            rules.free_shipping_threshold + Decimal::ONE - subtotal
        };

        let tax = (subtotal * rules.tax_rate).round_dp(2);

        Self {
            item_count: snapshot.item_count(),
            subtotal: subtotal.round_dp(2),
            savings: savings.round_dp(2),
            shipping,
            tax,
            total: (subtotal + shipping + tax).round_dp(2),
            amount_to_free_shipping: amount_to_free_shipping.round_dp(2),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::num::NonZeroU32;

    use ebasi_core::ProductId;

    use super::*;
    use crate::cart::CartLine;

    fn line(price: i64, compare: i64, quantity: u32) -> CartLine {
        CartLine::new(
            ProductId::parse("SKU-1").unwrap(),
            "Kurta",
            Decimal::new(price, 0),
            NonZeroU32::new(quantity).unwrap(),
        )
        .with_compare_price(Decimal::new(compare, 0))
    }

    #[test]
    fn test_empty_cart_summary_is_zero() {
        let summary = CartSummary::from_snapshot(&CartSnapshot::empty(), &PricingRules::default());

        assert_eq!(summary.total, Decimal::ZERO);
        assert_eq!(summary.shipping, Decimal::ZERO);
        assert_eq!(summary.amount_to_free_shipping, Decimal::ZERO);
    }

    #[test]
    fn test_below_threshold_pays_shipping() {
        let cart = CartSnapshot::from_lines([line(500, 700, 2)]);
        let summary = CartSummary::from_snapshot(&cart, &PricingRules::default());

        assert_eq!(summary.subtotal, Decimal::new(1000, 0));
        assert_eq!(summary.savings, Decimal::new(400, 0));
        assert_eq!(summary.shipping, Decimal::new(99, 0));
        assert_eq!(summary.tax, Decimal::new(180, 0));
        assert_eq!(summary.total, Decimal::new(1279, 0));
        assert_eq!(summary.amount_to_free_shipping, Decimal::new(1000, 0));
    }

    #[test]
    fn test_above_threshold_ships_free() {
        let cart = CartSnapshot::from_lines([line(1000, 1000, 2)]);
        let summary = CartSummary::from_snapshot(&cart, &PricingRules::default());

        assert_eq!(summary.shipping, Decimal::ZERO);
        assert_eq!(summary.tax, Decimal::new(360, 0));
        assert_eq!(summary.total, Decimal::new(2360, 0));
        assert_eq!(summary.item_count, 2);
    }
}
