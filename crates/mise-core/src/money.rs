//! # Money Module
//!
//! Sale prices and payments are integer cents. Ingredient costs are fractional
//! (a gram of cheese costs $0.008), so they live in `Decimal` and are only
//! rounded to cents at the edge, when a cost is shown next to a price.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Kinds of Amount                                  │
//! │                                                                         │
//! │  Money (i64 cents)                Decimal (currency units)             │
//! │  ─────────────────                ───────────────────────              │
//! │  Product.price_cents              Item.cost_per_unit   ($/g, $/mL)     │
//! │  OrderItem.line_total_cents       Product.ingredient_cost              │
//! │  Order.total_cents / paid_cents   OrderItem.unit_cost_at_sale          │
//! │            │                                 │                          │
//! │            └──────── Money::from_decimal ◄───┘  (bankers rounding)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use mise_core::money::Money;
//! use rust_decimal::Decimal;
//!
//! let price = Money::from_cents(1099);
//! assert_eq!(price.multiply_quantity(2).unwrap().cents(), 2198);
//!
//! // $0.115 rounds half-to-even to $0.12
//! let cost = Money::from_decimal(Decimal::new(115, 3));
//! assert_eq!(cost.cents(), 12);
//! ```
//!
//! Anything computed from caller input (line totals, modifier deltas, order
//! totals) goes through the checked helpers and fails with
//! [`CoreError::AmountOverflow`] instead of wrapping.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in cents.
///
/// Signed so that refunds and negative price deltas ("no cheese, -$0.50")
/// compose with plain addition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Rounds a currency amount to the nearest cent, half to even.
    pub fn from_decimal(amount: Decimal) -> Self {
        let cents = (amount * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
        Money(cents.to_i64().unwrap_or(if cents.is_sign_negative() {
            i64::MIN
        } else {
            i64::MAX
        }))
    }

    /// The amount in currency units (`1099` → `10.99`).
    #[inline]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Whole currency units, truncated toward zero.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Fractional part in cents (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn checked_add(self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    #[inline]
    pub const fn checked_mul(self, qty: i64) -> Option<Money> {
        match self.0.checked_mul(qty) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Adds two amounts, failing instead of wrapping.
    pub fn try_add(self, other: Money) -> CoreResult<Money> {
        self.checked_add(other)
            .ok_or_else(|| CoreError::AmountOverflow(format!("{self} + {other}")))
    }

    /// Multiplies a unit price by an order-line quantity.
    pub fn multiply_quantity(&self, qty: i64) -> CoreResult<Money> {
        self.checked_mul(qty)
            .ok_or_else(|| CoreError::AmountOverflow(format!("{self} x {qty}")))
    }

    /// Sums amounts, failing on the first overflow.
    pub fn try_sum<I>(amounts: I) -> CoreResult<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.try_add(m))
    }

    /// Amount still owed when `paid` has been received against `self`.
    ///
    /// Never negative: overpayment is not a debt.
    pub fn outstanding(&self, paid: Money) -> Money {
        Money(self.0.saturating_sub(paid.0).max(0))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.dollars().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

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
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "$10.99");
        assert_eq!(Money::from_cents(-550).to_string(), "-$5.50");
        assert_eq!(Money::zero().to_string(), "$0.00");
    }

    #[test]
    fn test_from_decimal_rounds_half_to_even() {
        assert_eq!(Money::from_decimal(dec!(0.11)).cents(), 11);
        assert_eq!(Money::from_decimal(dec!(0.125)).cents(), 12);
        assert_eq!(Money::from_decimal(dec!(0.135)).cents(), 14);
        assert_eq!(Money::from_decimal(dec!(-1.005)).cents(), -100);
    }

    #[test]
    fn test_to_decimal() {
        assert_eq!(Money::from_cents(1099).to_decimal(), dec!(10.99));
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(250);
        assert_eq!((a - b).cents(), 750);
        assert_eq!(b.multiply_quantity(3).unwrap().cents(), 750);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 1500);
        assert_eq!(Money::try_sum([a, b, b]).unwrap(), total);
    }

    #[test]
    fn test_checked_arithmetic_refuses_overflow() {
        let big = Money::from_cents(i64::MAX / 2 + 1);
        assert!(matches!(big.multiply_quantity(2), Err(CoreError::AmountOverflow(_))));
        assert!(matches!(big.try_add(big), Err(CoreError::AmountOverflow(_))));
        assert!(Money::try_sum([big, Money::from_cents(-1), big]).is_ok());
        assert!(Money::try_sum([big, big, Money::from_cents(-1)]).is_err());
        assert_eq!(Money::from_cents(-5).checked_mul(3), Some(Money::from_cents(-15)));
        assert_eq!(Money::from_cents(i64::MIN).checked_mul(-1), None);
    }

    #[test]
    fn test_outstanding() {
        let total = Money::from_cents(1500);
        assert_eq!(total.outstanding(Money::from_cents(1000)).cents(), 500);
        assert_eq!(total.outstanding(Money::from_cents(2000)).cents(), 0);
    }
}
