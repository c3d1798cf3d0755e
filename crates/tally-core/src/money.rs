//! # Money
//!
//! Commission amounts are whole cents in an `i64`.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  work order totals ─► base (may dip below zero) ─► × rate ─► round once │
//! │                                                     │                   │
//! │                          clamp at zero ◄────────────┘                   │
//! │                               │                                         │
//! │          event.commission_amount  (exact cents from here on)            │
//! │                               │                                         │
//! │      Σ approved ─► settlement.total_amount   Σ earned ─► goal progress  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rounding happens exactly once per event, half away from zero. Sums of
//! events are integer sums and always match the settlement total.
//!
//! ```rust
//! use tally_core::money::Money;
//! use tally_core::rate::Rate;
//!
//! let gross = Money::from_cents(1_200_000); // 12,000.00
//! let commission = gross.percentage(Rate::from_bps(800));
//! assert_eq!(commission.cents(), 96_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::rate::{Rate, BPS_SCALE};

/// An amount in cents. Signed, since intermediate bases such as gross
/// minus displacement can go negative before the evaluator clamps them.
///
/// Arithmetic saturates at the i64 bounds instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
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

    /// Returns the value, or zero when it is negative.
    ///
    /// Every amount leaving the rule evaluator goes through this.
    #[inline]
    pub const fn clamp_non_negative(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            *self
        }
    }

    /// `amount × bps / 10000` in i128, rounded half away from zero.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    /// use tally_core::rate::Rate;
    ///
    /// // 10.00 at 8.25% is 0.825, which rounds up to 0.83
    /// assert_eq!(Money::from_cents(1000).percentage(Rate::from_bps(825)).cents(), 83);
    /// ```
    pub fn percentage(&self, rate: Rate) -> Money {
        let scaled = self.0 as i128 * rate.bps() as i128;
        Money(saturate(round_div(scaled, BPS_SCALE as i128)))
    }

    /// Line total for `qty` units.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }

    /// Divides the amount into `parts` equal shares, rounded to the cent.
    ///
    /// Used when several technicians share one work order. A divisor of
    /// zero or one returns the amount unchanged.
    pub fn share(&self, parts: u32) -> Money {
        if parts <= 1 {
            return *self;
        }
        Money(saturate(round_div(self.0 as i128, parts as i128)))
    }
}

/// Narrows an i128 intermediate, pinning it to the i64 range.
pub(crate) fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

/// Integer division rounding half away from zero.
pub(crate) fn round_div(numerator: i128, denominator: i128) -> i128 {
    if denominator == 0 {
        return 0;
    }
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.abs() * 2 >= denominator.abs() {
        if (numerator < 0) != (denominator < 0) {
            quotient - 1
        } else {
            quotient + 1
        }
    } else {
        quotient
    }
}

/// Plain decimal, no currency sign: `1234.50`, `-5.50`. Used in logs and
/// notification text.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money(0)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, factor: i64) -> Self {
        Money(self.0.saturating_mul(factor))
    }
}

/// Summation, so settlements can fold event amounts with `.sum()`.
impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(123_450).to_string(), "1234.50");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::default().to_string(), "0.00");
    }

    #[test]
    fn test_line_totals_and_bases() {
        let unit = Money::from_cents(2_990);
        let parts = unit.multiply_quantity(3);
        assert_eq!(parts.cents(), 8_970);

        let displacement = Money::from_cents(10_000);
        let base = parts - displacement;
        assert!(!base.is_positive());
        assert!(base.clamp_non_negative().is_zero());
        assert_eq!((unit * 2 + unit).cents(), 8_970);
    }

    #[test]
    fn test_percentage_exact() {
        // 12,000.00 at 8% = 960.00
        let base = Money::from_cents(1_200_000);
        assert_eq!(base.percentage(Rate::from_bps(800)).cents(), 96_000);
    }

    #[test]
    fn test_percentage_rounds_half_away_from_zero() {
        // 10.00 at 8.25% = 0.825 → 0.83
        assert_eq!(Money::from_cents(1000).percentage(Rate::from_bps(825)).cents(), 83);
        // -10.00 at 8.25% = -0.825 → -0.83
        assert_eq!(Money::from_cents(-1000).percentage(Rate::from_bps(825)).cents(), -83);
    }

    #[test]
    fn test_clamp_non_negative() {
        assert_eq!(Money::from_cents(-1).clamp_non_negative(), Money::zero());
        assert_eq!(Money::from_cents(42).clamp_non_negative().cents(), 42);
    }

    #[test]
    fn test_overflow_saturates() {
        let huge = Money::from_cents(i64::MAX - 1);
        assert_eq!((huge + Money::from_cents(10)).cents(), i64::MAX);
        assert_eq!((Money::from_cents(i64::MIN + 1) - Money::from_cents(10)).cents(), i64::MIN);
        assert_eq!((huge * 3).cents(), i64::MAX);

        let mut acc = huge;
        acc += huge;
        assert_eq!(acc.cents(), i64::MAX);

        // 3× multiplier on the largest amount does not wrap negative.
        assert_eq!(huge.percentage(Rate::from_bps(30_000)).cents(), i64::MAX);
        assert_eq!(Money::from_cents(i64::MIN).percentage(Rate::from_bps(20_000)).cents(), i64::MIN);
    }

    #[test]
    fn test_share_between_technicians() {
        let amount = Money::from_cents(1000);
        assert_eq!(amount.share(0), amount);
        assert_eq!(amount.share(1), amount);
        assert_eq!(amount.share(2).cents(), 500);
        // 10.00 / 3 = 3.333… → 3.33
        assert_eq!(amount.share(3).cents(), 333);
    }

    #[test]
    fn test_sum_is_exact() {
        let events = [
            Money::from_cents(10_000),
            Money::from_cents(25_000),
            Money::from_cents(7_500),
        ];
        let total: Money = events.iter().sum();
        assert_eq!(total.cents(), 42_500);
    }
}
