//! # Rate Module
//!
//! Percentages and multipliers represented in basis points (bps).
//!
//! ## Why Basis Points?
//! 1 basis point = 0.01% = 1/10000
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  One integer type, three readings                                       │
//! │                                                                         │
//! │   Rule value      800 bps   = 8%     of the base                        │
//! │   Campaign      15000 bps   = 1.5×   multiplier                         │
//! │   Goal bonus      500 bps   = 5%     of the achieved amount             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::{round_div, saturate, Money};

/// 10000 bps = 100% = 1.0×
pub const BPS_SCALE: i64 = 10_000;

/// A percentage or multiplier in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rate(i64);

impl Rate {
    /// 100% (or a 1.0× multiplier).
    pub const ONE: Rate = Rate(BPS_SCALE);

    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: i64) -> Self {
        Rate(bps)
    }

    /// Creates a rate from a whole percentage (`8` → 800 bps).
    #[inline]
    pub const fn from_percent(pct: i64) -> Self {
        Rate(pct * 100)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> i64 {
        self.0
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    /// Checks if the rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Composes two multipliers: `1.5× ∘ 1.2× = 1.8×`.
    ///
    /// Rounded to the nearest basis point.
    pub fn compose(&self, other: Rate) -> Rate {
        let product = self.0 as i128 * other.0 as i128;
        Rate(saturate(round_div(product, BPS_SCALE as i128)))
    }

    /// The share `part` is of `whole`, to the nearest basis point and capped
    /// at 100%. Zero when `whole` is not positive.
    pub fn proportion(part: Money, whole: Money) -> Rate {
        if !whole.is_positive() {
            return Rate::zero();
        }
        let bps = round_div(part.cents() as i128 * BPS_SCALE as i128, whole.cents() as i128);
        Rate(saturate(bps).clamp(0, BPS_SCALE))
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn as_percent_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}%", sign, abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_percent() {
        assert_eq!(Rate::from_percent(8).bps(), 800);
        assert_eq!(Rate::ONE.bps(), 10_000);
    }

    #[test]
    fn test_compose_multipliers() {
        let a = Rate::from_bps(15_000);
        let b = Rate::from_bps(12_000);
        assert_eq!(a.compose(b).bps(), 18_000);
        assert_eq!(Rate::ONE.compose(a), a);
    }

    #[test]
    fn test_proportion_is_capped() {
        let whole = Money::from_cents(30_000);
        assert_eq!(Rate::proportion(Money::from_cents(10_000), whole).bps(), 3_333);
        assert_eq!(Rate::proportion(Money::from_cents(45_000), whole), Rate::ONE);
        assert!(Rate::proportion(Money::from_cents(100), Money::zero()).is_zero());
    }

    #[test]
    fn test_display() {
        assert_eq!(Rate::from_bps(825).to_string(), "8.25%");
        assert_eq!(Rate::from_bps(15_000).to_string(), "150.00%");
    }

    #[test]
    fn test_display_keeps_sign_below_one_percent() {
        assert_eq!(Rate::from_bps(-50).to_string(), "-0.50%");
        assert_eq!(Rate::from_bps(-825).to_string(), "-8.25%");
        assert_eq!(Rate::zero().to_string(), "0.00%");
    }
}
