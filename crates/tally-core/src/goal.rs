//! Goal achievement and bonus math.

use serde::Serialize;
use ts_rs::TS;

use crate::money::{round_div, saturate, Money};
use crate::rate::{Rate, BPS_SCALE};
use crate::types::BonusRule;

/// Result of a goal refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct Achievement {
    pub achieved_cents: i64,
    pub target_cents: i64,
    /// Achieved / target in basis points (10000 = 100%); 0 when target is 0.
    pub pct_bps: i64,
    pub bonus_cents: i64,
}

/// Computes the achievement percentage and the bonus earned.
///
/// The bonus comes from the highest rule whose threshold the percentage
/// reaches, applied to the achieved amount.
pub fn compute_achievement(achieved: Money, target: Money, bonus_rules: &[BonusRule]) -> Achievement {
    let pct_bps = if target.cents() <= 0 {
        0
    } else {
        saturate(round_div(
            achieved.cents() as i128 * BPS_SCALE as i128,
            target.cents() as i128,
        ))
    };

    let bonus = bonus_rules
        .iter()
        .filter(|r| r.threshold_bps <= pct_bps)
        .max_by_key(|r| r.threshold_bps)
        .map(|r| achieved.percentage(Rate::from_bps(r.bonus_bps)).clamp_non_negative())
        .unwrap_or_default();

    Achievement {
        achieved_cents: achieved.cents(),
        target_cents: target.cents(),
        pct_bps,
        bonus_cents: bonus.cents(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Vec<BonusRule> {
        vec![
            BonusRule {
                threshold_bps: 10_000,
                bonus_bps: 500,
            },
            BonusRule {
                threshold_bps: 12_000,
                bonus_bps: 1_000,
            },
        ]
    }

    #[test]
    fn test_below_threshold_no_bonus() {
        let a = compute_achievement(Money::from_cents(80_000), Money::from_cents(100_000), &rules());
        assert_eq!(a.pct_bps, 8_000);
        assert_eq!(a.bonus_cents, 0);
    }

    #[test]
    fn test_highest_reached_threshold_wins() {
        let a = compute_achievement(Money::from_cents(130_000), Money::from_cents(100_000), &rules());
        assert_eq!(a.pct_bps, 13_000);
        // 10% of 1,300.00
        assert_eq!(a.bonus_cents, 13_000);

        let a = compute_achievement(Money::from_cents(100_000), Money::from_cents(100_000), &rules());
        assert_eq!(a.bonus_cents, 5_000);
    }

    #[test]
    fn test_zero_target() {
        let a = compute_achievement(Money::from_cents(5_000), Money::zero(), &rules());
        assert_eq!(a.pct_bps, 0);
        assert_eq!(a.bonus_cents, 0);
    }
}
