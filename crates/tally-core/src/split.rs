//! Dividing one commission amount between several users.
//!
//! Each share is the amount's percentage, rounded half away from zero. The
//! last share takes whatever rounding left over, so the parts always add up
//! to the whole.

use crate::money::Money;
use crate::rate::Rate;

/// Splits `amount` by `shares_bps`, which are expected to total 10000.
pub fn allocate(amount: Money, shares_bps: &[i64]) -> Vec<Money> {
    let mut parts: Vec<Money> = Vec::with_capacity(shares_bps.len());
    let mut allocated = Money::zero();

    for (i, bps) in shares_bps.iter().enumerate() {
        let part = if i + 1 == shares_bps.len() {
            amount - allocated
        } else {
            amount.percentage(Rate::from_bps(*bps))
        };
        allocated += part;
        parts.push(part);
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cents(parts: &[Money]) -> Vec<i64> {
        parts.iter().map(|m| m.cents()).collect()
    }

    #[test]
    fn test_even_split() {
        let parts = allocate(Money::from_cents(10_000), &[5_000, 5_000]);
        assert_eq!(cents(&parts), vec![5_000, 5_000]);
    }

    #[test]
    fn test_last_share_absorbs_rounding() {
        // 33.33% of 1.00 rounds to 0.33 twice; the last share keeps 0.34.
        let parts = allocate(Money::from_cents(100), &[3_333, 3_333, 3_334]);
        assert_eq!(cents(&parts), vec![33, 33, 34]);

        let parts = allocate(Money::from_cents(1_001), &[5_000, 5_000]);
        assert_eq!(cents(&parts), vec![501, 500]);
        assert_eq!(parts.iter().map(|m| m.cents()).sum::<i64>(), 1_001);
    }

    #[test]
    fn test_no_shares() {
        assert!(allocate(Money::from_cents(500), &[]).is_empty());
    }
}
