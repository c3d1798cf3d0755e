//! # Campaign Multiplier Resolver
//!
//! Picks the campaigns running on a date for a (role, calculation type) and
//! folds their multipliers into one.
//!
//! ```text
//!   campaigns ──► active? ──► window ∋ date? ──► role matches? ──► calc matches?
//!                                                                      │
//!                       Multiply: Π multipliers   Highest: max  ◄──────┘
//!                                                                      │
//!                                              floor at 1.0× ──► AppliedMultiplier
//! ```
//!
//! A campaign with `applies_to_role = None` (or no calculation type) matches
//! every role (or type). The result is never below 1.0×.

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::CampaignComposition;
use crate::rate::Rate;
use crate::types::{CalculationType, CommissionCampaign, Role};

/// The multiplier to apply and the campaigns it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMultiplier {
    pub rate: Rate,
    pub campaign_names: Vec<String>,
}

impl AppliedMultiplier {
    pub fn none() -> Self {
        AppliedMultiplier {
            rate: Rate::ONE,
            campaign_names: Vec::new(),
        }
    }

    pub fn is_boosted(&self) -> bool {
        self.rate > Rate::ONE
    }
}

fn matches(
    campaign: &CommissionCampaign,
    role: Option<Role>,
    calc: CalculationType,
    as_of: NaiveDate,
) -> bool {
    if !campaign.is_running_on(as_of) {
        return false;
    }
    let role_ok = match (campaign.applies_to_role, role) {
        (None, _) => true,
        (Some(wanted), Some(actual)) => wanted == actual,
        (Some(_), None) => false,
    };
    let calc_ok = campaign
        .applies_to_calculation_type
        .map_or(true, |wanted| wanted == calc);
    role_ok && calc_ok
}

/// Resolves the multiplier for one evaluation.
pub fn multiplier_for(
    campaigns: &[CommissionCampaign],
    role: Option<Role>,
    calc: CalculationType,
    as_of: NaiveDate,
    composition: CampaignComposition,
) -> AppliedMultiplier {
    let matching: Vec<&CommissionCampaign> = campaigns
        .iter()
        .filter(|c| matches(c, role, calc, as_of))
        .collect();

    if matching.is_empty() {
        return AppliedMultiplier::none();
    }

    let (rate, names) = match composition {
        CampaignComposition::Multiply => {
            let rate = matching
                .iter()
                .fold(Rate::ONE, |acc, c| acc.compose(c.multiplier()));
            let names = matching.iter().map(|c| c.name.clone()).collect();
            (rate, names)
        }
        CampaignComposition::Highest => {
            // Ties resolve to the first campaign in input order.
            let best = matching
                .iter()
                .copied()
                .reduce(|best, c| if c.multiplier() > best.multiplier() { c } else { best });
            match best {
                Some(c) => (c.multiplier(), vec![c.name.clone()]),
                None => return AppliedMultiplier::none(),
            }
        }
    };

    AppliedMultiplier {
        rate: rate.max(Rate::ONE),
        campaign_names: names,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn campaign(name: &str, bps: i64) -> CommissionCampaign {
        CommissionCampaign {
            id: name.to_string(),
            tenant_id: "t1".to_string(),
            name: name.to_string(),
            multiplier_bps: bps,
            applies_to_role: None,
            applies_to_calculation_type: None,
            starts_at: date(1),
            ends_at: date(31),
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_no_campaign_is_identity() {
        let m = multiplier_for(
            &[],
            Some(Role::Technician),
            CalculationType::PercentGross,
            date(10),
            CampaignComposition::Multiply,
        );
        assert_eq!(m.rate, Rate::ONE);
        assert!(!m.is_boosted());
    }

    #[test]
    fn test_multiply_composes_all_matching() {
        let campaigns = vec![campaign("A", 15_000), campaign("B", 12_000)];
        let m = multiplier_for(
            &campaigns,
            Some(Role::Seller),
            CalculationType::PercentGross,
            date(10),
            CampaignComposition::Multiply,
        );
        assert_eq!(m.rate.bps(), 18_000);
        assert_eq!(m.campaign_names, vec!["A", "B"]);
    }

    #[test]
    fn test_highest_picks_largest() {
        let campaigns = vec![campaign("A", 12_000), campaign("B", 15_000)];
        let m = multiplier_for(
            &campaigns,
            Some(Role::Seller),
            CalculationType::PercentGross,
            date(10),
            CampaignComposition::Highest,
        );
        assert_eq!(m.rate.bps(), 15_000);
        assert_eq!(m.campaign_names, vec!["B"]);
    }

    #[test]
    fn test_filters_by_role_calc_window_and_active() {
        let mut for_drivers = campaign("drivers", 20_000);
        for_drivers.applies_to_role = Some(Role::Driver);
        let mut tiered_only = campaign("tiered", 20_000);
        tiered_only.applies_to_calculation_type = Some(CalculationType::TieredGross);
        let mut expired = campaign("expired", 20_000);
        expired.ends_at = date(5);
        let mut inactive = campaign("inactive", 20_000);
        inactive.active = false;

        let campaigns = vec![for_drivers, tiered_only, expired, inactive];
        let m = multiplier_for(
            &campaigns,
            Some(Role::Technician),
            CalculationType::PercentGross,
            date(10),
            CampaignComposition::Multiply,
        );
        assert_eq!(m, AppliedMultiplier::none());
    }

    #[test]
    fn test_never_below_one() {
        let campaigns = vec![campaign("shrink", 5_000)];
        let m = multiplier_for(
            &campaigns,
            None,
            CalculationType::PercentGross,
            date(10),
            CampaignComposition::Multiply,
        );
        assert_eq!(m.rate, Rate::ONE);
    }
}
