//! # Rule Evaluator
//!
//! Pure function from `(rule, base amount, context)` to a commission amount.
//!
//! ## Evaluation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  applies_to filter ──► no matching lines? ─────────────────► 0          │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  rule_type = fixed ──► value ──────────────────────────────► clamp ≥ 0  │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  match calculation_type                                                 │
//! │    percent_*        ──► derived base × value%                           │
//! │    fixed_per_*      ──► value (× items)                                 │
//! │    tiered_gross     ──► base × highest satisfied tier%                  │
//! │    custom_formula   ──► parsed expression (errors → 0)                  │
//! │    unrecognized     ──► 0                                               │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  clamp ≥ 0                                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The evaluator never fails. A misconfigured rule yields zero so one bad
//! rule cannot block the other participants of a work order.

use crate::formula::{Formula, FormulaVars};
use crate::money::Money;
use crate::rate::Rate;
use crate::types::{AppliesTo, CalculationType, CommissionRule, RuleType, Tier};
use crate::work_order::CalculationContext;

/// Computes the commission a rule yields. Always `>= 0`.
pub fn evaluate(rule: &CommissionRule, base: Money, ctx: &CalculationContext) -> Money {
    if !is_applicable(rule.applies_to, ctx) {
        return Money::zero();
    }

    if rule.rule_type == RuleType::Fixed {
        return rule.fixed_amount().clamp_non_negative();
    }

    let rate = rule.rate();
    let amount = match rule.calculation_type {
        CalculationType::PercentGross => base.percentage(rate),
        CalculationType::PercentNet => (base - ctx.expenses - ctx.cost).percentage(rate),
        CalculationType::PercentGrossMinusDisplacement => (base - ctx.displacement).percentage(rate),
        CalculationType::PercentServicesOnly => ctx.services_total.percentage(rate),
        CalculationType::PercentProductsOnly => ctx.products_total.percentage(rate),
        CalculationType::FixedPerOs => rule.fixed_amount(),
        CalculationType::PercentProfit => (base - ctx.cost).percentage(rate),
        CalculationType::PercentGrossMinusExpenses => (base - ctx.expenses).percentage(rate),
        CalculationType::TieredGross => match tier_rate(&rule.tiers, base) {
            Some(tier) => base.percentage(tier),
            None => Money::zero(),
        },
        CalculationType::FixedPerItem => rule.fixed_amount() * ctx.items_count,
        CalculationType::CustomFormula => custom(rule, base, ctx),
        CalculationType::Unrecognized => Money::zero(),
    };

    amount.clamp_non_negative()
}

fn is_applicable(applies_to: AppliesTo, ctx: &CalculationContext) -> bool {
    match applies_to {
        AppliesTo::All => true,
        AppliesTo::Products => ctx.product_lines > 0,
        AppliesTo::Services => ctx.service_lines > 0,
    }
}

/// The rate of the highest tier whose threshold the base reaches.
pub fn tier_rate(tiers: &[Tier], base: Money) -> Option<Rate> {
    tiers
        .iter()
        .filter(|t| t.threshold_cents <= base.cents())
        .max_by_key(|t| t.threshold_cents)
        .map(|t| Rate::from_bps(t.value_bps))
}

fn custom(rule: &CommissionRule, base: Money, ctx: &CalculationContext) -> Money {
    let Some(source) = rule.formula.as_deref() else {
        return Money::zero();
    };

    let vars = FormulaVars {
        gross: base,
        net: base - ctx.expenses,
        products: ctx.products_total,
        services: ctx.services_total,
        expenses: ctx.expenses,
        displacement: ctx.displacement,
        cost: ctx.cost,
        percent: rule.rate(),
    };

    Formula::parse(source)
        .and_then(|f| f.evaluate(&vars))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Trigger;
    use chrono::Utc;

    fn rule(calc: CalculationType, value: i64) -> CommissionRule {
        CommissionRule {
            id: "r1".to_string(),
            tenant_id: "t1".to_string(),
            owner_user_id: Some("u1".to_string()),
            name: "Rule".to_string(),
            rule_type: if calc.is_fixed_amount() {
                RuleType::Fixed
            } else {
                RuleType::Percentage
            },
            value_hundredths: value,
            applies_to: AppliesTo::All,
            calculation_type: calc,
            applies_to_role: None,
            applies_when: Trigger::OsCompleted,
            tiers: vec![],
            formula: None,
            source_filter: None,
            priority: 0,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn ctx() -> CalculationContext {
        CalculationContext {
            gross: Money::from_cents(1_000_000),
            expenses: Money::from_cents(100_000),
            displacement: Money::from_cents(50_000),
            products_total: Money::from_cents(400_000),
            services_total: Money::from_cents(600_000),
            cost: Money::from_cents(200_000),
            items_count: 3,
            product_lines: 1,
            service_lines: 2,
        }
    }

    fn eval(calc: CalculationType, value: i64) -> i64 {
        let c = ctx();
        evaluate(&rule(calc, value), c.gross, &c).cents()
    }

    #[test]
    fn test_percentage_variants() {
        // 10% throughout, gross 10,000.00
        assert_eq!(eval(CalculationType::PercentGross, 1_000), 100_000);
        assert_eq!(eval(CalculationType::PercentNet, 1_000), 70_000);
        assert_eq!(eval(CalculationType::PercentGrossMinusDisplacement, 1_000), 95_000);
        assert_eq!(eval(CalculationType::PercentServicesOnly, 1_000), 60_000);
        assert_eq!(eval(CalculationType::PercentProductsOnly, 1_000), 40_000);
        assert_eq!(eval(CalculationType::PercentProfit, 1_000), 80_000);
        assert_eq!(eval(CalculationType::PercentGrossMinusExpenses, 1_000), 90_000);
    }

    #[test]
    fn test_fixed_variants() {
        assert_eq!(eval(CalculationType::FixedPerOs, 15_000), 15_000);

        let mut per_item = rule(CalculationType::FixedPerItem, 2_000);
        per_item.rule_type = RuleType::Percentage;
        let c = ctx();
        assert_eq!(evaluate(&per_item, c.gross, &c).cents(), 6_000);
    }

    #[test]
    fn test_tiered_uses_highest_satisfied_tier() {
        let mut r = rule(CalculationType::TieredGross, 0);
        r.tiers = vec![
            Tier {
                threshold_cents: 0,
                value_bps: 500,
            },
            Tier {
                threshold_cents: 1_000_000,
                value_bps: 800,
            },
        ];
        let c = CalculationContext::for_amount(Money::from_cents(1_200_000));

        // 8% × 12,000.00 = 960.00
        assert_eq!(evaluate(&r, Money::from_cents(1_200_000), &c).cents(), 96_000);
        // below the second threshold → 5% × 9,000.00 = 450.00
        assert_eq!(evaluate(&r, Money::from_cents(900_000), &c).cents(), 45_000);
    }

    #[test]
    fn test_tiered_without_satisfied_tier_is_zero() {
        let mut r = rule(CalculationType::TieredGross, 0);
        r.tiers = vec![Tier {
            threshold_cents: 500_000,
            value_bps: 500,
        }];
        let c = CalculationContext::for_amount(Money::from_cents(100_000));
        assert!(evaluate(&r, Money::from_cents(100_000), &c).is_zero());
    }

    #[test]
    fn test_fixed_type_short_circuits() {
        let mut r = rule(CalculationType::TieredGross, 15_000);
        r.rule_type = RuleType::Fixed;
        for base in [0, 1, 99_999, 10_000_000] {
            let c = CalculationContext::for_amount(Money::from_cents(base));
            assert_eq!(evaluate(&r, Money::from_cents(base), &c).cents(), 15_000);
        }
    }

    #[test]
    fn test_negative_results_clamp_to_zero() {
        let mut c = ctx();
        c.expenses = Money::from_cents(2_000_000);
        let r = rule(CalculationType::PercentGrossMinusExpenses, 1_000);
        assert_eq!(evaluate(&r, c.gross, &c), Money::zero());

        let mut negative_fixed = rule(CalculationType::FixedPerOs, -500);
        negative_fixed.rule_type = RuleType::Fixed;
        assert_eq!(evaluate(&negative_fixed, c.gross, &c), Money::zero());
    }

    #[test]
    fn test_unrecognized_fails_closed() {
        assert_eq!(eval(CalculationType::Unrecognized, 1_000), 0);
    }

    #[test]
    fn test_applies_to_filter() {
        let mut r = rule(CalculationType::PercentGross, 1_000);
        r.applies_to = AppliesTo::Products;
        let mut c = ctx();
        c.product_lines = 0;
        assert!(evaluate(&r, c.gross, &c).is_zero());

        r.applies_to = AppliesTo::Services;
        assert_eq!(evaluate(&r, c.gross, &c).cents(), 100_000);
    }

    #[test]
    fn test_custom_formula() {
        let mut r = rule(CalculationType::CustomFormula, 500);
        r.formula = Some("net * percent / 100 + 10".to_string());
        // (10,000 - 1,000) × 5% + 10 = 460.00
        assert_eq!(
            evaluate(&r, ctx().gross, &ctx()).cents(),
            46_000
        );

        r.formula = Some("gross / (cost - cost)".to_string());
        assert!(evaluate(&r, ctx().gross, &ctx()).is_zero());

        r.formula = None;
        assert!(evaluate(&r, ctx().gross, &ctx()).is_zero());
    }

    #[test]
    fn test_deterministic() {
        let r = rule(CalculationType::PercentNet, 733);
        let c = ctx();
        let first = evaluate(&r, c.gross, &c);
        for _ in 0..10 {
            assert_eq!(evaluate(&r, c.gross, &c), first);
        }
    }
}
