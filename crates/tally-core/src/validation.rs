//! # Validation Module
//!
//! Input validation for the engine's write operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Deserialization (serde)                                       │
//! │  └── Enum codes, required fields                                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (before any transaction opens)                    │
//! │  ├── Lengths, ranges, tier ordering                                     │
//! │  └── Formula syntax                                                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── UNIQUE (marker per work order, settlement per user+period)         │
//! │  └── Partial UNIQUE (one open dispute per event)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::formula::Formula;
use crate::inputs::{
    BatchStatusUpdate, NewCommissionCampaign, NewCommissionGoal, NewCommissionRule,
    ReleasePayment, SplitEvent, UpdateCommissionRule,
};
use crate::period::Period;
use crate::rate::{Rate, BPS_SCALE};
use crate::types::{BonusRule, CalculationType, Role, RuleType, Tier};
use crate::{
    MAX_BATCH_EVENTS, MAX_BONUS_RULES, MAX_CAMPAIGN_MULTIPLIER_BPS, MAX_NAME_LENGTH,
    MAX_REASON_LENGTH, MAX_RULE_PRIORITY, MAX_RULE_TIERS, MAX_SPLIT_SHARES,
};
use std::collections::HashSet;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a display name (rules, campaigns).
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_name;
///
/// assert!(validate_name("Technician 10%").is_ok());
/// assert!(validate_name("   ").is_err());
/// ```
pub fn validate_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LENGTH,
        });
    }
    Ok(())
}

/// Validates free text such as a dispute reason or resolution notes.
pub fn validate_text(field: &str, text: &str, required: bool) -> ValidationResult<()> {
    if required && text.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if text.chars().count() > MAX_REASON_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_REASON_LENGTH,
        });
    }
    Ok(())
}

pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

pub fn validate_period(period: &str) -> ValidationResult<Period> {
    Period::parse(period)
}

/// Validates an amount that may be zero but never negative.
pub fn validate_non_negative_amount(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

fn validate_bps(field: &str, bps: i64) -> ValidationResult<()> {
    if !(0..=BPS_SCALE).contains(&bps) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: BPS_SCALE,
        });
    }
    Ok(())
}

/// Tiers must be few, non-negative and strictly ascending by threshold.
pub fn validate_tiers(tiers: &[Tier]) -> ValidationResult<()> {
    if tiers.len() > MAX_RULE_TIERS {
        return Err(ValidationError::OutOfRange {
            field: "tiers".to_string(),
            min: 0,
            max: MAX_RULE_TIERS as i64,
        });
    }
    for tier in tiers {
        validate_non_negative_amount("tiers.threshold_cents", tier.threshold_cents)?;
        validate_bps("tiers.value_bps", tier.value_bps)?;
    }
    if tiers
        .windows(2)
        .any(|w| w[0].threshold_cents >= w[1].threshold_cents)
    {
        return Err(ValidationError::InvalidFormat {
            field: "tiers".to_string(),
            reason: "thresholds must be strictly ascending".to_string(),
        });
    }
    Ok(())
}

pub fn validate_formula(formula: &str) -> ValidationResult<()> {
    Formula::parse(formula)
        .map(|_| ())
        .map_err(|e| ValidationError::InvalidFormat {
            field: "formula".to_string(),
            reason: e.to_string(),
        })
}

// =============================================================================
// Rule Validators
// =============================================================================

/// The parts of a rule whose consistency depends on each other.
struct RuleShape<'a> {
    rule_type: RuleType,
    value_hundredths: i64,
    calculation_type: CalculationType,
    tiers: &'a [Tier],
    formula: Option<&'a str>,
    priority: i64,
}

fn validate_rule_shape(shape: RuleShape<'_>) -> ValidationResult<()> {
    if shape.calculation_type == CalculationType::Unrecognized {
        return Err(ValidationError::NotAllowed {
            field: "calculation_type".to_string(),
            allowed: CalculationType::ALL
                .iter()
                .map(|c| c.code().to_string())
                .collect(),
        });
    }

    let reads_as_money =
        shape.rule_type == RuleType::Fixed || shape.calculation_type.is_fixed_amount();
    if reads_as_money {
        validate_non_negative_amount("value", shape.value_hundredths)?;
    } else {
        validate_bps("value", shape.value_hundredths)?;
    }

    validate_tiers(shape.tiers)?;
    if shape.calculation_type == CalculationType::TieredGross
        && shape.rule_type == RuleType::Percentage
        && shape.tiers.is_empty()
    {
        return Err(ValidationError::Required {
            field: "tiers".to_string(),
        });
    }

    if shape.calculation_type == CalculationType::CustomFormula
        && shape.rule_type == RuleType::Percentage
    {
        match shape.formula {
            Some(f) => validate_formula(f)?,
            None => {
                return Err(ValidationError::Required {
                    field: "formula".to_string(),
                })
            }
        }
    }

    if !(0..=MAX_RULE_PRIORITY).contains(&shape.priority) {
        return Err(ValidationError::OutOfRange {
            field: "priority".to_string(),
            min: 0,
            max: MAX_RULE_PRIORITY,
        });
    }

    Ok(())
}

pub fn validate_new_rule(input: &NewCommissionRule) -> ValidationResult<()> {
    validate_name(&input.name)?;
    if let Some(owner) = input.owner_user_id.as_deref() {
        validate_id("owner_user_id", owner)?;
    }
    if let Some(source) = input.source_filter.as_deref() {
        validate_text("source_filter", source, true)?;
    }
    validate_rule_shape(RuleShape {
        rule_type: input.rule_type,
        value_hundredths: input.value_hundredths,
        calculation_type: input.calculation_type,
        tiers: &input.tiers,
        formula: input.formula.as_deref(),
        priority: input.priority,
    })
}

/// Validates a partial update against the rule it will be merged into.
pub fn validate_rule_update(
    current: &crate::types::CommissionRule,
    update: &UpdateCommissionRule,
) -> ValidationResult<()> {
    if let Some(name) = update.name.as_deref() {
        validate_name(name)?;
    }
    if let Some(source) = update.source_filter.as_deref() {
        validate_text("source_filter", source, true)?;
    }
    validate_rule_shape(RuleShape {
        rule_type: update.rule_type.unwrap_or(current.rule_type),
        value_hundredths: update.value_hundredths.unwrap_or(current.value_hundredths),
        calculation_type: update.calculation_type.unwrap_or(current.calculation_type),
        tiers: update.tiers.as_deref().unwrap_or(&current.tiers),
        formula: update.formula.as_deref().or(current.formula.as_deref()),
        priority: update.priority.unwrap_or(current.priority),
    })
}

// =============================================================================
// Other Validators
// =============================================================================

pub fn validate_new_campaign(input: &NewCommissionCampaign) -> ValidationResult<()> {
    validate_name(&input.name)?;
    if input.multiplier_bps <= BPS_SCALE || input.multiplier_bps > MAX_CAMPAIGN_MULTIPLIER_BPS {
        return Err(ValidationError::OutOfRange {
            field: "multiplier_bps".to_string(),
            min: BPS_SCALE + 1,
            max: MAX_CAMPAIGN_MULTIPLIER_BPS,
        });
    }
    if input.applies_to_calculation_type == Some(CalculationType::Unrecognized) {
        return Err(ValidationError::NotAllowed {
            field: "applies_to_calculation_type".to_string(),
            allowed: CalculationType::ALL
                .iter()
                .map(|c| c.code().to_string())
                .collect(),
        });
    }
    if input.ends_at < input.starts_at {
        return Err(ValidationError::Inconsistent {
            field: "ends_at".to_string(),
            reason: "campaign must not end before it starts".to_string(),
        });
    }
    Ok(())
}

pub fn validate_bonus_rules(rules: &[BonusRule]) -> ValidationResult<()> {
    if rules.len() > MAX_BONUS_RULES {
        return Err(ValidationError::OutOfRange {
            field: "bonus_rules".to_string(),
            min: 0,
            max: MAX_BONUS_RULES as i64,
        });
    }
    for rule in rules {
        if rule.threshold_bps < 0 {
            return Err(ValidationError::MustBePositive {
                field: "bonus_rules.threshold_bps".to_string(),
            });
        }
        validate_bps("bonus_rules.bonus_bps", rule.bonus_bps)?;
    }
    Ok(())
}

pub fn validate_new_goal(input: &NewCommissionGoal) -> ValidationResult<Period> {
    validate_id("user_id", &input.user_id)?;
    let period = validate_period(&input.period)?;
    if input.target_amount_cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "target_amount_cents".to_string(),
        });
    }
    validate_bonus_rules(&input.bonus_rules)?;
    Ok(period)
}

pub fn validate_batch(input: &BatchStatusUpdate) -> ValidationResult<()> {
    if input.event_ids.is_empty() {
        return Err(ValidationError::Required {
            field: "event_ids".to_string(),
        });
    }
    if input.event_ids.len() > MAX_BATCH_EVENTS {
        return Err(ValidationError::OutOfRange {
            field: "event_ids".to_string(),
            min: 1,
            max: MAX_BATCH_EVENTS as i64,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

pub fn validate_release(input: &ReleasePayment) -> ValidationResult<()> {
    validate_id("work_order_id", &input.work_order_id)?;
    validate_id("receivable_id", &input.receivable_id)?;
    if input.payment_cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "payment_cents".to_string(),
        });
    }
    Ok(())
}

/// At least two shares, each above zero, totalling exactly 100%, with no
/// (user, role) listed twice.
pub fn validate_split(input: &SplitEvent) -> ValidationResult<()> {
    if input.shares.len() < 2 || input.shares.len() > MAX_SPLIT_SHARES {
        return Err(ValidationError::OutOfRange {
            field: "shares".to_string(),
            min: 2,
            max: MAX_SPLIT_SHARES as i64,
        });
    }

    let mut seen: HashSet<(&str, Role)> = HashSet::new();
    let mut total = 0i64;
    for share in &input.shares {
        validate_id("shares.user_id", &share.user_id)?;
        if !(1..=BPS_SCALE).contains(&share.percentage_bps) {
            return Err(ValidationError::OutOfRange {
                field: "shares.percentage_bps".to_string(),
                min: 1,
                max: BPS_SCALE,
            });
        }
        let role = share.role.unwrap_or(Role::Technician);
        if !seen.insert((share.user_id.as_str(), role)) {
            return Err(ValidationError::Inconsistent {
                field: "shares".to_string(),
                reason: format!("{} is listed twice as {}", share.user_id, role),
            });
        }
        total += share.percentage_bps;
    }

    if total != BPS_SCALE {
        return Err(ValidationError::Inconsistent {
            field: "shares".to_string(),
            reason: format!("percentages must total 100.00%, got {}", Rate::from_bps(total)),
        });
    }
    Ok(())
}
