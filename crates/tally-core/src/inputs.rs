//! Request shapes accepted by the engine's write operations.
//!
//! These are what an HTTP adapter or the worker deserializes; the engine
//! validates them (see [`crate::validation`]) before opening a transaction.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{
    AppliesTo, BonusRule, CalculationType, EventStatus, Role, RuleType, Tier, Trigger,
};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCommissionRule {
    /// None makes the rule tenant-wide.
    #[serde(default)]
    pub owner_user_id: Option<String>,
    pub name: String,
    pub rule_type: RuleType,
    pub value_hundredths: i64,
    #[serde(default)]
    pub applies_to: AppliesTo,
    pub calculation_type: CalculationType,
    #[serde(default)]
    pub applies_to_role: Option<Role>,
    #[serde(default)]
    pub applies_when: Trigger,
    #[serde(default)]
    pub tiers: Vec<Tier>,
    #[serde(default)]
    pub formula: Option<String>,
    /// Seller rules: only orders quoted from this lead source.
    #[serde(default)]
    pub source_filter: Option<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Partial update; absent fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(default)]
pub struct UpdateCommissionRule {
    pub name: Option<String>,
    pub rule_type: Option<RuleType>,
    pub value_hundredths: Option<i64>,
    pub applies_to: Option<AppliesTo>,
    pub calculation_type: Option<CalculationType>,
    pub applies_to_role: Option<Role>,
    pub applies_when: Option<Trigger>,
    pub tiers: Option<Vec<Tier>>,
    pub formula: Option<String>,
    pub source_filter: Option<String>,
    pub priority: Option<i64>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCommissionCampaign {
    pub name: String,
    pub multiplier_bps: i64,
    #[serde(default)]
    pub applies_to_role: Option<Role>,
    #[serde(default)]
    pub applies_to_calculation_type: Option<CalculationType>,
    #[ts(as = "String")]
    pub starts_at: NaiveDate,
    #[ts(as = "String")]
    pub ends_at: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCommissionGoal {
    pub user_id: String,
    /// `YYYY-MM`
    pub period: String,
    pub target_amount_cents: i64,
    #[serde(default)]
    pub bonus_rules: Vec<BonusRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewRecurringCommission {
    pub user_id: String,
    pub recurring_contract_id: String,
    pub commission_rule_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OpenDispute {
    pub commission_event_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DisputeDecision {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ResolveDispute {
    pub decision: DisputeDecision,
    /// Only read on acceptance: rewrite the amount instead of reversing.
    #[serde(default)]
    pub new_amount_cents: Option<i64>,
    #[serde(default)]
    pub resolution_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BatchStatusUpdate {
    pub event_ids: Vec<String>,
    pub status: EventStatus,
}

/// A customer payment received against a work order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReleasePayment {
    pub work_order_id: String,
    /// The receivable the payment settles. Each one releases at most once.
    pub receivable_id: String,
    pub payment_cents: i64,
}

/// One user's part of a split event.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SplitShare {
    pub user_id: String,
    /// 10000 = the whole event.
    pub percentage_bps: i64,
    /// Missing role means technician.
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SplitEvent {
    pub shares: Vec<SplitShare>,
}
