//! # Domain Types
//!
//! Core domain types of the commission ledger.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Commission Ledger                               │
//! │                                                                         │
//! │  ┌──────────────────┐      ┌──────────────────┐                         │
//! │  │ CommissionRule   │─────►│ CommissionEvent  │◄──── CommissionDispute  │
//! │  │  calc type       │      │  base / amount   │        (open → …)       │
//! │  │  value / tiers   │      │  status          │                         │
//! │  └──────────────────┘      └────────┬─────────┘                         │
//! │           ▲                         │ approved events per (user,period) │
//! │           │                         ▼                                   │
//! │  ┌────────┴─────────┐      ┌──────────────────┐   ┌─────────────────┐   │
//! │  │ RecurringComm.   │      │ CommissionSettl. │   │ CommissionGoal  │   │
//! │  │  contract + rule │      │  closed → paid   │   │  achieved cache │   │
//! │  └──────────────────┘      └──────────────────┘   └─────────────────┘   │
//! │                                                                         │
//! │  CommissionCampaign: time-bounded multiplier on matching rules          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Storage Conventions
//! - `*_cents` columns hold [`Money`] in minor units
//! - `*_bps` columns hold [`Rate`] in basis points
//! - ids are UUID v4 strings

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;
use crate::rate::Rate;

// =============================================================================
// Participant Role
// =============================================================================

/// The role a user played on a work order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Technician,
    Seller,
    Driver,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Technician, Role::Seller, Role::Driver];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Technician => "technician",
            Role::Seller => "seller",
            Role::Driver => "driver",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Rule Enums
// =============================================================================

/// How a rule's `value` is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// `value` is a percentage (basis points).
    Percentage,
    /// `value` is an amount of money (cents).
    Fixed,
}

/// Which kind of work order lines a rule cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AppliesTo {
    #[default]
    All,
    Products,
    Services,
}

/// The business event that makes a rule fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Work order finished.
    #[default]
    OsCompleted,
    /// Work order invoiced.
    OsInvoiced,
    /// A receivable installment of the work order was paid.
    InstallmentPaid,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::OsCompleted => "os_completed",
            Trigger::OsInvoiced => "os_invoiced",
            Trigger::InstallmentPaid => "installment_paid",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Calculation Type
// =============================================================================

/// The formula used to turn a base amount into a commission.
///
/// ## Storage
/// Stored as its snake_case code. A code written by a newer release, or a
/// typo in a hand-edited row, decodes to [`CalculationType::Unrecognized`]
/// instead of failing the whole query; the evaluator returns zero for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CalculationType {
    PercentGross,
    PercentNet,
    PercentGrossMinusDisplacement,
    PercentServicesOnly,
    PercentProductsOnly,
    FixedPerOs,
    PercentProfit,
    PercentGrossMinusExpenses,
    TieredGross,
    FixedPerItem,
    CustomFormula,
    Unrecognized,
}

impl CalculationType {
    /// Every selectable calculation type (excludes `Unrecognized`).
    pub const ALL: [CalculationType; 11] = [
        CalculationType::PercentGross,
        CalculationType::PercentNet,
        CalculationType::PercentGrossMinusDisplacement,
        CalculationType::PercentServicesOnly,
        CalculationType::PercentProductsOnly,
        CalculationType::FixedPerOs,
        CalculationType::PercentProfit,
        CalculationType::PercentGrossMinusExpenses,
        CalculationType::TieredGross,
        CalculationType::FixedPerItem,
        CalculationType::CustomFormula,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            CalculationType::PercentGross => "percent_gross",
            CalculationType::PercentNet => "percent_net",
            CalculationType::PercentGrossMinusDisplacement => "percent_gross_minus_displacement",
            CalculationType::PercentServicesOnly => "percent_services_only",
            CalculationType::PercentProductsOnly => "percent_products_only",
            CalculationType::FixedPerOs => "fixed_per_os",
            CalculationType::PercentProfit => "percent_profit",
            CalculationType::PercentGrossMinusExpenses => "percent_gross_minus_expenses",
            CalculationType::TieredGross => "tiered_gross",
            CalculationType::FixedPerItem => "fixed_per_item",
            CalculationType::CustomFormula => "custom_formula",
            CalculationType::Unrecognized => "unrecognized",
        }
    }

    /// Parses a stored code. Never fails.
    pub fn from_code(code: &str) -> Self {
        CalculationType::ALL
            .iter()
            .copied()
            .find(|c| c.code() == code)
            .unwrap_or(CalculationType::Unrecognized)
    }

    /// Human-readable label for the rule editor catalogue.
    pub fn label(&self) -> &'static str {
        match self {
            CalculationType::PercentGross => "% of gross amount",
            CalculationType::PercentNet => "% of net amount (gross - expenses - cost)",
            CalculationType::PercentGrossMinusDisplacement => "% of (gross - displacement)",
            CalculationType::PercentServicesOnly => "% of services only",
            CalculationType::PercentProductsOnly => "% of products only",
            CalculationType::FixedPerOs => "Fixed amount per work order",
            CalculationType::PercentProfit => "% of profit",
            CalculationType::PercentGrossMinusExpenses => "% of (gross - expenses)",
            CalculationType::TieredGross => "Tiered % of gross",
            CalculationType::FixedPerItem => "Fixed amount per item",
            CalculationType::CustomFormula => "Custom formula",
            CalculationType::Unrecognized => "Unrecognized",
        }
    }

    /// Whether `value` is read as money rather than as a percentage.
    pub fn is_fixed_amount(&self) -> bool {
        matches!(
            self,
            CalculationType::FixedPerOs | CalculationType::FixedPerItem
        )
    }
}

impl fmt::Display for CalculationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(feature = "sqlx")]
mod calculation_type_sqlx {
    use super::CalculationType;
    use sqlx::encode::IsNull;
    use sqlx::error::BoxDynError;
    use sqlx::sqlite::{Sqlite, SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
    use sqlx::{Decode, Encode, Type};

    impl Type<Sqlite> for CalculationType {
        fn type_info() -> SqliteTypeInfo {
            <str as Type<Sqlite>>::type_info()
        }

        fn compatible(ty: &SqliteTypeInfo) -> bool {
            <str as Type<Sqlite>>::compatible(ty)
        }
    }

    impl<'q> Encode<'q, Sqlite> for CalculationType {
        fn encode_by_ref(
            &self,
            buf: &mut Vec<SqliteArgumentValue<'q>>,
        ) -> Result<IsNull, BoxDynError> {
            <&str as Encode<'q, Sqlite>>::encode(self.code(), buf)
        }
    }

    impl<'r> Decode<'r, Sqlite> for CalculationType {
        fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
            let code = <&str as Decode<'r, Sqlite>>::decode(value)?;
            Ok(CalculationType::from_code(code))
        }
    }
}

// =============================================================================
// Status Enums
// =============================================================================

/// Lifecycle of a commission event.
///
/// ## Note on `Paid`
/// An event becomes `Paid` when it is folded into a closed settlement. This
/// is NOT the moment money changes hands; that is [`SettlementStatus::Paid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Approved,
    Paid,
    Reversed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Approved => "approved",
            EventStatus::Paid => "paid",
            EventStatus::Reversed => "reversed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    Accepted,
    Rejected,
    Cancelled,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::Accepted => "accepted",
            DisputeStatus::Rejected => "rejected",
            DisputeStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a settlement. `Paid` means the money was transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Closed,
    Paid,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Closed => "closed",
            SettlementStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RecurringStatus {
    Active,
    Paused,
    Terminated,
}

impl RecurringStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurringStatus::Active => "active",
            RecurringStatus::Paused => "paused",
            RecurringStatus::Terminated => "terminated",
        }
    }
}

impl fmt::Display for RecurringStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Commission Rule
// =============================================================================

/// One step of a tiered schedule: at or above `threshold_cents`, pay
/// `value_bps` of the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Tier {
    pub threshold_cents: i64,
    pub value_bps: i64,
}

/// A named commission policy.
///
/// `owner_user_id = None` makes the rule tenant-wide: it applies to every
/// user playing `applies_to_role` on a work order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CommissionRule {
    pub id: String,
    pub tenant_id: String,
    pub owner_user_id: Option<String>,
    pub name: String,
    pub rule_type: RuleType,

    /// The rule's value scaled by 100: basis points for percentage rules,
    /// cents for fixed rules.
    pub value_hundredths: i64,

    pub applies_to: AppliesTo,
    pub calculation_type: CalculationType,
    pub applies_to_role: Option<Role>,
    pub applies_when: Trigger,

    /// Ascending by threshold.
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub tiers: Vec<Tier>,

    /// Expression for `custom_formula` rules.
    pub formula: Option<String>,

    /// Seller rules only: restrict to work orders whose quote came from
    /// this lead source.
    pub source_filter: Option<String>,

    /// Lower runs first; ties are broken by name.
    pub priority: i64,
    pub active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CommissionRule {
    /// The value read as a percentage.
    #[inline]
    pub fn rate(&self) -> Rate {
        Rate::from_bps(self.value_hundredths)
    }

    /// The value read as money.
    #[inline]
    pub fn fixed_amount(&self) -> Money {
        Money::from_cents(self.value_hundredths)
    }

    pub fn is_tenant_wide(&self) -> bool {
        self.owner_user_id.is_none()
    }

    /// Whether this rule can fire for `role` (a rule without a role fires for all).
    pub fn matches_role(&self, role: Role) -> bool {
        self.applies_to_role.map_or(true, |r| r == role)
    }

    /// Whether a seller earns from this rule on an order from `source`.
    ///
    /// Only sellers are filtered, and only when the order has a known source.
    pub fn matches_source(&self, role: Role, source: Option<&str>) -> bool {
        match (role, self.source_filter.as_deref(), source) {
            (Role::Seller, Some(filter), Some(source)) => filter == source,
            _ => true,
        }
    }
}

// =============================================================================
// Commission Campaign
// =============================================================================

/// A time-bounded boost on matching rules.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CommissionCampaign {
    pub id: String,
    pub tenant_id: String,
    pub name: String,

    /// 15000 = 1.5×
    pub multiplier_bps: i64,

    pub applies_to_role: Option<Role>,
    pub applies_to_calculation_type: Option<CalculationType>,

    /// Inclusive.
    #[ts(as = "String")]
    pub starts_at: NaiveDate,
    /// Inclusive.
    #[ts(as = "String")]
    pub ends_at: NaiveDate,

    pub active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl CommissionCampaign {
    #[inline]
    pub fn multiplier(&self) -> Rate {
        Rate::from_bps(self.multiplier_bps)
    }

    /// Whether the campaign window contains `date`.
    pub fn is_running_on(&self, date: NaiveDate) -> bool {
        self.active && self.starts_at <= date && date <= self.ends_at
    }
}

// =============================================================================
// Commission Event
// =============================================================================

/// One commission obligation: a (rule, user, work order) triple.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CommissionEvent {
    pub id: String,
    pub tenant_id: String,
    pub rule_id: String,
    pub work_order_id: Option<String>,
    pub recurring_commission_id: Option<String>,
    pub user_id: String,
    pub role: Option<Role>,
    pub trigger_type: Trigger,

    /// `YYYY-MM` the event accrues to; settlements aggregate on it.
    pub period: String,

    pub base_amount_cents: i64,
    pub commission_amount_cents: i64,

    /// Campaign multiplier applied to the amount (10000 when none).
    pub multiplier_bps: i64,

    pub status: EventStatus,
    pub settlement_id: Option<String>,
    pub notes: Option<String>,

    /// Who triggered the generation (None for scheduled runs).
    pub created_by: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CommissionEvent {
    #[inline]
    pub fn base_amount(&self) -> Money {
        Money::from_cents(self.base_amount_cents)
    }

    #[inline]
    pub fn commission_amount(&self) -> Money {
        Money::from_cents(self.commission_amount_cents)
    }
}

// =============================================================================
// Commission Dispute
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CommissionDispute {
    pub id: String,
    pub tenant_id: String,
    pub commission_event_id: String,

    /// The disputant.
    pub user_id: String,
    pub reason: String,
    pub status: DisputeStatus,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub resolved_at: Option<DateTime<Utc>>,

    /// Corrected amount, when an accepted dispute rewrote the event.
    pub new_amount_cents: Option<i64>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Splits and Payment Releases
// =============================================================================

/// One user's part of an event shared between several users.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CommissionSplit {
    pub id: String,
    pub tenant_id: String,
    pub commission_event_id: String,
    pub user_id: String,
    pub percentage_bps: i64,
    pub amount_cents: i64,
    pub role: Role,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Record of a customer payment that released commissions.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentRelease {
    pub tenant_id: String,
    pub receivable_id: String,
    pub work_order_id: String,
    pub payment_cents: i64,
    /// Payment over the balance still unpaid before it, capped at 10000.
    pub proportion_bps: i64,
    pub events_count: i64,
    pub released_by: Option<String>,
    #[ts(as = "String")]
    pub released_at: DateTime<Utc>,
}

// =============================================================================
// Commission Settlement
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CommissionSettlement {
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub period: String,
    pub total_amount_cents: i64,
    pub events_count: i64,
    pub status: SettlementStatus,
    pub closed_by: Option<String>,
    #[ts(as = "String")]
    pub closed_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CommissionSettlement {
    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }
}

// =============================================================================
// Commission Goal
// =============================================================================

/// Reaching `threshold_bps` of the target earns `bonus_bps` of the achieved
/// amount. 10000 bps = 100% of target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BonusRule {
    pub threshold_bps: i64,
    pub bonus_bps: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CommissionGoal {
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub period: String,
    pub target_amount_cents: i64,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub bonus_rules: Vec<BonusRule>,

    /// Cache over approved + paid events; recomputed by refresh.
    pub achieved_amount_cents: i64,

    pub status: GoalStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CommissionGoal {
    #[inline]
    pub fn target_amount(&self) -> Money {
        Money::from_cents(self.target_amount_cents)
    }

    #[inline]
    pub fn achieved_amount(&self) -> Money {
        Money::from_cents(self.achieved_amount_cents)
    }
}

// =============================================================================
// Recurring Commission
// =============================================================================

/// Standing link: one event per billing month for (user, contract, rule).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RecurringCommission {
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub recurring_contract_id: String,
    pub commission_rule_id: String,
    pub status: RecurringStatus,

    /// Its month is the idempotency key of the monthly run.
    #[ts(as = "Option<String>")]
    pub last_generated_at: Option<NaiveDate>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Notifications
// =============================================================================

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    CommissionsGenerated,
    CommissionsReleased,
    DisputeOpened,
    DisputeResolved,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::CommissionsGenerated => "commissions_generated",
            NotificationKind::CommissionsReleased => "commissions_released",
            NotificationKind::DisputeOpened => "dispute_opened",
            NotificationKind::DisputeResolved => "dispute_resolved",
        }
    }
}

/// A message for one user, handed to the notification dispatcher after the
/// owning transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub tenant_id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub payload: serde_json::Value,
}
