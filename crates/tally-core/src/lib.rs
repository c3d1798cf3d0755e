//! # tally-core
//!
//! Commission rules, campaign multipliers, ledger lifecycles and goal math.
//! Every function here takes what it needs as arguments: rows already read,
//! the tenant's config, and `today`.
//!
//! ```text
//!   WorkOrder + TechnicianAssignment ── beneficiary ──► who earns, in what role
//!                                                          │
//!   highest-priority CommissionRule (read by tally-db) ────┤
//!                                                          ▼
//!   CalculationContext ── evaluator::evaluate (formula) ──► rule amount
//!                                                          │
//!   CommissionCampaign[] ── campaign::multiplier_for ──────► × multiplier
//!                                                          ▼
//!                                              commission_amount (Money)
//!
//!   lifecycle: may this event / dispute / settlement / link change status?
//!   goal:      how far along is a goal, which bonus step applies?
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Ledger entities and status enums
//! - [`money`] / [`rate`] - Integer money and basis-point rates
//! - [`evaluator`] - `(rule, base, context) → amount`
//! - [`formula`] - Safe arithmetic for `custom_formula` rules
//! - [`campaign`] - Campaign multiplier resolution
//! - [`beneficiary`] - Who earns on a work order
//! - [`lifecycle`] - Status transition checks
//! - [`goal`] - Achievement and bonus math
//! - [`split`] - Dividing an event between users
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::money::Money;
//! use tally_core::rate::Rate;
//!
//! let gross = Money::from_cents(1_200_000); // 12,000.00
//! let commission = gross.percentage(Rate::from_bps(800)); // 8%
//! assert_eq!(commission.cents(), 96_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod beneficiary;
pub mod campaign;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod formula;
pub mod goal;
pub mod inputs;
pub mod lifecycle;
pub mod money;
pub mod period;
pub mod rate;
pub mod split;
pub mod types;
pub mod validation;
pub mod work_order;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use config::{CampaignComposition, EngineConfig};
pub use context::EngineContext;
pub use error::{CoreError, CoreResult, ValidationError};
pub use inputs::*;
pub use money::Money;
pub use period::Period;
pub use rate::Rate;
pub use types::*;
pub use work_order::{
    CalculationContext, LineKind, RecurringContract, TechnicianAssignment, WorkOrder,
    WorkOrderItem,
};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of rule and campaign names.
pub const MAX_NAME_LENGTH: usize = 255;

/// Maximum length of dispute reasons and resolution notes.
pub const MAX_REASON_LENGTH: usize = 2000;

/// Maximum number of tiers on a tiered rule.
pub const MAX_RULE_TIERS: usize = 20;

/// Maximum number of bonus steps on a goal.
pub const MAX_BONUS_RULES: usize = 20;

/// Rule priorities range from 0 (first) to this value.
pub const MAX_RULE_PRIORITY: i64 = 10_000;

/// Campaign multipliers are capped at 5×.
pub const MAX_CAMPAIGN_MULTIPLIER_BPS: i64 = 50_000;

/// Maximum events in one batch status update.
pub const MAX_BATCH_EVENTS: usize = 500;

/// Maximum users sharing one split event.
pub const MAX_SPLIT_SHARES: usize = 20;
