//! # Domain Errors
//!
//! Raised by the pure calculators and state machines in this crate.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ValidationError ──► CoreError::Validation ──┐                          │
//! │  CoreError::Invalid*Transition / *NotOpen ───┼──► EngineError (tally-db)│
//! │  CoreError::SelfApproval ────────────────────┘     │                    │
//! │                                                    ▼                    │
//! │                                  ErrorPayload { code, message, status } │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validation failures are detected before a transaction opens. Transition
//! errors are detected inside one, against the row as it was read.

use thiserror::Error;

/// A domain rule refused the requested change.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A commission event cannot move from its current status to the target.
    ///
    /// ## Lifecycle
    /// ```text
    ///   pending ──► approved ──► paid
    ///      │            │
    ///      └────────────┴──► reversed
    /// ```
    #[error("Commission event cannot move from {from} to {to}")]
    InvalidEventTransition { from: String, to: String },

    /// A dispute is no longer open.
    #[error("Dispute is {status}, only open disputes can be changed")]
    DisputeNotOpen { status: String },

    /// The event is in a status that cannot be disputed.
    #[error("Commission event is {status}; only pending or approved events can be disputed")]
    EventNotDisputable { status: String },

    /// A settlement cannot move from its current status to the target.
    #[error("Settlement cannot move from {from} to {to}")]
    InvalidSettlementTransition { from: String, to: String },

    /// A goal that is already closed was asked to change.
    #[error("Goal is already closed")]
    GoalClosed,

    /// A recurring link cannot move between the requested statuses.
    #[error("Recurring commission cannot move from {from} to {to}")]
    InvalidRecurringTransition { from: String, to: String },

    /// A user tried to approve or reject a commission earned by themselves.
    #[error("You cannot approve or reject your own commission")]
    SelfApproval,

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Malformed input: a bad rule definition, an unknown period, an empty
/// reason.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    /// Names and dispute text are length-capped.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Rates, priorities and multipliers.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// An unparseable `YYYY-MM` period or custom formula.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Two fields disagree, such as a campaign ending before it starts.
    #[error("{field}: {reason}")]
    Inconsistent { field: String, reason: String },
}

pub type CoreResult<T> = Result<T, CoreError>;
