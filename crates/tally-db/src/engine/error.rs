//! # Engine Error Type
//!
//! What callers of [`CommissionEngine`](super::CommissionEngine) see.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Engine                             │
//! │                                                                         │
//! │  ValidationError ──────────────────────────► Validation      400        │
//! │                                                                         │
//! │  CoreError::SelfApproval ──────────────────► Forbidden       403        │
//! │  CoreError::<illegal transition> ──────────► Conflict        409        │
//! │                                                                         │
//! │  DbError::NotFound ────────────────────────► NotFound        404        │
//! │  DbError::UniqueViolation ─────────────────► Conflict        409        │
//! │  DbError::<pool / lock / connection> ──────► Storage         503        │
//! │  DbError::<anything else> ─────────────────► Internal        500        │
//! │                                                                         │
//! │  EngineError::to_payload()                                              │
//! │  { "code": "ALREADY_GENERATED",                                         │
//! │    "message": "commissions already generated for this work order",      │
//! │    "status": 409 }                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage and internal failures never leak their details into the payload;
//! they are logged where they happen.

use serde::Serialize;
use thiserror::Error;

use crate::error::DbError;
use tally_core::{CoreError, ValidationError};

/// Why an operation had nothing to do, or was already done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    /// A generation pass already ran for the work order.
    AlreadyGenerated,
    /// The event already has an open dispute.
    DisputeAlreadyOpen,
    /// There is nothing approved to settle for (user, period).
    NoApprovedEvents,
    /// The (user, period) settlement has already been paid out.
    SettlementAlreadyPaid,
    /// The entity is not in a state that allows the requested change.
    InvalidTransition,
    /// A row with the same natural key exists.
    Duplicate,
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    AlreadyGenerated,
    DisputeAlreadyOpen,
    NoApprovedEvents,
    SettlementAlreadyPaid,
    InvalidTransition,
    Duplicate,
    Forbidden,
    NotFound,
    StorageUnavailable,
    Internal,
}

/// Structured error body for adapters (HTTP, CLI).
///
/// ```json
/// { "code": "NOT_FOUND", "message": "CommissionEvent not found: e-1", "status": 404 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    pub status: u16,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input, rejected before any transaction opens.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Nothing to do / already done. Never retried automatically.
    #[error("{message}")]
    Conflict { kind: ConflictKind, message: String },

    /// The caller may not perform this change.
    #[error("{0}")]
    Forbidden(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Storage temporarily unavailable; the transaction rolled back and the
    /// operation may be retried.
    #[error("Storage unavailable: {0}")]
    Storage(#[source] DbError),

    /// Unexpected failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn conflict(kind: ConflictKind, message: impl Into<String>) -> Self {
        EngineError::Conflict {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn already_generated() -> Self {
        EngineError::conflict(
            ConflictKind::AlreadyGenerated,
            "commissions already generated for this work order",
        )
    }

    pub fn is_conflict(&self, kind: ConflictKind) -> bool {
        matches!(self, EngineError::Conflict { kind: k, .. } if *k == kind)
    }

    /// Whether this failure is unexpected and must be logged with context.
    pub fn is_unexpected(&self) -> bool {
        matches!(self, EngineError::Storage(_) | EngineError::Internal(_))
    }

    /// HTTP-style status.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::Validation(_) => 400,
            EngineError::Forbidden(_) => 403,
            EngineError::NotFound { .. } => 404,
            EngineError::Conflict { .. } => 409,
            EngineError::Internal(_) => 500,
            EngineError::Storage(_) => 503,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Validation(_) => ErrorCode::ValidationError,
            EngineError::Conflict { kind, .. } => match kind {
                ConflictKind::AlreadyGenerated => ErrorCode::AlreadyGenerated,
                ConflictKind::DisputeAlreadyOpen => ErrorCode::DisputeAlreadyOpen,
                ConflictKind::NoApprovedEvents => ErrorCode::NoApprovedEvents,
                ConflictKind::SettlementAlreadyPaid => ErrorCode::SettlementAlreadyPaid,
                ConflictKind::InvalidTransition => ErrorCode::InvalidTransition,
                ConflictKind::Duplicate => ErrorCode::Duplicate,
            },
            EngineError::Forbidden(_) => ErrorCode::Forbidden,
            EngineError::NotFound { .. } => ErrorCode::NotFound,
            EngineError::Storage(_) => ErrorCode::StorageUnavailable,
            EngineError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        let message = match self {
            EngineError::Storage(_) => {
                "The ledger is temporarily unavailable, please retry".to_string()
            }
            EngineError::Internal(_) => "An unexpected error occurred".to_string(),
            other => other.to_string(),
        };

        ErrorPayload {
            code: self.code(),
            message,
            status: self.status_code(),
        }
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            DbError::UniqueViolation { field, value } => EngineError::conflict(
                ConflictKind::Duplicate,
                format!("{} '{}' already exists", field, value),
            ),
            e if e.is_transient() => EngineError::Storage(e),
            e => EngineError::Internal(e.to_string()),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => EngineError::Validation(e),
            CoreError::SelfApproval => EngineError::Forbidden(err.to_string()),
            other => EngineError::conflict(ConflictKind::InvalidTransition, other.to_string()),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_generated_payload() {
        let payload = EngineError::already_generated().to_payload();
        assert_eq!(payload.code, ErrorCode::AlreadyGenerated);
        assert_eq!(payload.status, 409);
        assert_eq!(
            payload.message,
            "commissions already generated for this work order"
        );

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["code"], "ALREADY_GENERATED");
    }

    #[test]
    fn test_core_errors_map_to_taxonomy() {
        let forbidden = EngineError::from(CoreError::SelfApproval);
        assert_eq!(forbidden.status_code(), 403);

        let transition = EngineError::from(CoreError::InvalidEventTransition {
            from: "paid".to_string(),
            to: "approved".to_string(),
        });
        assert!(transition.is_conflict(ConflictKind::InvalidTransition));

        let validation = EngineError::from(CoreError::Validation(ValidationError::Required {
            field: "reason".to_string(),
        }));
        assert_eq!(validation.status_code(), 400);
    }

    #[test]
    fn test_storage_errors_hide_details() {
        let err = EngineError::from(DbError::PoolExhausted);
        assert_eq!(err.status_code(), 503);
        assert!(err.is_unexpected());
        assert!(!err.to_payload().message.contains("pool"));

        let err = EngineError::from(DbError::Internal("disk I/O error".to_string()));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_payload().message, "An unexpected error occurred");
    }

    #[test]
    fn test_db_not_found_and_duplicate() {
        let err = EngineError::from(DbError::not_found("CommissionRule", "r1"));
        assert_eq!(err.to_payload().message, "CommissionRule not found: r1");

        let err = EngineError::from(DbError::duplicate("recurring_commissions", "u/c/r"));
        assert!(err.is_conflict(ConflictKind::Duplicate));
    }
}
