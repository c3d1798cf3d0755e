//! # Database Error Types
//!
//! What can go wrong between the repositories and SQLite, sorted by what
//! the engine does about it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sqlx::Error                     DbError               engine reaction  │
//! │  ─────────────────────────────   ────────────────────  ───────────────  │
//! │  UNIQUE constraint failed   ──►  UniqueViolation   ──► Conflict         │
//! │  FOREIGN KEY constraint     ──►  ForeignKeyViolation ► Internal         │
//! │  SQLITE_BUSY / LOCKED       ──►  Busy              ──► Storage (retry)  │
//! │  PoolTimedOut               ──►  PoolExhausted     ──► Storage (retry)  │
//! │  PoolClosed / connect       ──►  ConnectionFailed  ──► Storage (retry)  │
//! │  Decode / ColumnDecode      ──►  Serialization     ──► Internal         │
//! │  anything else              ──►  QueryFailed / Internal                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The unique violations that matter are the generation marker, the open
//! dispute index, the settlement period key and the recurring link key.

use thiserror::Error;

/// SQLite extended result codes for constraint failures.
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";
const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";
/// Primary result codes for lock contention.
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// `field` is the constraint target as SQLite reports it
    /// (`commission_generations.tenant_id, commission_generations.work_order_id`).
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Another writer holds the database lock past the busy timeout.
    #[error("Database is busy: {0}")]
    Busy(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A JSON column (tiers, bonus rules, payload) or enum could not be decoded.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }

    /// Whether the whole operation can be retried as-is.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::Busy(_) | DbError::PoolExhausted | DbError::ConnectionFailed(_)
        )
    }

    fn from_database(db_err: &dyn sqlx::error::DatabaseError) -> Self {
        let msg = db_err.message();
        let code = db_err.code();

        match code.as_deref() {
            Some(SQLITE_CONSTRAINT_UNIQUE) | Some(SQLITE_CONSTRAINT_PRIMARYKEY) => {
                DbError::UniqueViolation {
                    field: constraint_target(msg),
                    value: "unknown".to_string(),
                }
            }
            Some(SQLITE_CONSTRAINT_FOREIGNKEY) => DbError::ForeignKeyViolation {
                message: msg.to_string(),
            },
            Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => DbError::Busy(msg.to_string()),
            // Some drivers only report the primary code; fall back to the text.
            _ if db_err.is_unique_violation() || msg.contains("UNIQUE constraint failed") => {
                DbError::UniqueViolation {
                    field: constraint_target(msg),
                    value: "unknown".to_string(),
                }
            }
            _ if db_err.is_foreign_key_violation() => DbError::ForeignKeyViolation {
                message: msg.to_string(),
            },
            _ if msg.contains("database is locked") => DbError::Busy(msg.to_string()),
            _ => DbError::QueryFailed(msg.to_string()),
        }
    }
}

/// `"UNIQUE constraint failed: t.a, t.b"` → `"t.a, t.b"`.
fn constraint_target(message: &str) -> String {
    message
        .split_once("constraint failed: ")
        .map(|(_, target)| target.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) => DbError::from_database(db_err.as_ref()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DbError::Serialization(err.to_string())
            }
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            sqlx::Error::Io(_) => DbError::ConnectionFailed(err.to_string()),
            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers() {
        assert!(DbError::duplicate("commission_disputes.commission_event_id", "e1")
            .is_unique_violation());
        assert!(!DbError::not_found("Rule", "r1").is_unique_violation());
        assert!(DbError::PoolExhausted.is_transient());
        assert!(DbError::Busy("database is locked".to_string()).is_transient());
        assert!(!DbError::QueryFailed("no such table: x".to_string()).is_transient());
        assert!(!DbError::not_found("Rule", "r1").is_transient());
    }

    #[test]
    fn test_constraint_target() {
        assert_eq!(
            constraint_target("UNIQUE constraint failed: commission_generations.tenant_id, commission_generations.work_order_id"),
            "commission_generations.tenant_id, commission_generations.work_order_id"
        );
        assert_eq!(constraint_target("disk full"), "unknown");
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(matches!(
            DbError::from(sqlx::Error::RowNotFound),
            DbError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_sqlite_unique_violation_is_detected() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE markers (work_order_id TEXT PRIMARY KEY)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO markers VALUES ('wo-1')")
            .execute(&pool)
            .await
            .unwrap();

        let err = sqlx::query("INSERT INTO markers VALUES ('wo-1')")
            .execute(&pool)
            .await
            .unwrap_err();

        let db_err = DbError::from(err);
        assert!(db_err.is_unique_violation(), "{db_err:?}");
    }
}
