//! # tally-db
//!
//! The commission ledger on SQLite, and [`CommissionEngine`], the only
//! thing that writes to it.
//!
//! ```text
//! ┌──────────────┐  EngineContext   ┌──────────────────┐   pure calls   ┌────────────┐
//! │ tally-worker │ ───────────────► │ CommissionEngine │ ─────────────► │ tally-core │
//! └──────────────┘                  └────────┬─────────┘                └────────────┘
//!                                            │ one transaction per operation
//!                                            ▼
//!                     repository/*  ──►  SqlitePool (pool.rs)  ──►  SQLite, WAL
//!                                            │
//!                                   after COMMIT: notify::Notifier
//! ```
//!
//! Reads that need no transaction (listing events, pending outbox rows)
//! go straight through the repositories on [`Database`].
//!
//! ```rust,ignore
//! use tally_core::{EngineConfig, EngineContext, Trigger};
//! use tally_db::{CommissionEngine, Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("tally.db")).await?;
//! let engine = CommissionEngine::new(db, EngineConfig::default());
//!
//! let ctx = EngineContext::new("tenant-1", today).with_actor("manager-7");
//! let events = engine
//!     .generate_for_work_order(&ctx, "wo-42", Trigger::OsCompleted)
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod engine;
pub mod error;
pub mod migrations;
pub mod notify;
pub mod pool;
pub mod repository;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use engine::{CommissionEngine, ConflictKind, EngineError, EngineResult, ErrorCode, ErrorPayload};
pub use engine::release::PaymentReleaseReport;
pub use error::{DbError, DbResult};
pub use migrations::MigrationStatus;
pub use notify::{NoopNotifier, Notifier, NotifyError, OutboxNotifier};
pub use pool::{Database, DbConfig};

pub use repository::event::{EventFilter, EventRepository};
pub use repository::outbox::{OutboxEntry, OutboxRepository, OutboxStatus};
pub use repository::rule::RuleRepository;
