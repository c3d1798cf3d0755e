//! # Commission Engine
//!
//! Every ledger operation, each in its own transaction.
//!
//! ## Operation Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       CommissionEngine                                  │
//! │                                                                         │
//! │  generator    generate_for_work_order · simulate · generate_batch       │
//! │  approval     approve_event · reverse_event · mark_event_paid · batch   │
//! │  dispute      open_dispute · resolve_dispute · cancel_dispute           │
//! │  recurring    process_monthly · recurring link CRUD                     │
//! │  release      release_by_payment · list_payment_releases                │
//! │  split        split_event · list_event_splits                           │
//! │  settlement   close_settlement · pay_settlement                         │
//! │  goal         refresh_achievement · close_goal · goal CRUD              │
//! │  rules        rule / campaign CRUD · calculation type catalogue         │
//! │  summary      balance_summary                                           │
//! │                                                                         │
//! │  Each call takes an EngineContext { tenant, actor, privileged, today }  │
//! │  and never reads ambient state for a business decision.                 │
//! │                                                                         │
//! │  ┌──────────┐   reads    ┌──────────┐  BEGIN … COMMIT  ┌──────────┐     │
//! │  │ tally-   │◄───────────│  engine  │─────────────────►│  SQLite  │     │
//! │  │ core     │  pure math └────┬─────┘                  └──────────┘     │
//! │  └──────────┘                 │ after commit                            │
//! │                               ▼                                         │
//! │                          Notifier (outbox)                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::notify::{Notifier, OutboxNotifier};
use crate::pool::Database;
use tally_core::{EngineConfig, EngineContext, Notification};

pub mod approval;
pub mod dispute;
pub mod error;
pub mod generator;
pub mod goal;
pub mod recurring;
pub mod release;
pub mod rules;
pub mod settlement;
pub mod split;
pub mod summary;

pub use error::{ConflictKind, EngineError, EngineResult, ErrorCode, ErrorPayload};

/// The commission computation and settlement engine.
///
/// Cheap to clone; clones share the pool and the notifier.
#[derive(Debug, Clone)]
pub struct CommissionEngine {
    db: Database,
    config: EngineConfig,
    notifier: Arc<dyn Notifier>,
}

impl CommissionEngine {
    /// Creates an engine that queues notifications in the outbox table.
    pub fn new(db: Database, config: EngineConfig) -> Self {
        let notifier = Arc::new(OutboxNotifier::new(db.outbox()));
        CommissionEngine {
            db,
            config,
            notifier,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Hands notifications to the notifier. Failures are logged only.
    pub(crate) async fn dispatch(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            if let Err(e) = self.notifier.notify(&notification).await {
                warn!(
                    tenant_id = %notification.tenant_id,
                    user_id = %notification.user_id,
                    kind = notification.kind.as_str(),
                    error = %e,
                    "Notification dispatch failed"
                );
            }
        }
    }
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// The acting user, for operations a scheduled run may not perform.
pub(crate) fn require_actor(ctx: &EngineContext) -> EngineResult<&str> {
    ctx.actor_id
        .as_deref()
        .ok_or_else(|| EngineError::Forbidden("This operation requires an acting user".to_string()))
}

/// Logs unexpected failures with operation, tenant and entity before they
/// reach the caller as a generic error.
pub(crate) fn observe<T>(
    operation: &'static str,
    ctx: &EngineContext,
    entity_id: &str,
    result: EngineResult<T>,
) -> EngineResult<T> {
    if let Err(e) = &result {
        if e.is_unexpected() {
            error!(
                operation,
                tenant_id = %ctx.tenant_id,
                entity_id = %entity_id,
                error = %e,
                "Commission operation failed"
            );
        }
    }
    result
}
