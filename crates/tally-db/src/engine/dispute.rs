//! # Dispute Workflow
//!
//! ```text
//!   open_dispute ──► open ──┬── resolve(accept, new_amount) ──► accepted
//!                           │      event amount rewritten, status kept
//!                           ├── resolve(accept)             ──► accepted
//!                           │      event reversed
//!                           ├── resolve(reject)             ──► rejected
//!                           │      event untouched
//!                           └── cancel (disputant)          ──► cancelled
//! ```
//!
//! At most one dispute per event is open at a time; the partial unique
//! index on `commission_disputes` enforces it under concurrency. Closing is a
//! conditional UPDATE on `status = 'open'`, so of two concurrent resolutions
//! exactly one wins.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::error::{ConflictKind, EngineError, EngineResult};
use super::{new_id, observe, require_actor, CommissionEngine};
use crate::repository::dispute::DisputeClosure;
use tally_core::lifecycle::{
    check_disputable, check_dispute_open, check_event_transition, check_not_self_approval,
};
use tally_core::validation::{validate_id, validate_non_negative_amount, validate_text};
use tally_core::{
    CommissionDispute, CommissionEvent, DisputeDecision, DisputeStatus, EngineContext,
    EventStatus, Money, Notification, NotificationKind, OpenDispute, ResolveDispute,
};

/// The closed dispute and the event as it stands afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct DisputeResolution {
    pub dispute: CommissionDispute,
    pub event: CommissionEvent,
}

impl CommissionEngine {
    /// Opens a dispute on a pending or approved event.
    ///
    /// Without privilege, users may only dispute their own commissions.
    pub async fn open_dispute(
        &self,
        ctx: &EngineContext,
        input: &OpenDispute,
    ) -> EngineResult<CommissionDispute> {
        let result = self.open_dispute_inner(ctx, input).await;
        observe("open_dispute", ctx, &input.commission_event_id, result)
    }

    async fn open_dispute_inner(
        &self,
        ctx: &EngineContext,
        input: &OpenDispute,
    ) -> EngineResult<CommissionDispute> {
        validate_id("commission_event_id", &input.commission_event_id)?;
        validate_text("reason", &input.reason, true)?;
        let actor = require_actor(ctx)?;

        let event = self.get_event(ctx, &input.commission_event_id).await?;
        if !ctx.privileged && event.user_id != actor {
            return Err(EngineError::Forbidden(
                "You can only dispute your own commissions".to_string(),
            ));
        }
        check_disputable(event.status)?;

        let now = Utc::now();
        let dispute = CommissionDispute {
            id: new_id(),
            tenant_id: ctx.tenant_id.clone(),
            commission_event_id: event.id.clone(),
            user_id: actor.to_string(),
            reason: input.reason.trim().to_string(),
            status: DisputeStatus::Open,
            resolution_notes: None,
            resolved_by: None,
            resolved_at: None,
            new_amount_cents: None,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.db.disputes().insert(&dispute).await {
            if e.is_unique_violation() {
                return Err(EngineError::conflict(
                    ConflictKind::DisputeAlreadyOpen,
                    "an open dispute already exists for this commission",
                ));
            }
            return Err(e.into());
        }

        info!(
            tenant_id = %ctx.tenant_id,
            dispute_id = %dispute.id,
            event_id = %event.id,
            "Dispute opened"
        );

        self.dispatch(vec![Notification {
            tenant_id: ctx.tenant_id.clone(),
            user_id: event.user_id.clone(),
            kind: NotificationKind::DisputeOpened,
            title: "Commission disputed".to_string(),
            body: format!("A dispute was opened on a commission of {}", event.commission_amount()),
            payload: json!({
                "dispute_id": dispute.id,
                "commission_event_id": event.id,
            }),
        }])
        .await;

        Ok(dispute)
    }

    /// Accepts or rejects an open dispute.
    ///
    /// ## Errors
    /// - `Conflict(InvalidTransition)` if the dispute is no longer open, or
    ///   an accepted dispute's event has meanwhile been settled or reversed
    /// - `Forbidden` if the resolver earns the disputed commission
    pub async fn resolve_dispute(
        &self,
        ctx: &EngineContext,
        dispute_id: &str,
        input: &ResolveDispute,
    ) -> EngineResult<DisputeResolution> {
        let result = self.resolve_dispute_inner(ctx, dispute_id, input).await;
        observe("resolve_dispute", ctx, dispute_id, result)
    }

    async fn resolve_dispute_inner(
        &self,
        ctx: &EngineContext,
        dispute_id: &str,
        input: &ResolveDispute,
    ) -> EngineResult<DisputeResolution> {
        validate_id("dispute_id", dispute_id)?;
        if let Some(notes) = input.resolution_notes.as_deref() {
            validate_text("resolution_notes", notes, false)?;
        }
        if let Some(amount) = input.new_amount_cents {
            validate_non_negative_amount("new_amount_cents", amount)?;
        }
        let actor = require_actor(ctx)?;

        let dispute = self.get_dispute(ctx, dispute_id).await?;
        check_dispute_open(dispute.status)?;
        let event = self.get_event(ctx, &dispute.commission_event_id).await?;
        check_not_self_approval(&event, actor, ctx.privileged)?;

        let accepted = input.decision == DisputeDecision::Accept;
        // Rejection ignores any amount that came along with it.
        let new_amount = if accepted { input.new_amount_cents } else { None };
        if accepted {
            check_disputable(event.status)?;
            if new_amount.is_none() {
                check_event_transition(event.status, EventStatus::Reversed)?;
            }
        }

        let now = Utc::now();
        let closure = DisputeClosure {
            status: if accepted {
                DisputeStatus::Accepted
            } else {
                DisputeStatus::Rejected
            },
            resolution_notes: input.resolution_notes.as_deref().map(str::trim),
            resolved_by: actor,
            new_amount_cents: new_amount,
            at: now,
        };

        let disputes = self.db.disputes();
        let events = self.db.events();
        let mut tx = self.db.pool().begin().await?;

        if !disputes.close(&mut *tx, &ctx.tenant_id, dispute_id, &closure).await? {
            return Err(EngineError::conflict(
                ConflictKind::InvalidTransition,
                "Dispute was resolved concurrently",
            ));
        }

        if accepted {
            let applied = match new_amount {
                Some(amount) => {
                    let note = format!(
                        "Amount adjusted from {} to {} by dispute {}",
                        event.commission_amount(),
                        Money::from_cents(amount),
                        dispute_id
                    );
                    events
                        .rewrite_amount(&mut *tx, &ctx.tenant_id, &event.id, amount, &note, now)
                        .await?
                }
                None => {
                    let note = format!("Reversed by dispute {}", dispute_id);
                    events
                        .transition(
                            &mut *tx,
                            &ctx.tenant_id,
                            &event.id,
                            event.status,
                            EventStatus::Reversed,
                            Some(&note),
                            now,
                        )
                        .await?
                }
            };
            if !applied {
                return Err(EngineError::conflict(
                    ConflictKind::InvalidTransition,
                    "Commission event changed status while the dispute was resolved",
                ));
            }
        }

        let dispute = disputes
            .get_with(&mut *tx, &ctx.tenant_id, dispute_id)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionDispute", dispute_id))?;
        let event = events
            .get_with(&mut *tx, &ctx.tenant_id, &event.id)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionEvent", &event.id))?;
        tx.commit().await?;

        info!(
            tenant_id = %ctx.tenant_id,
            dispute_id = %dispute_id,
            event_id = %event.id,
            status = %dispute.status,
            "Dispute resolved"
        );

        self.dispatch(vec![Notification {
            tenant_id: ctx.tenant_id.clone(),
            user_id: dispute.user_id.clone(),
            kind: NotificationKind::DisputeResolved,
            title: format!("Dispute {}", dispute.status),
            body: match dispute.status {
                DisputeStatus::Accepted => "Your commission dispute was accepted".to_string(),
                _ => "Your commission dispute was rejected".to_string(),
            },
            payload: json!({
                "dispute_id": dispute.id,
                "commission_event_id": event.id,
                "status": dispute.status,
                "new_amount_cents": dispute.new_amount_cents,
            }),
        }])
        .await;

        Ok(DisputeResolution { dispute, event })
    }

    /// Withdraws an open dispute. Only the disputant or a privileged actor.
    pub async fn cancel_dispute(
        &self,
        ctx: &EngineContext,
        dispute_id: &str,
    ) -> EngineResult<CommissionDispute> {
        validate_id("dispute_id", dispute_id)?;
        let actor = require_actor(ctx)?;

        let dispute = self.get_dispute(ctx, dispute_id).await?;
        if !ctx.privileged && dispute.user_id != actor {
            return Err(EngineError::Forbidden(
                "Only the disputant can cancel this dispute".to_string(),
            ));
        }
        check_dispute_open(dispute.status)?;

        let closure = DisputeClosure {
            status: DisputeStatus::Cancelled,
            resolution_notes: None,
            resolved_by: actor,
            new_amount_cents: None,
            at: Utc::now(),
        };

        let disputes = self.db.disputes();
        let mut tx = self.db.pool().begin().await?;
        if !disputes.close(&mut *tx, &ctx.tenant_id, dispute_id, &closure).await? {
            return Err(EngineError::conflict(
                ConflictKind::InvalidTransition,
                "Dispute was resolved concurrently",
            ));
        }
        let cancelled = disputes
            .get_with(&mut *tx, &ctx.tenant_id, dispute_id)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionDispute", dispute_id))?;
        tx.commit().await?;

        info!(tenant_id = %ctx.tenant_id, dispute_id = %dispute_id, "Dispute cancelled");
        Ok(cancelled)
    }

    pub async fn get_dispute(&self, ctx: &EngineContext, id: &str) -> EngineResult<CommissionDispute> {
        self.db
            .disputes()
            .get(&ctx.tenant_id, id)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionDispute", id))
    }

    pub async fn list_disputes(
        &self,
        ctx: &EngineContext,
        status: Option<DisputeStatus>,
        user_id: Option<&str>,
    ) -> EngineResult<Vec<CommissionDispute>> {
        Ok(self
            .db
            .disputes()
            .list(&ctx.tenant_id, status, user_id)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::test_support::*;
    use std::sync::Arc;
    use tally_core::EngineConfig;

    fn open(event_id: &str) -> OpenDispute {
        OpenDispute {
            commission_event_id: event_id.to_string(),
            reason: "Rate should be 12%".to_string(),
        }
    }

    fn accept(amount: Option<i64>) -> ResolveDispute {
        ResolveDispute {
            decision: DisputeDecision::Accept,
            new_amount_cents: amount,
            resolution_notes: Some("Checked".to_string()),
        }
    }

    #[tokio::test]
    async fn test_accept_with_amount_rewrites_event() {
        let notifier = RecordingNotifier::new();
        let engine = test_engine().await.with_notifier(notifier.clone());
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "tech-1", 10_000, EventStatus::Pending, "2025-01").await;

        let dispute = engine.open_dispute(&ctx_as("tech-1"), &open("e1")).await.unwrap();
        let resolution = engine
            .resolve_dispute(&ctx(), &dispute.id, &accept(Some(12_000)))
            .await
            .unwrap();

        assert_eq!(resolution.dispute.status, DisputeStatus::Accepted);
        assert_eq!(resolution.dispute.new_amount_cents, Some(12_000));
        assert_eq!(resolution.dispute.resolved_by.as_deref(), Some("manager"));
        assert_eq!(resolution.event.status, EventStatus::Pending);
        assert_eq!(resolution.event.commission_amount_cents, 12_000);
        let notes = resolution.event.notes.unwrap_or_default();
        assert!(notes.contains("Amount adjusted from 100.00 to 120.00"));

        let sent = notifier.taken();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].kind, NotificationKind::DisputeOpened);
        assert_eq!(sent[1].kind, NotificationKind::DisputeResolved);
        assert_eq!(sent[1].user_id, "tech-1");
    }

    #[tokio::test]
    async fn test_accept_without_amount_reverses_event() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "tech-1", 10_000, EventStatus::Approved, "2025-01").await;

        let dispute = engine.open_dispute(&ctx_as("tech-1"), &open("e1")).await.unwrap();
        let resolution = engine
            .resolve_dispute(&ctx(), &dispute.id, &accept(None))
            .await
            .unwrap();

        assert_eq!(resolution.event.status, EventStatus::Reversed);
        assert_eq!(resolution.event.commission_amount_cents, 10_000);
    }

    #[tokio::test]
    async fn test_reject_leaves_event_untouched() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "tech-1", 10_000, EventStatus::Pending, "2025-01").await;

        let dispute = engine.open_dispute(&ctx_as("tech-1"), &open("e1")).await.unwrap();
        let reject = ResolveDispute {
            decision: DisputeDecision::Reject,
            new_amount_cents: Some(1),
            resolution_notes: None,
        };
        let resolution = engine.resolve_dispute(&ctx(), &dispute.id, &reject).await.unwrap();

        assert_eq!(resolution.dispute.status, DisputeStatus::Rejected);
        assert_eq!(resolution.dispute.new_amount_cents, None);
        assert_eq!(resolution.event.commission_amount_cents, 10_000);
        assert_eq!(resolution.event.status, EventStatus::Pending);
        assert!(resolution.event.notes.is_none());
    }

    #[tokio::test]
    async fn test_second_open_dispute_conflicts() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "tech-1", 10_000, EventStatus::Pending, "2025-01").await;

        let first = engine.open_dispute(&ctx_as("tech-1"), &open("e1")).await.unwrap();
        let err = engine
            .open_dispute(&ctx_as("tech-1"), &open("e1"))
            .await
            .unwrap_err();
        assert!(err.is_conflict(ConflictKind::DisputeAlreadyOpen));
        assert_eq!(err.to_string(), "an open dispute already exists for this commission");

        // Cancelling frees the slot.
        engine.cancel_dispute(&ctx_as("tech-1"), &first.id).await.unwrap();
        engine.open_dispute(&ctx_as("tech-1"), &open("e1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_resolving_twice_conflicts() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "tech-1", 10_000, EventStatus::Pending, "2025-01").await;

        let dispute = engine.open_dispute(&ctx_as("tech-1"), &open("e1")).await.unwrap();
        engine
            .resolve_dispute(&ctx(), &dispute.id, &accept(Some(9_000)))
            .await
            .unwrap();
        let err = engine
            .resolve_dispute(&ctx(), &dispute.id, &accept(Some(8_000)))
            .await
            .unwrap_err();
        assert!(err.is_conflict(ConflictKind::InvalidTransition));

        let event = engine.get_event(&ctx(), "e1").await.unwrap();
        assert_eq!(event.commission_amount_cents, 9_000);
    }

    #[tokio::test]
    async fn test_disputes_only_on_unsettled_events() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "tech-1", 10_000, EventStatus::Paid, "2025-01").await;

        let err = engine
            .open_dispute(&ctx_as("tech-1"), &open("e1"))
            .await
            .unwrap_err();
        assert!(err.is_conflict(ConflictKind::InvalidTransition));
    }

    #[tokio::test]
    async fn test_users_cannot_dispute_or_resolve_for_themselves() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "tech-1", 10_000, EventStatus::Pending, "2025-01").await;

        let err = engine
            .open_dispute(&ctx_as("tech-2"), &open("e1"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);

        let dispute = engine.open_dispute(&ctx_as("tech-1"), &open("e1")).await.unwrap();
        let err = engine
            .resolve_dispute(&ctx_as("tech-1"), &dispute.id, &accept(Some(20_000)))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_failing_notifier_keeps_resolution() {
        let engine = test_engine().await.with_notifier(Arc::new(FailingNotifier));
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "tech-1", 10_000, EventStatus::Pending, "2025-01").await;

        let dispute = engine.open_dispute(&ctx_as("tech-1"), &open("e1")).await.unwrap();
        let resolution = engine
            .resolve_dispute(&ctx(), &dispute.id, &accept(None))
            .await
            .unwrap();
        assert_eq!(resolution.dispute.status, DisputeStatus::Accepted);

        let stored = engine.get_dispute(&ctx(), &dispute.id).await.unwrap();
        assert_eq!(stored.status, DisputeStatus::Accepted);
        let event = engine.get_event(&ctx(), "e1").await.unwrap();
        assert_eq!(event.status, EventStatus::Reversed);
    }

    #[tokio::test]
    async fn test_negative_amount_is_rejected() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "tech-1", 10_000, EventStatus::Pending, "2025-01").await;

        let dispute = engine.open_dispute(&ctx_as("tech-1"), &open("e1")).await.unwrap();
        let err = engine
            .resolve_dispute(&ctx(), &dispute.id, &accept(Some(-5)))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let open_disputes = engine
            .list_disputes(&ctx(), Some(DisputeStatus::Open), None)
            .await
            .unwrap();
        assert_eq!(open_disputes.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_open_dispute_keeps_one_open() {
        let path = std::env::temp_dir().join(format!("tally-dispute-race-{}.db", new_id()));
        let db = Database::new(DbConfig::new(&path).max_connections(4))
            .await
            .unwrap();
        let engine = CommissionEngine::new(db.clone(), EngineConfig::default());
        insert_event(&db, "e1", "r1", "tech-1", 10_000, EventStatus::Pending, "2025-01").await;

        let (a, b) = {
            let (e1, e2) = (engine.clone(), engine.clone());
            let c1 = ctx_as("tech-1");
            let c2 = ctx_as("tech-1");
            tokio::join!(
                async move { e1.open_dispute(&c1, &open("e1")).await },
                async move { e2.open_dispute(&c2, &open("e1")).await },
            )
        };

        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        let conflict = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
        assert!(conflict.is_conflict(ConflictKind::DisputeAlreadyOpen));

        let open_disputes = db
            .disputes()
            .list(TENANT, Some(DisputeStatus::Open), None)
            .await
            .unwrap();
        assert_eq!(open_disputes.len(), 1);
        assert_eq!(open_disputes[0].commission_event_id, "e1");

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }
}
