//! # Settlement Closer
//!
//! ```text
//!   close_settlement(user, period)                     pay_settlement(id)
//!   ┌────────────────────────────────────────────┐    ┌──────────────────────┐
//!   │ BEGIN                                      │    │ UPDATE … SET paid    │
//!   │   upsert (user, period) row, status closed │    │ WHERE status=closed  │
//!   │   already paid? ──► Conflict               │    └──────────────────────┘
//!   │   approved events ──► paid, settlement_id  │
//!   │   none moved? ──► NoApprovedEvents         │
//!   │   totals = Σ/count of folded events        │
//!   │ COMMIT                                     │
//!   └────────────────────────────────────────────┘
//! ```
//!
//! Two different "paid" states live here. An event is `paid` once a
//! settlement has folded it in; the settlement is `paid` once the money has
//! actually been transferred.
//!
//! Closing the same (user, period) again folds only events approved since,
//! and recomputes the totals over everything the settlement holds.

use chrono::Utc;
use tracing::info;

use super::error::{ConflictKind, EngineError, EngineResult};
use super::{new_id, observe, CommissionEngine};
use tally_core::lifecycle::check_settlement_payable;
use tally_core::validation::{validate_id, validate_period};
use tally_core::{CommissionSettlement, EngineContext, SettlementStatus, ValidationError};

impl CommissionEngine {
    /// Freezes the approved events of (user, period) into a settlement.
    ///
    /// ## Errors
    /// - `Validation` for a malformed or future period
    /// - `Conflict(NoApprovedEvents)` when nothing is approved
    /// - `Conflict(SettlementAlreadyPaid)` when the period was paid out
    pub async fn close_settlement(
        &self,
        ctx: &EngineContext,
        user_id: &str,
        period: &str,
    ) -> EngineResult<CommissionSettlement> {
        let result = self.close_settlement_inner(ctx, user_id, period).await;
        observe("close_settlement", ctx, user_id, result)
    }

    async fn close_settlement_inner(
        &self,
        ctx: &EngineContext,
        user_id: &str,
        period: &str,
    ) -> EngineResult<CommissionSettlement> {
        validate_id("user_id", user_id)?;
        let parsed = validate_period(period)?;
        if parsed > ctx.current_period() {
            return Err(ValidationError::Inconsistent {
                field: "period".to_string(),
                reason: "cannot close a future period".to_string(),
            }
            .into());
        }
        let period = parsed.to_string();

        let settlements = self.db.settlements();
        let events = self.db.events();
        let now = Utc::now();
        let mut tx = self.db.pool().begin().await?;

        settlements
            .upsert_closed(
                &mut *tx,
                &new_id(),
                &ctx.tenant_id,
                user_id,
                &period,
                ctx.actor_id.as_deref(),
                now,
            )
            .await?;
        let settlement = settlements
            .get_for_period_with(&mut *tx, &ctx.tenant_id, user_id, &period)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionSettlement", format!("{}/{}", user_id, period)))?;
        if settlement.status == SettlementStatus::Paid {
            return Err(EngineError::conflict(
                ConflictKind::SettlementAlreadyPaid,
                format!("settlement for {} in {} has already been paid", user_id, period),
            ));
        }

        let moved = events
            .settle_approved(&mut *tx, &ctx.tenant_id, user_id, &period, &settlement.id, now)
            .await?;
        if moved == 0 {
            return Err(EngineError::conflict(
                ConflictKind::NoApprovedEvents,
                format!("no approved commissions for {} in {}", user_id, period),
            ));
        }

        let (total, count) = events.settlement_totals(&mut *tx, &settlement.id).await?;
        settlements
            .set_totals(&mut *tx, &settlement.id, total, count, now)
            .await?;
        let closed = settlements
            .get_for_period_with(&mut *tx, &ctx.tenant_id, user_id, &period)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionSettlement", &settlement.id))?;
        tx.commit().await?;

        info!(
            tenant_id = %ctx.tenant_id,
            settlement_id = %closed.id,
            user_id = %user_id,
            period = %period,
            folded = moved,
            total_amount_cents = closed.total_amount_cents,
            "Settlement closed"
        );
        Ok(closed)
    }

    /// `closed → paid`, stamping `paid_at`. Events are not touched.
    pub async fn pay_settlement(
        &self,
        ctx: &EngineContext,
        settlement_id: &str,
    ) -> EngineResult<CommissionSettlement> {
        validate_id("settlement_id", settlement_id)?;
        let settlements = self.db.settlements();

        if !settlements
            .mark_paid(&ctx.tenant_id, settlement_id, Utc::now())
            .await?
        {
            let current = self.get_settlement(ctx, settlement_id).await?;
            check_settlement_payable(current.status)?;
            return Err(EngineError::conflict(
                ConflictKind::InvalidTransition,
                "Settlement changed status concurrently",
            ));
        }

        let paid = self.get_settlement(ctx, settlement_id).await?;
        info!(
            tenant_id = %ctx.tenant_id,
            settlement_id = %settlement_id,
            total_amount_cents = paid.total_amount_cents,
            "Settlement paid"
        );
        Ok(paid)
    }

    pub async fn get_settlement(&self, ctx: &EngineContext, id: &str) -> EngineResult<CommissionSettlement> {
        self.db
            .settlements()
            .get(&ctx.tenant_id, id)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionSettlement", id))
    }

    pub async fn list_settlements(
        &self,
        ctx: &EngineContext,
        user_id: Option<&str>,
        period: Option<&str>,
    ) -> EngineResult<Vec<CommissionSettlement>> {
        Ok(self
            .db
            .settlements()
            .list(&ctx.tenant_id, user_id, period)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::event::EventFilter;
    use crate::test_support::*;
    use tally_core::EventStatus;

    #[tokio::test]
    async fn test_close_folds_approved_events() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "u1", 100, EventStatus::Approved, "2025-01").await;
        insert_event(&db, "e2", "r1", "u1", 250, EventStatus::Approved, "2025-01").await;
        insert_event(&db, "e3", "r1", "u1", 75, EventStatus::Approved, "2025-01").await;
        insert_event(&db, "e4", "r1", "u1", 999, EventStatus::Pending, "2025-01").await;
        insert_event(&db, "e5", "r1", "u1", 500, EventStatus::Approved, "2024-12").await;
        insert_event(&db, "e6", "r1", "u2", 300, EventStatus::Approved, "2025-01").await;

        let settlement = engine.close_settlement(&ctx(), "u1", "2025-01").await.unwrap();

        assert_eq!(settlement.total_amount_cents, 425);
        assert_eq!(settlement.events_count, 3);
        assert_eq!(settlement.status, SettlementStatus::Closed);
        assert_eq!(settlement.closed_by.as_deref(), Some("manager"));

        let folded = engine
            .list_events(
                &ctx(),
                &EventFilter {
                    status: Some(EventStatus::Paid),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let mut ids: Vec<&str> = folded.iter().map(|e| e.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["e1", "e2", "e3"]);
        assert!(folded
            .iter()
            .all(|e| e.settlement_id.as_deref() == Some(settlement.id.as_str())));
    }

    #[tokio::test]
    async fn test_close_without_approved_events_conflicts() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "u1", 100, EventStatus::Pending, "2025-01").await;

        let err = engine.close_settlement(&ctx(), "u1", "2025-01").await.unwrap_err();
        assert!(err.is_conflict(ConflictKind::NoApprovedEvents));

        // The rolled-back close left no row behind.
        assert!(engine.list_settlements(&ctx(), Some("u1"), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reclose_reuses_row_and_recomputes() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "u1", 100, EventStatus::Approved, "2025-01").await;
        let first = engine.close_settlement(&ctx(), "u1", "2025-01").await.unwrap();

        insert_event(&db, "e2", "r1", "u1", 50, EventStatus::Approved, "2025-01").await;
        let second = engine.close_settlement(&ctx(), "u1", "2025-01").await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.total_amount_cents, 150);
        assert_eq!(second.events_count, 2);
        assert_eq!(engine.list_settlements(&ctx(), Some("u1"), None).await.unwrap().len(), 1);

        // Nothing new approved: nothing to do, and the totals stay.
        let err = engine.close_settlement(&ctx(), "u1", "2025-01").await.unwrap_err();
        assert!(err.is_conflict(ConflictKind::NoApprovedEvents));
        let kept = engine.get_settlement(&ctx(), &first.id).await.unwrap();
        assert_eq!(kept.total_amount_cents, 150);
    }

    #[tokio::test]
    async fn test_pay_settlement_once() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "u1", 100, EventStatus::Approved, "2025-01").await;
        let closed = engine.close_settlement(&ctx(), "u1", "2025-01").await.unwrap();

        let paid = engine.pay_settlement(&ctx(), &closed.id).await.unwrap();
        assert_eq!(paid.status, SettlementStatus::Paid);
        assert!(paid.paid_at.is_some());

        let err = engine.pay_settlement(&ctx(), &closed.id).await.unwrap_err();
        assert!(err.is_conflict(ConflictKind::InvalidTransition));

        insert_event(&db, "e2", "r1", "u1", 50, EventStatus::Approved, "2025-01").await;
        let err = engine.close_settlement(&ctx(), "u1", "2025-01").await.unwrap_err();
        assert!(err.is_conflict(ConflictKind::SettlementAlreadyPaid));
        let untouched = engine.get_event(&ctx(), "e2").await.unwrap();
        assert_eq!(untouched.status, EventStatus::Approved);
    }

    #[tokio::test]
    async fn test_future_and_malformed_periods_are_rejected() {
        let engine = test_engine().await;

        let err = engine.close_settlement(&ctx(), "u1", "2025-02").await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        let err = engine.close_settlement(&ctx(), "u1", "2025-13").await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_pay_unknown_settlement_is_not_found() {
        let engine = test_engine().await;
        let err = engine.pay_settlement(&ctx(), "missing").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
