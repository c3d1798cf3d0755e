//! # Payment Release
//!
//! Approves a work order's pending commissions as the customer pays for it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  release_by_payment(ctx, { work_order_id, receivable_id, payment })     │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    claim receivable ── taken? ──► Conflict(Duplicate)                   │
//! │    balance    = total − Σ earlier payments on the order                 │
//! │    proportion = payment / balance   (bps, capped at 100%)               │
//! │                                                                         │
//! │    for each pending event of the order                                  │
//! │      proportion = 100%  →  pending ──► approved                         │
//! │      otherwise          →  new approved event for amount × proportion   │
//! │                            original keeps the rest, still pending       │
//! │  COMMIT                                                                 │
//! │  notify each user with released commissions                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Payments that together cover the total therefore approve every pending
//! cent, whatever the instalment sizes.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::error::{ConflictKind, EngineError, EngineResult};
use super::{new_id, observe, CommissionEngine};
use tally_core::validation::{validate_id, validate_release};
use tally_core::{
    CommissionEvent, EngineContext, EventStatus, Money, Notification, NotificationKind,
    PaymentRelease, Rate, ReleasePayment,
};

/// What one payment released.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReleaseReport {
    pub work_order_id: String,
    pub receivable_id: String,
    pub proportion_bps: i64,
    /// Whole events on a full payment, the new approved parts otherwise.
    pub released: Vec<CommissionEvent>,
    pub released_cents: i64,
}

impl CommissionEngine {
    /// Releases the commissions a received payment pays for.
    ///
    /// ## Errors
    /// - `Conflict(Duplicate)` if the receivable was already released
    /// - `NotFound` if the work order does not exist for the tenant
    ///
    /// Orders with no positive total release nothing and record nothing.
    pub async fn release_by_payment(
        &self,
        ctx: &EngineContext,
        input: &ReleasePayment,
    ) -> EngineResult<PaymentReleaseReport> {
        let result = self.release_inner(ctx, input).await;
        observe("release_by_payment", ctx, &input.receivable_id, result)
    }

    async fn release_inner(
        &self,
        ctx: &EngineContext,
        input: &ReleasePayment,
    ) -> EngineResult<PaymentReleaseReport> {
        validate_release(input)?;

        let order = self
            .db
            .work_orders()
            .get(&ctx.tenant_id, &input.work_order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("WorkOrder", &input.work_order_id))?;

        let mut report = PaymentReleaseReport {
            work_order_id: order.id.clone(),
            receivable_id: input.receivable_id.clone(),
            proportion_bps: 0,
            released: Vec::new(),
            released_cents: 0,
        };
        if !order.total().is_positive() {
            info!(
                tenant_id = %ctx.tenant_id,
                work_order_id = %order.id,
                "Work order total is zero; payment releases nothing"
            );
            return Ok(report);
        }

        let now = Utc::now();
        let payment = Money::from_cents(input.payment_cents);
        let claim = PaymentRelease {
            tenant_id: ctx.tenant_id.clone(),
            receivable_id: input.receivable_id.clone(),
            work_order_id: order.id.clone(),
            payment_cents: payment.cents(),
            proportion_bps: 0,
            events_count: 0,
            released_by: ctx.actor_id.clone(),
            released_at: now,
        };

        let events = self.db.events();
        let releases = self.db.releases();
        let mut tx = self.db.pool().begin().await?;

        if let Err(e) = releases.claim(&mut *tx, &claim).await {
            if e.is_unique_violation() {
                return Err(EngineError::conflict(
                    ConflictKind::Duplicate,
                    "this payment has already released commissions",
                ));
            }
            return Err(e.into());
        }

        let paid_before = releases
            .paid_before(&mut *tx, &ctx.tenant_id, &order.id, &input.receivable_id)
            .await?;
        let balance = (order.total() - Money::from_cents(paid_before)).clamp_non_negative();
        let proportion = if balance.is_positive() {
            Rate::proportion(payment, balance)
        } else {
            Rate::ONE
        };
        report.proportion_bps = proportion.bps();

        let note = format!("Released {} by payment {}", proportion, input.receivable_id);
        let pending = events
            .pending_for_work_order(&mut *tx, &ctx.tenant_id, &order.id)
            .await?;

        for event in pending {
            if proportion == Rate::ONE {
                let moved = events
                    .transition(
                        &mut *tx,
                        &ctx.tenant_id,
                        &event.id,
                        EventStatus::Pending,
                        EventStatus::Approved,
                        Some(&note),
                        now,
                    )
                    .await?;
                if !moved {
                    return Err(changed_concurrently(&event.id));
                }
                let approved = events
                    .get_with(&mut *tx, &ctx.tenant_id, &event.id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("CommissionEvent", &event.id))?;
                report.released.push(approved);
                continue;
            }

            let part = event.commission_amount().percentage(proportion);
            if !part.is_positive() {
                debug!(event_id = %event.id, "Nothing to release from event");
                continue;
            }
            let rest = event.commission_amount() - part;
            let reduced = events
                .reduce_pending(
                    &mut *tx,
                    &ctx.tenant_id,
                    &event.id,
                    event.commission_amount_cents,
                    rest.cents(),
                    &format!("{} released by payment {}", part, input.receivable_id),
                    now,
                )
                .await?;
            if !reduced {
                return Err(changed_concurrently(&event.id));
            }

            let released = CommissionEvent {
                id: new_id(),
                base_amount_cents: payment.cents(),
                commission_amount_cents: part.cents(),
                status: EventStatus::Approved,
                settlement_id: None,
                notes: Some(note.clone()),
                created_by: ctx.actor_id.clone(),
                created_at: now,
                updated_at: now,
                ..event
            };
            events.insert(&mut *tx, &released).await?;
            report.released.push(released);
        }

        releases
            .record_outcome(
                &mut *tx,
                &ctx.tenant_id,
                &input.receivable_id,
                proportion.bps(),
                report.released.len() as i64,
            )
            .await?;
        tx.commit().await?;

        report.released_cents = report
            .released
            .iter()
            .map(|e| e.commission_amount_cents)
            .sum();

        info!(
            tenant_id = %ctx.tenant_id,
            work_order_id = %order.id,
            receivable_id = %input.receivable_id,
            proportion = %proportion,
            events = report.released.len(),
            released_cents = report.released_cents,
            "Commissions released by payment"
        );

        self.dispatch(released_notifications(ctx, &order.number, &report))
            .await;

        Ok(report)
    }

    pub async fn list_payment_releases(
        &self,
        ctx: &EngineContext,
        work_order_id: &str,
    ) -> EngineResult<Vec<PaymentRelease>> {
        validate_id("work_order_id", work_order_id)?;
        Ok(self
            .db
            .releases()
            .list_for_work_order(&ctx.tenant_id, work_order_id)
            .await?)
    }
}

fn changed_concurrently(event_id: &str) -> EngineError {
    EngineError::conflict(
        ConflictKind::InvalidTransition,
        format!("Commission event {} changed concurrently", event_id),
    )
}

fn released_notifications(
    ctx: &EngineContext,
    order_number: &str,
    report: &PaymentReleaseReport,
) -> Vec<Notification> {
    let mut per_user: BTreeMap<&str, Money> = BTreeMap::new();
    for event in &report.released {
        *per_user.entry(&event.user_id).or_insert(Money::zero()) += event.commission_amount();
    }

    per_user
        .into_iter()
        .map(|(user_id, total)| Notification {
            tenant_id: ctx.tenant_id.clone(),
            user_id: user_id.to_string(),
            kind: NotificationKind::CommissionsReleased,
            title: "Commissions released".to_string(),
            body: format!("{} approved after a payment on work order {}", total, order_number),
            payload: json!({
                "work_order_id": report.work_order_id,
                "receivable_id": report.receivable_id,
                "total_cents": total.cents(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use tally_core::{CalculationType, Role, Trigger};

    /// A 300.00 order whose technician earns a pending 30.00.
    async fn generated_order(engine: &CommissionEngine) {
        let db = engine.db();
        let mut order = work_order("wo-1", 30_000);
        order.assignee_id = Some("tech-1".to_string());
        insert_order(db, &order).await;
        insert_rule(
            db,
            &percent_rule("r1", Some("tech-1"), "Tech 10%", 1_000, CalculationType::PercentGross, Some(Role::Technician), 0),
        )
        .await;
        engine
            .generate_for_work_order(&ctx(), "wo-1", Trigger::OsCompleted)
            .await
            .unwrap();
    }

    fn payment(receivable: &str, cents: i64) -> ReleasePayment {
        ReleasePayment {
            work_order_id: "wo-1".to_string(),
            receivable_id: receivable.to_string(),
            payment_cents: cents,
        }
    }

    fn amounts(events: &[CommissionEvent], status: EventStatus) -> Vec<i64> {
        events
            .iter()
            .filter(|e| e.status == status)
            .map(|e| e.commission_amount_cents)
            .collect()
    }

    #[tokio::test]
    async fn test_partial_payment_splits_off_an_approved_part() {
        let engine = test_engine().await;
        generated_order(&engine).await;

        let report = engine.release_by_payment(&ctx(), &payment("ar-1", 10_000)).await.unwrap();
        assert_eq!(report.proportion_bps, 3_333);
        assert_eq!(report.released_cents, 1_000);
        assert_eq!(report.released[0].base_amount_cents, 10_000);
        assert_eq!(report.released[0].work_order_id.as_deref(), Some("wo-1"));

        let events = engine.db().events().list_for_work_order(TENANT, "wo-1").await.unwrap();
        assert_eq!(amounts(&events, EventStatus::Pending), vec![2_000]);
        assert_eq!(amounts(&events, EventStatus::Approved), vec![1_000]);
    }

    #[tokio::test]
    async fn test_instalments_covering_the_total_release_everything() {
        let engine = test_engine().await;
        generated_order(&engine).await;

        for receivable in ["ar-1", "ar-2", "ar-3"] {
            engine
                .release_by_payment(&ctx(), &payment(receivable, 10_000))
                .await
                .unwrap();
        }

        let events = engine.db().events().list_for_work_order(TENANT, "wo-1").await.unwrap();
        assert!(amounts(&events, EventStatus::Pending).is_empty());
        assert_eq!(amounts(&events, EventStatus::Approved).iter().sum::<i64>(), 3_000);

        let releases = engine.list_payment_releases(&ctx(), "wo-1").await.unwrap();
        let proportions: Vec<i64> = releases.iter().map(|r| r.proportion_bps).collect();
        assert_eq!(proportions, vec![3_333, 5_000, 10_000]);
    }

    #[tokio::test]
    async fn test_full_payment_approves_in_place() {
        let notifier = RecordingNotifier::new();
        let engine = test_engine().await.with_notifier(notifier.clone());
        generated_order(&engine).await;
        let pending = engine.db().events().list_for_work_order(TENANT, "wo-1").await.unwrap();

        let report = engine.release_by_payment(&ctx(), &payment("ar-1", 45_000)).await.unwrap();
        assert_eq!(report.proportion_bps, 10_000);
        assert_eq!(report.released.len(), 1);
        assert_eq!(report.released[0].id, pending[0].id);
        assert_eq!(report.released[0].status, EventStatus::Approved);

        let sent = notifier.taken();
        let released: Vec<_> = sent
            .iter()
            .filter(|n| n.kind == NotificationKind::CommissionsReleased)
            .collect();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].user_id, "tech-1");
        assert_eq!(released[0].payload["total_cents"], 3_000);
    }

    #[tokio::test]
    async fn test_replayed_payment_changes_nothing() {
        let engine = test_engine().await;
        generated_order(&engine).await;

        engine.release_by_payment(&ctx(), &payment("ar-1", 10_000)).await.unwrap();
        let err = engine
            .release_by_payment(&ctx(), &payment("ar-1", 10_000))
            .await
            .unwrap_err();
        assert!(err.is_conflict(ConflictKind::Duplicate));

        let events = engine.db().events().list_for_work_order(TENANT, "wo-1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(amounts(&events, EventStatus::Pending), vec![2_000]);
    }

    #[tokio::test]
    async fn test_zero_total_order_releases_nothing() {
        let engine = test_engine().await;
        insert_order(engine.db(), &work_order("wo-1", 0)).await;

        let report = engine.release_by_payment(&ctx(), &payment("ar-1", 5_000)).await.unwrap();
        assert!(report.released.is_empty());
        assert!(engine.db().releases().get(TENANT, "ar-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_work_order_is_not_found() {
        let engine = test_engine().await;
        let err = engine
            .release_by_payment(&ctx(), &payment("ar-1", 5_000))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
