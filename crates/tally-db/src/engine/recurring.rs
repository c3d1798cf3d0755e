//! # Recurring Generator
//!
//! Monthly sweep over the tenant's active recurring links.
//!
//! ## Per-Row Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for each active link (own transaction, failures isolated)              │
//! │                                                                         │
//! │  last_generated_at in this period? ─────────────────► skip              │
//! │  contract inactive / billing base = 0? ─────────────► skip              │
//! │  no work order of the contract this month? ─────────► skip              │
//! │  rule inactive? ────────────────────────────────────► skip              │
//! │  amount = evaluate(rule, billing base) = 0? ────────► skip              │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    stamp last_generated_at = today ── 0 rows? ──────► skip (raced)      │
//! │    insert one pending event                                             │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The stamp and the event commit together, so a crashed row is simply
//! picked up again by the next run.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::error::{ConflictKind, EngineError, EngineResult, ErrorPayload};
use super::{new_id, observe, require_actor, CommissionEngine};
use tally_core::evaluator::evaluate;
use tally_core::lifecycle::check_recurring_transition;
use tally_core::validation::validate_id;
use tally_core::{
    CalculationContext, CommissionEvent, EngineContext, EventStatus, NewRecurringCommission,
    Rate, RecurringCommission, RecurringStatus,
};

/// Why a link produced nothing this month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurringSkip {
    AlreadyGenerated,
    ContractInactive,
    ZeroContractValue,
    NoWorkOrderThisMonth,
    RuleInactive,
    ZeroAmount,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecurringOutcome {
    Generated { event_id: String, amount_cents: i64 },
    Skipped { reason: RecurringSkip },
    Failed { error: ErrorPayload },
}

#[derive(Debug, Clone, Serialize)]
pub struct RecurringRowResult {
    pub recurring_commission_id: String,
    pub result: RecurringOutcome,
}

/// Counts and per-row outcomes of one monthly run.
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyRunReport {
    pub period: String,
    pub processed: usize,
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_cents: i64,
    pub rows: Vec<RecurringRowResult>,
}

impl CommissionEngine {
    /// Runs the monthly recurring generation for `ctx.today`'s period.
    ///
    /// Never fails as a whole: a row that errors is logged and reported, and
    /// the sweep moves on.
    pub async fn process_monthly(&self, ctx: &EngineContext) -> EngineResult<MonthlyRunReport> {
        let period = ctx.current_period();
        let links = self
            .db
            .recurring()
            .list(&ctx.tenant_id, Some(RecurringStatus::Active))
            .await?;

        info!(
            tenant_id = %ctx.tenant_id,
            period = %period,
            links = links.len(),
            "Monthly recurring run started"
        );

        let mut report = MonthlyRunReport {
            period: period.to_string(),
            processed: links.len(),
            generated: 0,
            skipped: 0,
            failed: 0,
            total_cents: 0,
            rows: Vec::with_capacity(links.len()),
        };

        for link in &links {
            let result = match self.process_link(ctx, link).await {
                Ok(Ok(event)) => {
                    report.generated += 1;
                    report.total_cents += event.commission_amount_cents;
                    RecurringOutcome::Generated {
                        event_id: event.id,
                        amount_cents: event.commission_amount_cents,
                    }
                }
                Ok(Err(reason)) => {
                    report.skipped += 1;
                    RecurringOutcome::Skipped { reason }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        tenant_id = %ctx.tenant_id,
                        recurring_commission_id = %link.id,
                        error = %e,
                        "Recurring row failed"
                    );
                    RecurringOutcome::Failed {
                        error: e.to_payload(),
                    }
                }
            };
            report.rows.push(RecurringRowResult {
                recurring_commission_id: link.id.clone(),
                result,
            });
        }

        info!(
            tenant_id = %ctx.tenant_id,
            period = %report.period,
            generated = report.generated,
            skipped = report.skipped,
            failed = report.failed,
            "Monthly recurring run finished"
        );
        Ok(report)
    }

    /// One link: the created event, or why there is none.
    async fn process_link(
        &self,
        ctx: &EngineContext,
        link: &RecurringCommission,
    ) -> EngineResult<Result<CommissionEvent, RecurringSkip>> {
        let period = ctx.current_period();
        let period_start = period.first_day();

        if link.last_generated_at.is_some_and(|d| d >= period_start) {
            return Ok(Err(RecurringSkip::AlreadyGenerated));
        }

        let contract = self
            .db
            .contracts()
            .get(&ctx.tenant_id, &link.recurring_contract_id)
            .await?
            .ok_or_else(|| EngineError::not_found("RecurringContract", &link.recurring_contract_id))?;
        if !contract.is_active {
            return Ok(Err(RecurringSkip::ContractInactive));
        }
        let base = contract.billing_base();
        if !base.is_positive() {
            return Ok(Err(RecurringSkip::ZeroContractValue));
        }

        let Some(order) = self
            .db
            .work_orders()
            .latest_for_contract_in_period(&ctx.tenant_id, &contract.id, &period.to_string())
            .await?
        else {
            return Ok(Err(RecurringSkip::NoWorkOrderThisMonth));
        };

        let rule = self
            .db
            .rules()
            .get(&ctx.tenant_id, &link.commission_rule_id)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionRule", &link.commission_rule_id))?;
        if !rule.active {
            return Ok(Err(RecurringSkip::RuleInactive));
        }

        let amount = evaluate(&rule, base, &CalculationContext::for_amount(base));
        if !amount.is_positive() {
            return Ok(Err(RecurringSkip::ZeroAmount));
        }

        let now = Utc::now();
        let event = CommissionEvent {
            id: new_id(),
            tenant_id: ctx.tenant_id.clone(),
            rule_id: rule.id.clone(),
            work_order_id: Some(order.id.clone()),
            recurring_commission_id: Some(link.id.clone()),
            user_id: link.user_id.clone(),
            role: rule.applies_to_role,
            trigger_type: rule.applies_when,
            period: period.to_string(),
            base_amount_cents: base.cents(),
            commission_amount_cents: amount.cents(),
            multiplier_bps: Rate::ONE.bps(),
            status: EventStatus::Pending,
            settlement_id: None,
            notes: Some(format!("Recurring commission for contract {}", contract.name)),
            created_by: ctx.actor_id.clone(),
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.db.pool().begin().await?;
        let stamped = self
            .db
            .recurring()
            .stamp_generated(&mut *tx, &link.id, ctx.today, period_start, now)
            .await?;
        if !stamped {
            return Ok(Err(RecurringSkip::AlreadyGenerated));
        }
        self.db.events().insert(&mut *tx, &event).await?;
        tx.commit().await?;

        info!(
            tenant_id = %ctx.tenant_id,
            recurring_commission_id = %link.id,
            event_id = %event.id,
            amount_cents = event.commission_amount_cents,
            "Recurring commission generated"
        );
        Ok(Ok(event))
    }

    // =========================================================================
    // Links
    // =========================================================================

    pub async fn create_recurring_link(
        &self,
        ctx: &EngineContext,
        input: &NewRecurringCommission,
    ) -> EngineResult<RecurringCommission> {
        validate_id("user_id", &input.user_id)?;
        validate_id("recurring_contract_id", &input.recurring_contract_id)?;
        validate_id("commission_rule_id", &input.commission_rule_id)?;
        require_actor(ctx)?;

        if self
            .db
            .contracts()
            .get(&ctx.tenant_id, &input.recurring_contract_id)
            .await?
            .is_none()
        {
            return Err(EngineError::not_found(
                "RecurringContract",
                &input.recurring_contract_id,
            ));
        }
        if self
            .db
            .rules()
            .get(&ctx.tenant_id, &input.commission_rule_id)
            .await?
            .is_none()
        {
            return Err(EngineError::not_found("CommissionRule", &input.commission_rule_id));
        }

        let now = Utc::now();
        let link = RecurringCommission {
            id: new_id(),
            tenant_id: ctx.tenant_id.clone(),
            user_id: input.user_id.clone(),
            recurring_contract_id: input.recurring_contract_id.clone(),
            commission_rule_id: input.commission_rule_id.clone(),
            status: RecurringStatus::Active,
            last_generated_at: None,
            created_at: now,
            updated_at: now,
        };
        self.db.recurring().insert(&link).await?;

        info!(tenant_id = %ctx.tenant_id, recurring_commission_id = %link.id, "Recurring link created");
        Ok(link)
    }

    pub async fn pause_recurring_link(&self, ctx: &EngineContext, id: &str) -> EngineResult<RecurringCommission> {
        self.change_recurring_status(ctx, id, RecurringStatus::Paused).await
    }

    pub async fn resume_recurring_link(&self, ctx: &EngineContext, id: &str) -> EngineResult<RecurringCommission> {
        self.change_recurring_status(ctx, id, RecurringStatus::Active).await
    }

    pub async fn terminate_recurring_link(&self, ctx: &EngineContext, id: &str) -> EngineResult<RecurringCommission> {
        self.change_recurring_status(ctx, id, RecurringStatus::Terminated).await
    }

    async fn change_recurring_status(
        &self,
        ctx: &EngineContext,
        id: &str,
        to: RecurringStatus,
    ) -> EngineResult<RecurringCommission> {
        validate_id("recurring_commission_id", id)?;
        require_actor(ctx)?;
        let repo = self.db.recurring();

        let link = self.get_recurring_link(ctx, id).await?;
        check_recurring_transition(link.status, to)?;
        if !repo
            .set_status(&ctx.tenant_id, id, link.status, to, Utc::now())
            .await?
        {
            return Err(EngineError::conflict(
                ConflictKind::InvalidTransition,
                "Recurring commission changed status concurrently",
            ));
        }

        let updated = self.get_recurring_link(ctx, id).await?;
        info!(
            tenant_id = %ctx.tenant_id,
            recurring_commission_id = %id,
            status = %updated.status,
            "Recurring link status changed"
        );
        Ok(updated)
    }

    pub async fn get_recurring_link(&self, ctx: &EngineContext, id: &str) -> EngineResult<RecurringCommission> {
        let result = self
            .db
            .recurring()
            .get(&ctx.tenant_id, id)
            .await
            .map_err(EngineError::from)
            .and_then(|found| found.ok_or_else(|| EngineError::not_found("RecurringCommission", id)));
        observe("get_recurring_link", ctx, id, result)
    }

    pub async fn list_recurring_links(
        &self,
        ctx: &EngineContext,
        status: Option<RecurringStatus>,
    ) -> EngineResult<Vec<RecurringCommission>> {
        Ok(self.db.recurring().list(&ctx.tenant_id, status).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Database;
    use crate::test_support::*;
    use tally_core::{CalculationType, Role, Trigger};

    async fn contract_order(db: &Database, contract_id: &str, order_id: &str, created: chrono::DateTime<Utc>) {
        let mut order = work_order(order_id, 50_000);
        order.recurring_contract_id = Some(contract_id.to_string());
        order.created_at = created;
        insert_order(db, &order).await;
    }

    async fn link(engine: &CommissionEngine, user: &str, contract: &str, rule: &str) -> RecurringCommission {
        engine
            .create_recurring_link(
                &ctx(),
                &NewRecurringCommission {
                    user_id: user.to_string(),
                    recurring_contract_id: contract.to_string(),
                    commission_rule_id: rule.to_string(),
                },
            )
            .await
            .unwrap()
    }

    async fn standard_setup(engine: &CommissionEngine) -> RecurringCommission {
        let db = engine.db();
        insert_contract(db, "c1", Some(50_000), true).await;
        contract_order(db, "c1", "wo-c1", at(2025, 1, 10)).await;
        insert_rule(
            db,
            &percent_rule("r1", Some("tech-1"), "Recurring 10%", 1_000, CalculationType::PercentGross, Some(Role::Technician), 0),
        )
        .await;
        link(engine, "tech-1", "c1", "r1").await
    }

    #[tokio::test]
    async fn test_monthly_run_is_idempotent() {
        let engine = test_engine().await;
        let link = standard_setup(&engine).await;

        let first = engine.process_monthly(&ctx()).await.unwrap();
        assert_eq!(first.period, "2025-01");
        assert_eq!((first.generated, first.skipped, first.failed), (1, 0, 0));
        assert_eq!(first.total_cents, 5_000);

        let second = engine.process_monthly(&ctx()).await.unwrap();
        assert_eq!((second.generated, second.skipped), (0, 1));
        assert!(matches!(
            second.rows[0].result,
            RecurringOutcome::Skipped { reason: RecurringSkip::AlreadyGenerated }
        ));

        let events = engine
            .list_events(&ctx(), &Default::default())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].recurring_commission_id.as_deref(), Some(link.id.as_str()));
        assert_eq!(events[0].work_order_id.as_deref(), Some("wo-c1"));
        assert_eq!(events[0].base_amount_cents, 50_000);
        assert_eq!(events[0].status, EventStatus::Pending);

        let stamped = engine.get_recurring_link(&ctx(), &link.id).await.unwrap();
        assert_eq!(stamped.last_generated_at, Some(today()));
    }

    #[tokio::test]
    async fn test_next_month_generates_again() {
        let engine = test_engine().await;
        standard_setup(&engine).await;
        contract_order(engine.db(), "c1", "wo-c1-feb", at(2025, 2, 3)).await;

        engine.process_monthly(&ctx()).await.unwrap();
        let february = EngineContext::new(TENANT, chrono::NaiveDate::from_ymd_opt(2025, 2, 20).unwrap());
        let report = engine.process_monthly(&february).await.unwrap();

        assert_eq!(report.generated, 1);
        assert_eq!(engine.list_events(&ctx(), &Default::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_skips_without_work_order_this_month() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_contract(&db, "c1", Some(50_000), true).await;
        contract_order(&db, "c1", "wo-old", at(2024, 12, 15)).await;
        insert_rule(&db, &percent_rule("r1", Some("tech-1"), "R", 1_000, CalculationType::PercentGross, None, 0)).await;
        let link = link(&engine, "tech-1", "c1", "r1").await;

        let report = engine.process_monthly(&ctx()).await.unwrap();
        assert!(matches!(
            report.rows[0].result,
            RecurringOutcome::Skipped { reason: RecurringSkip::NoWorkOrderThisMonth }
        ));

        // Nothing was stamped; a later run this month can still generate.
        let unchanged = engine.get_recurring_link(&ctx(), &link.id).await.unwrap();
        assert!(unchanged.last_generated_at.is_none());
    }

    #[tokio::test]
    async fn test_inactive_contract_and_zero_value_skip() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_contract(&db, "c-off", Some(50_000), false).await;
        insert_contract(&db, "c-zero", None, true).await;
        insert_rule(&db, &percent_rule("r1", Some("tech-1"), "R", 1_000, CalculationType::PercentGross, None, 0)).await;
        link(&engine, "tech-1", "c-off", "r1").await;
        link(&engine, "tech-1", "c-zero", "r1").await;

        let report = engine.process_monthly(&ctx()).await.unwrap();
        let reasons: Vec<_> = report
            .rows
            .iter()
            .map(|r| match r.result {
                RecurringOutcome::Skipped { reason } => Some(reason),
                _ => None,
            })
            .collect();
        assert!(reasons.contains(&Some(RecurringSkip::ContractInactive)));
        assert!(reasons.contains(&Some(RecurringSkip::ZeroContractValue)));
    }

    #[tokio::test]
    async fn test_failing_row_does_not_stop_the_run() {
        let engine = test_engine().await;
        let good = standard_setup(&engine).await;
        let db = engine.db().clone();
        insert_rule(&db, &percent_rule("r-gone", Some("tech-2"), "Gone", 1_000, CalculationType::PercentGross, None, 0)).await;
        let broken = link(&engine, "tech-2", "c1", "r-gone").await;

        // Make the second link point at a rule that no longer exists.
        sqlx::query("PRAGMA foreign_keys = OFF").execute(db.pool()).await.unwrap();
        sqlx::query("DELETE FROM commission_rules WHERE id = 'r-gone'")
            .execute(db.pool())
            .await
            .unwrap();

        let report = engine.process_monthly(&ctx()).await.unwrap();
        assert_eq!((report.generated, report.failed), (1, 1));

        let by_id = |id: &str| {
            report
                .rows
                .iter()
                .find(|r| r.recurring_commission_id == id)
                .map(|r| r.result.clone())
        };
        assert!(matches!(by_id(&good.id), Some(RecurringOutcome::Generated { .. })));
        match by_id(&broken.id) {
            Some(RecurringOutcome::Failed { error }) => assert_eq!(error.status, 404),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_paused_links_are_not_processed() {
        let engine = test_engine().await;
        let link = standard_setup(&engine).await;

        let paused = engine.pause_recurring_link(&ctx(), &link.id).await.unwrap();
        assert_eq!(paused.status, RecurringStatus::Paused);
        let report = engine.process_monthly(&ctx()).await.unwrap();
        assert_eq!(report.processed, 0);

        engine.resume_recurring_link(&ctx(), &link.id).await.unwrap();
        engine.terminate_recurring_link(&ctx(), &link.id).await.unwrap();
        let err = engine.resume_recurring_link(&ctx(), &link.id).await.unwrap_err();
        assert!(err.is_conflict(ConflictKind::InvalidTransition));
    }

    #[tokio::test]
    async fn test_duplicate_link_conflicts() {
        let engine = test_engine().await;
        standard_setup(&engine).await;

        let err = engine
            .create_recurring_link(
                &ctx(),
                &NewRecurringCommission {
                    user_id: "tech-1".to_string(),
                    recurring_contract_id: "c1".to_string(),
                    commission_rule_id: "r1".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict(ConflictKind::Duplicate));
    }

    #[tokio::test]
    async fn test_recurring_event_blocks_work_order_generation() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_contract(&db, "c1", Some(50_000), true).await;
        let mut order = work_order("wo-c1", 50_000);
        order.recurring_contract_id = Some("c1".to_string());
        order.assignee_id = Some("tech-1".to_string());
        insert_order(&db, &order).await;
        insert_rule(
            &db,
            &percent_rule("r1", Some("tech-1"), "Tech 10%", 1_000, CalculationType::PercentGross, Some(Role::Technician), 0),
        )
        .await;
        link(&engine, "tech-1", "c1", "r1").await;

        let report = engine.process_monthly(&ctx()).await.unwrap();
        assert_eq!(report.generated, 1);

        let preview = engine
            .simulate(&ctx(), "wo-c1", Trigger::OsCompleted)
            .await
            .unwrap();
        assert!(preview.already_generated);

        let err = engine
            .generate_for_work_order(&ctx(), "wo-c1", Trigger::OsCompleted)
            .await
            .unwrap_err();
        assert!(err.is_conflict(ConflictKind::AlreadyGenerated));

        let events = db.events().list_for_work_order(TENANT, "wo-c1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].recurring_commission_id.is_some());
        assert!(db.events().generation_marker(TENANT, "wo-c1").await.unwrap().is_none());
    }
}
