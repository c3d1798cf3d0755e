//! # Event Generator
//!
//! Turns a finished work order into pending commission events.
//!
//! ## Generation Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  generate_for_work_order(ctx, work_order_id, trigger)                   │
//! │                                                                         │
//! │  1. load work order, lines, technicians, approved expenses              │
//! │  2. skip warranty / zero-total orders                                   │
//! │  3. context = CalculationContext::from_work_order(..)   (built once)    │
//! │  4. beneficiaries = resolve_beneficiaries(..)  distinct (user, role)    │
//! │  5. for each beneficiary                                                │
//! │       for each rule in (priority, name) order                           │
//! │         amount = evaluate(rule, gross, context)                         │
//! │                  × campaign multiplier                                  │
//! │                  ÷ technician split                                     │
//! │         keep if amount > 0                                              │
//! │  6. BEGIN                                                               │
//! │       claim marker ── taken? ──► Conflict(AlreadyGenerated)             │
//! │       any event on the order? ──► Conflict(AlreadyGenerated)            │
//! │       insert every planned event                                        │
//! │     COMMIT                       (all or nothing)                       │
//! │  7. notify each beneficiary                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A pass that would write nothing does not claim the marker, so the work
//! order can still be generated once rules exist for it.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use super::error::{EngineError, EngineResult, ErrorPayload};
use super::{new_id, observe, CommissionEngine};
use tally_core::beneficiary::{resolve_beneficiaries, Beneficiary};
use tally_core::campaign::multiplier_for;
use tally_core::evaluator::evaluate;
use tally_core::validation::validate_id;
use tally_core::{
    CalculationContext, CalculationType, CommissionCampaign, CommissionEvent, CommissionRule,
    EngineContext, EventStatus, Money, Notification, NotificationKind, Role, Trigger, WorkOrder,
};

/// One commission a generation pass would write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedCommission {
    pub user_id: String,
    pub role: Role,
    pub rule_id: String,
    pub rule_name: String,
    pub calculation_type: CalculationType,
    pub applies_when: Trigger,
    pub base_amount_cents: i64,
    pub amount_cents: i64,
    pub multiplier_bps: i64,
    pub campaigns: Vec<String>,
    pub split_divisor: u32,
}

/// One row of a simulation.
#[derive(Debug, Clone, Serialize)]
pub struct SimulatedCommission {
    #[serde(flatten)]
    pub commission: PlannedCommission,
    pub role_matches: bool,
    pub trigger_matches: bool,
    /// False when a seller rule is restricted to another lead source.
    pub source_matches: bool,
    /// Whether a real generation pass would persist this row.
    pub would_generate: bool,
}

/// Read-only preview of a generation pass.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub work_order_id: String,
    pub trigger: Trigger,
    pub already_generated: bool,
    /// Why a real pass would write nothing at all, if it would not.
    pub skipped_reason: Option<String>,
    pub context: CalculationContext,
    pub rows: Vec<SimulatedCommission>,
    /// Σ amount over rows that would be generated.
    pub total_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    Generated { events_count: usize, total_cents: i64 },
    Conflict { message: String },
    Failed { error: ErrorPayload },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub work_order_id: String,
    pub result: BatchOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchGenerationReport {
    pub items: Vec<BatchItem>,
    pub generated: usize,
    pub conflicts: usize,
    pub failed: usize,
}

/// Everything a pass needs to know about one work order.
struct WorkOrderSnapshot {
    order: WorkOrder,
    context: CalculationContext,
    beneficiaries: Vec<Beneficiary>,
}

impl CommissionEngine {
    /// Generates the pending events of a work order, once.
    ///
    /// ## Errors
    /// - `Conflict(AlreadyGenerated)` if a pass already ran for the order
    /// - `NotFound` if the work order does not exist for the tenant
    ///
    /// Returns the created events; empty when nothing was owed.
    pub async fn generate_for_work_order(
        &self,
        ctx: &EngineContext,
        work_order_id: &str,
        trigger: Trigger,
    ) -> EngineResult<Vec<CommissionEvent>> {
        let result = self.generate_inner(ctx, work_order_id, trigger).await;
        observe("generate_for_work_order", ctx, work_order_id, result)
    }

    async fn generate_inner(
        &self,
        ctx: &EngineContext,
        work_order_id: &str,
        trigger: Trigger,
    ) -> EngineResult<Vec<CommissionEvent>> {
        validate_id("work_order_id", work_order_id)?;

        let events_repo = self.db.events();
        if self.has_generated(ctx, work_order_id).await? {
            return Err(EngineError::already_generated());
        }

        let snapshot = self.load_snapshot(ctx, work_order_id).await?;
        if let Some(reason) = self.skip_reason(&snapshot.order) {
            info!(
                tenant_id = %ctx.tenant_id,
                work_order_id = %work_order_id,
                reason,
                "Work order generates no commissions"
            );
            return Ok(Vec::new());
        }

        let campaigns = self
            .db
            .campaigns()
            .running_on(&ctx.tenant_id, ctx.today)
            .await?;

        let mut plan = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        for beneficiary in &snapshot.beneficiaries {
            let rules = self
                .db
                .rules()
                .applicable_for(&ctx.tenant_id, &beneficiary.user_id, beneficiary.role, trigger)
                .await?;

            for rule in &rules {
                if !rule.matches_source(beneficiary.role, snapshot.order.quote_source.as_deref()) {
                    debug!(rule_id = %rule.id, "Rule restricted to another lead source");
                    continue;
                }
                // A tenant-wide rule may match a user under two roles; it pays once.
                if !seen.insert((beneficiary.user_id.clone(), rule.id.clone())) {
                    continue;
                }
                let planned = self.price(rule, beneficiary, &snapshot.context, &campaigns, ctx.today);
                if planned.amount_cents > 0 {
                    plan.push(planned);
                } else {
                    debug!(
                        rule_id = %rule.id,
                        user_id = %beneficiary.user_id,
                        "Rule yields nothing"
                    );
                }
            }
        }

        if plan.is_empty() {
            info!(
                tenant_id = %ctx.tenant_id,
                work_order_id = %work_order_id,
                "No commission owed for work order"
            );
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let period = snapshot.order.period().to_string();
        let events: Vec<CommissionEvent> = plan
            .into_iter()
            .map(|p| CommissionEvent {
                id: new_id(),
                tenant_id: ctx.tenant_id.clone(),
                rule_id: p.rule_id,
                work_order_id: Some(work_order_id.to_string()),
                recurring_commission_id: None,
                user_id: p.user_id,
                role: Some(p.role),
                trigger_type: trigger,
                period: period.clone(),
                base_amount_cents: p.base_amount_cents,
                commission_amount_cents: p.amount_cents,
                multiplier_bps: p.multiplier_bps,
                status: EventStatus::Pending,
                settlement_id: None,
                notes: campaign_note(&p.campaigns),
                created_by: ctx.actor_id.clone(),
                created_at: now,
                updated_at: now,
            })
            .collect();

        let mut tx = self.db.pool().begin().await?;

        if let Err(e) = events_repo
            .claim_generation(
                &mut *tx,
                &ctx.tenant_id,
                work_order_id,
                trigger,
                ctx.actor_id.as_deref(),
                now,
            )
            .await
        {
            if e.is_unique_violation() {
                warn!(
                    tenant_id = %ctx.tenant_id,
                    work_order_id = %work_order_id,
                    "Concurrent generation lost the marker race"
                );
                return Err(EngineError::already_generated());
            }
            return Err(e.into());
        }
        // The marker insert holds the write lock, so this sees every
        // committed recurring event.
        if events_repo
            .exists_for_work_order(&mut *tx, &ctx.tenant_id, work_order_id)
            .await?
        {
            return Err(EngineError::already_generated());
        }

        for event in &events {
            events_repo.insert(&mut *tx, event).await?;
        }
        events_repo
            .record_generation_count(&mut *tx, &ctx.tenant_id, work_order_id, events.len() as i64)
            .await?;

        tx.commit().await?;

        info!(
            tenant_id = %ctx.tenant_id,
            work_order_id = %work_order_id,
            events = events.len(),
            "Commissions generated"
        );

        self.dispatch(generated_notifications(ctx, &snapshot.order, &events))
            .await;

        Ok(events)
    }

    /// Previews a generation pass without writing anything.
    ///
    /// Unlike generation, every active rule of each beneficiary is evaluated
    /// whatever its role or trigger, and each row says whether a real pass
    /// would keep it.
    pub async fn simulate(
        &self,
        ctx: &EngineContext,
        work_order_id: &str,
        trigger: Trigger,
    ) -> EngineResult<SimulationReport> {
        validate_id("work_order_id", work_order_id)?;

        let already_generated = self.has_generated(ctx, work_order_id).await?;
        let snapshot = self.load_snapshot(ctx, work_order_id).await?;
        let skipped_reason = self.skip_reason(&snapshot.order).map(str::to_string);
        let campaigns = self
            .db
            .campaigns()
            .running_on(&ctx.tenant_id, ctx.today)
            .await?;

        let mut rows = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        for beneficiary in &snapshot.beneficiaries {
            let rules = self
                .db
                .rules()
                .active_for_user(&ctx.tenant_id, &beneficiary.user_id)
                .await?;

            for rule in &rules {
                let commission = self.price(rule, beneficiary, &snapshot.context, &campaigns, ctx.today);
                let role_matches = rule.matches_role(beneficiary.role);
                let trigger_matches = rule.applies_when == trigger;
                let source_matches =
                    rule.matches_source(beneficiary.role, snapshot.order.quote_source.as_deref());
                let would_generate = skipped_reason.is_none()
                    && role_matches
                    && trigger_matches
                    && source_matches
                    && commission.amount_cents > 0
                    && seen.insert((beneficiary.user_id.clone(), rule.id.clone()));
                rows.push(SimulatedCommission {
                    commission,
                    role_matches,
                    trigger_matches,
                    source_matches,
                    would_generate,
                });
            }
        }

        let total_cents = rows
            .iter()
            .filter(|r| r.would_generate)
            .map(|r| r.commission.amount_cents)
            .sum();

        Ok(SimulationReport {
            work_order_id: work_order_id.to_string(),
            trigger,
            already_generated,
            skipped_reason,
            context: snapshot.context,
            rows,
            total_cents,
        })
    }

    /// Generates several work orders, each in its own transaction.
    pub async fn generate_batch(
        &self,
        ctx: &EngineContext,
        work_order_ids: &[String],
        trigger: Trigger,
    ) -> BatchGenerationReport {
        let mut report = BatchGenerationReport::default();

        for work_order_id in work_order_ids {
            let result = match self.generate_for_work_order(ctx, work_order_id, trigger).await {
                Ok(events) => {
                    report.generated += 1;
                    BatchOutcome::Generated {
                        events_count: events.len(),
                        total_cents: events.iter().map(|e| e.commission_amount_cents).sum(),
                    }
                }
                Err(e @ EngineError::Conflict { .. }) => {
                    report.conflicts += 1;
                    BatchOutcome::Conflict {
                        message: e.to_string(),
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    BatchOutcome::Failed {
                        error: e.to_payload(),
                    }
                }
            };
            report.items.push(BatchItem {
                work_order_id: work_order_id.clone(),
                result,
            });
        }

        info!(
            tenant_id = %ctx.tenant_id,
            generated = report.generated,
            conflicts = report.conflicts,
            failed = report.failed,
            "Batch generation finished"
        );
        report
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// A marker was claimed, or some other path (a recurring link) already
    /// wrote events for the order.
    async fn has_generated(&self, ctx: &EngineContext, work_order_id: &str) -> EngineResult<bool> {
        let events = self.db.events();
        if events
            .generation_marker(&ctx.tenant_id, work_order_id)
            .await?
            .is_some()
        {
            return Ok(true);
        }
        let mut conn = self.db.pool().acquire().await?;
        Ok(events
            .exists_for_work_order(&mut *conn, &ctx.tenant_id, work_order_id)
            .await?)
    }

    async fn load_snapshot(
        &self,
        ctx: &EngineContext,
        work_order_id: &str,
    ) -> EngineResult<WorkOrderSnapshot> {
        let orders = self.db.work_orders();
        let order = orders
            .get(&ctx.tenant_id, work_order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("WorkOrder", work_order_id))?;
        let items = orders.items(work_order_id).await?;
        let assignments = orders.assignments(work_order_id).await?;
        let expenses = orders
            .approved_expenses(&ctx.tenant_id, work_order_id)
            .await?;

        let context =
            CalculationContext::from_work_order(&order, &items, Money::from_cents(expenses));
        let beneficiaries = resolve_beneficiaries(&order, &assignments, &self.config);

        Ok(WorkOrderSnapshot {
            order,
            context,
            beneficiaries,
        })
    }

    fn skip_reason(&self, order: &WorkOrder) -> Option<&'static str> {
        if order.total_cents <= 0 {
            Some("work order total is zero")
        } else if order.is_warranty && self.config.skip_warranty_orders {
            Some("warranty work order")
        } else {
            None
        }
    }

    /// Amount one rule pays one beneficiary, campaign and split included.
    fn price(
        &self,
        rule: &CommissionRule,
        beneficiary: &Beneficiary,
        context: &CalculationContext,
        campaigns: &[CommissionCampaign],
        today: NaiveDate,
    ) -> PlannedCommission {
        let base = context.gross;
        let raw = evaluate(rule, base, context);
        let applied = multiplier_for(
            campaigns,
            Some(beneficiary.role),
            rule.calculation_type,
            today,
            self.config.campaign_composition,
        );
        let amount = raw
            .percentage(applied.rate)
            .share(beneficiary.split_divisor)
            .clamp_non_negative();

        PlannedCommission {
            user_id: beneficiary.user_id.clone(),
            role: beneficiary.role,
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            calculation_type: rule.calculation_type,
            applies_when: rule.applies_when,
            base_amount_cents: base.cents(),
            amount_cents: amount.cents(),
            multiplier_bps: applied.rate.bps(),
            campaigns: applied.campaign_names,
            split_divisor: beneficiary.split_divisor,
        }
    }
}

fn campaign_note(campaigns: &[String]) -> Option<String> {
    if campaigns.is_empty() {
        None
    } else {
        Some(format!("Campaign: {}", campaigns.join(", ")))
    }
}

/// One notification per beneficiary, summing their new events.
fn generated_notifications(
    ctx: &EngineContext,
    order: &WorkOrder,
    events: &[CommissionEvent],
) -> Vec<Notification> {
    let mut per_user: BTreeMap<&str, (usize, Money)> = BTreeMap::new();
    for event in events {
        let entry = per_user.entry(&event.user_id).or_insert((0, Money::zero()));
        entry.0 += 1;
        entry.1 += event.commission_amount();
    }

    per_user
        .into_iter()
        .map(|(user_id, (count, total))| Notification {
            tenant_id: ctx.tenant_id.clone(),
            user_id: user_id.to_string(),
            kind: NotificationKind::CommissionsGenerated,
            title: "New commissions".to_string(),
            body: format!(
                "{} commission(s) totalling {} from work order {}",
                count, total, order.number
            ),
            payload: json!({
                "work_order_id": order.id,
                "events_count": count,
                "total_cents": total.cents(),
            }),
        })
        .collect()
}
