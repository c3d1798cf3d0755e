//! Fixture builders shared by the engine tests.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::engine::CommissionEngine;
use crate::notify::{Notifier, NotifyError};
use crate::pool::{Database, DbConfig};
use tally_core::{
    AppliesTo, CalculationType, CommissionEvent, CommissionRule, EngineConfig, EngineContext,
    EventStatus, LineKind, Notification, RecurringContract, Role, RuleType, TechnicianAssignment,
    Tier, Trigger, WorkOrder, WorkOrderItem,
};

pub const TENANT: &str = "tenant-1";

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 20).unwrap()
}

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

/// A manager context: acting user `manager`, not privileged.
pub fn ctx() -> EngineContext {
    EngineContext::new(TENANT, today()).with_actor("manager")
}

pub fn ctx_as(actor: &str) -> EngineContext {
    EngineContext::new(TENANT, today()).with_actor(actor)
}

pub async fn test_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub async fn test_engine() -> CommissionEngine {
    CommissionEngine::new(test_db().await, EngineConfig::default())
}

pub async fn test_engine_with(config: EngineConfig) -> CommissionEngine {
    CommissionEngine::new(test_db().await, config)
}

// =============================================================================
// Work orders
// =============================================================================

pub fn work_order(id: &str, total_cents: i64) -> WorkOrder {
    WorkOrder {
        id: id.to_string(),
        tenant_id: TENANT.to_string(),
        number: format!("OS-{}", id),
        total_cents,
        displacement_value_cents: 0,
        is_warranty: false,
        assignee_id: None,
        seller_id: None,
        driver_id: None,
        recurring_contract_id: None,
        quote_source: None,
        received_at: None,
        completed_at: None,
        created_at: at(2025, 1, 10),
    }
}

pub fn item(work_order_id: &str, kind: LineKind, qty: i64, price: i64, cost: i64) -> WorkOrderItem {
    WorkOrderItem {
        id: uuid::Uuid::new_v4().to_string(),
        work_order_id: work_order_id.to_string(),
        kind,
        quantity: qty,
        unit_price_cents: price,
        cost_price_cents: cost,
    }
}

pub async fn insert_order(db: &Database, order: &WorkOrder) {
    db.work_orders().insert(order).await.unwrap();
}

pub async fn assign(db: &Database, work_order_id: &str, user_id: &str, role: Option<Role>, position: i64) {
    let assignment = TechnicianAssignment {
        work_order_id: work_order_id.to_string(),
        user_id: user_id.to_string(),
        role,
    };
    db.work_orders()
        .insert_assignment(&assignment, position)
        .await
        .unwrap();
}

pub async fn insert_contract(db: &Database, id: &str, monthly: Option<i64>, active: bool) {
    let contract = RecurringContract {
        id: id.to_string(),
        tenant_id: TENANT.to_string(),
        name: format!("Contract {}", id),
        is_active: active,
        monthly_value_cents: monthly,
        total_value_cents: None,
    };
    db.contracts().insert(&contract).await.unwrap();
}

// =============================================================================
// Rules
// =============================================================================

/// A percentage rule owned by `owner` for `role`.
pub fn percent_rule(
    id: &str,
    owner: Option<&str>,
    name: &str,
    bps: i64,
    calc: CalculationType,
    role: Option<Role>,
    priority: i64,
) -> CommissionRule {
    CommissionRule {
        id: id.to_string(),
        tenant_id: TENANT.to_string(),
        owner_user_id: owner.map(str::to_string),
        name: name.to_string(),
        rule_type: RuleType::Percentage,
        value_hundredths: bps,
        applies_to: AppliesTo::All,
        calculation_type: calc,
        applies_to_role: role,
        applies_when: Trigger::OsCompleted,
        tiers: Vec::new(),
        formula: None,
        source_filter: None,
        priority,
        active: true,
        created_at: at(2025, 1, 1),
        updated_at: at(2025, 1, 1),
    }
}

pub fn tiered_rule(id: &str, owner: &str, tiers: Vec<Tier>) -> CommissionRule {
    CommissionRule {
        tiers,
        ..percent_rule(
            id,
            Some(owner),
            "Tiered",
            0,
            CalculationType::TieredGross,
            Some(Role::Technician),
            0,
        )
    }
}

pub async fn insert_rule(db: &Database, rule: &CommissionRule) {
    db.rules().insert(rule).await.unwrap();
}

// =============================================================================
// Events
// =============================================================================

/// Inserts an event directly, bypassing generation. The referenced rule is
/// created inactive when missing.
pub async fn insert_event(
    db: &Database,
    id: &str,
    rule_id: &str,
    user_id: &str,
    amount_cents: i64,
    status: EventStatus,
    period: &str,
) -> CommissionEvent {
    let event = CommissionEvent {
        id: id.to_string(),
        tenant_id: TENANT.to_string(),
        rule_id: rule_id.to_string(),
        work_order_id: None,
        recurring_commission_id: None,
        user_id: user_id.to_string(),
        role: Some(Role::Technician),
        trigger_type: Trigger::OsCompleted,
        period: period.to_string(),
        base_amount_cents: amount_cents * 10,
        commission_amount_cents: amount_cents,
        multiplier_bps: 10_000,
        status,
        settlement_id: None,
        notes: None,
        created_by: None,
        created_at: at(2025, 1, 5),
        updated_at: at(2025, 1, 5),
    };
    if db.rules().get(TENANT, rule_id).await.unwrap().is_none() {
        let rule = CommissionRule {
            active: false,
            ..percent_rule(rule_id, None, "Fixture", 1_000, CalculationType::PercentGross, None, 0)
        };
        insert_rule(db, &rule).await;
    }
    let mut conn = db.pool().acquire().await.unwrap();
    db.events().insert(&mut *conn, &event).await.unwrap();
    event
}

// =============================================================================
// Notifiers
// =============================================================================

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingNotifier::default())
    }

    pub fn taken(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Rejects every notification.
#[derive(Debug, Default)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected("dispatcher offline".to_string()))
    }
}

pub fn product(work_order_id: &str, qty: i64, price: i64) -> WorkOrderItem {
    item(work_order_id, LineKind::Product, qty, price, 0)
}
