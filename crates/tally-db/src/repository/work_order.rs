//! # Work Order Repository
//!
//! Reads the collaborator tables the engine consumes: work orders, their
//! lines, technician assignments and expenses.
//!
//! The engine only reads through this repository. The insert methods exist
//! for the seed binary and for tests, which stand in for the parts of the
//! product that own these tables.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::DbResult;
use tally_core::{TechnicianAssignment, WorkOrder, WorkOrderItem};

#[derive(Debug, Clone)]
pub struct WorkOrderRepository {
    pool: SqlitePool,
}

impl WorkOrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        WorkOrderRepository { pool }
    }

    pub async fn get(&self, tenant_id: &str, id: &str) -> DbResult<Option<WorkOrder>> {
        let order = sqlx::query_as::<_, WorkOrder>(
            "SELECT * FROM work_orders WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    pub async fn items(&self, work_order_id: &str) -> DbResult<Vec<WorkOrderItem>> {
        let items = sqlx::query_as::<_, WorkOrderItem>(
            "SELECT * FROM work_order_items WHERE work_order_id = ?1 ORDER BY rowid ASC",
        )
        .bind(work_order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    pub async fn assignments(&self, work_order_id: &str) -> DbResult<Vec<TechnicianAssignment>> {
        let assignments = sqlx::query_as::<_, TechnicianAssignment>(
            r#"
            SELECT work_order_id, user_id, role FROM work_order_technicians
            WHERE work_order_id = ?1
            ORDER BY position ASC, user_id ASC
            "#,
        )
        .bind(work_order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(assignments)
    }

    /// Σ approved expenses of the work order that affect its net value.
    pub async fn approved_expenses(&self, tenant_id: &str, work_order_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0) FROM expenses
            WHERE tenant_id = ?1 AND work_order_id = ?2
              AND status = 'approved' AND affects_net_value = 1
            "#,
        )
        .bind(tenant_id)
        .bind(work_order_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// The most recent work order of a contract created in `period` (`YYYY-MM`).
    pub async fn latest_for_contract_in_period(
        &self,
        tenant_id: &str,
        recurring_contract_id: &str,
        period: &str,
    ) -> DbResult<Option<WorkOrder>> {
        let order = sqlx::query_as::<_, WorkOrder>(
            r#"
            SELECT * FROM work_orders
            WHERE tenant_id = ?1
              AND recurring_contract_id = ?2
              AND substr(created_at, 1, 7) = ?3
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(recurring_contract_id)
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    // =========================================================================
    // Writes (seed / tests)
    // =========================================================================

    pub async fn insert(&self, order: &WorkOrder) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO work_orders (
                id, tenant_id, number, total_cents, displacement_value_cents, is_warranty,
                assignee_id, seller_id, driver_id, recurring_contract_id, quote_source,
                received_at, completed_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&order.id)
        .bind(&order.tenant_id)
        .bind(&order.number)
        .bind(order.total_cents)
        .bind(order.displacement_value_cents)
        .bind(order.is_warranty)
        .bind(&order.assignee_id)
        .bind(&order.seller_id)
        .bind(&order.driver_id)
        .bind(&order.recurring_contract_id)
        .bind(&order.quote_source)
        .bind(order.received_at)
        .bind(order.completed_at)
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_item(&self, item: &WorkOrderItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO work_order_items (
                id, work_order_id, kind, quantity, unit_price_cents, cost_price_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&item.id)
        .bind(&item.work_order_id)
        .bind(item.kind)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.cost_price_cents)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_assignment(
        &self,
        assignment: &TechnicianAssignment,
        position: i64,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO work_order_technicians (work_order_id, user_id, role, position)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&assignment.work_order_id)
        .bind(&assignment.user_id)
        .bind(assignment.role)
        .bind(position)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records an expense against a work order; returns its id.
    pub async fn insert_expense(
        &self,
        tenant_id: &str,
        work_order_id: &str,
        amount_cents: i64,
        status: &str,
        affects_net_value: bool,
    ) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO expenses (id, tenant_id, work_order_id, amount_cents, status, affects_net_value)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(work_order_id)
        .bind(amount_cents)
        .bind(status)
        .bind(affects_net_value)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }
}
