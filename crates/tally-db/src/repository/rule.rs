//! # Commission Rule Repository
//!
//! ## Evaluation Order
//! ```text
//! applicable_for(tenant, user, role, trigger)
//!
//!   WHERE active
//!     AND (owner_user_id = user  OR owner_user_id IS NULL)     own + tenant-wide
//!     AND (applies_to_role = role OR applies_to_role IS NULL)
//!     AND applies_when = trigger
//!   ORDER BY priority ASC, name ASC, id ASC
//! ```
//! The order is part of the contract: a generation pass evaluates rules in
//! exactly this sequence, whatever order they were inserted in.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{CommissionRule, Role, Trigger};

#[derive(Debug, Clone)]
pub struct RuleRepository {
    pool: SqlitePool,
}

impl RuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RuleRepository { pool }
    }

    pub async fn insert(&self, rule: &CommissionRule) -> DbResult<()> {
        debug!(rule_id = %rule.id, tenant_id = %rule.tenant_id, "Inserting commission rule");

        sqlx::query(
            r#"
            INSERT INTO commission_rules (
                id, tenant_id, owner_user_id, name, rule_type, value_hundredths,
                applies_to, calculation_type, applies_to_role, applies_when,
                tiers, formula, priority, active, created_at, updated_at, source_filter
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.tenant_id)
        .bind(&rule.owner_user_id)
        .bind(&rule.name)
        .bind(rule.rule_type)
        .bind(rule.value_hundredths)
        .bind(rule.applies_to)
        .bind(rule.calculation_type)
        .bind(rule.applies_to_role)
        .bind(rule.applies_when)
        .bind(Json(&rule.tiers))
        .bind(&rule.formula)
        .bind(rule.priority)
        .bind(rule.active)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .bind(&rule.source_filter)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, tenant_id: &str, id: &str) -> DbResult<Option<CommissionRule>> {
        let rule = sqlx::query_as::<_, CommissionRule>(
            "SELECT * FROM commission_rules WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(rule)
    }

    /// Writes every editable column of `rule` back to its row.
    pub async fn update(&self, rule: &CommissionRule) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE commission_rules SET
                name = ?3,
                rule_type = ?4,
                value_hundredths = ?5,
                applies_to = ?6,
                calculation_type = ?7,
                applies_to_role = ?8,
                applies_when = ?9,
                tiers = ?10,
                formula = ?11,
                priority = ?12,
                active = ?13,
                updated_at = ?14,
                source_filter = ?15
            WHERE id = ?1 AND tenant_id = ?2
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.tenant_id)
        .bind(&rule.name)
        .bind(rule.rule_type)
        .bind(rule.value_hundredths)
        .bind(rule.applies_to)
        .bind(rule.calculation_type)
        .bind(rule.applies_to_role)
        .bind(rule.applies_when)
        .bind(Json(&rule.tiers))
        .bind(&rule.formula)
        .bind(rule.priority)
        .bind(rule.active)
        .bind(rule.updated_at)
        .bind(&rule.source_filter)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CommissionRule", &rule.id));
        }
        Ok(())
    }

    pub async fn set_active(
        &self,
        tenant_id: &str,
        id: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE commission_rules SET active = ?3, updated_at = ?4 WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CommissionRule", id));
        }
        Ok(())
    }

    /// Lists a tenant's rules in evaluation order.
    pub async fn list(&self, tenant_id: &str, include_inactive: bool) -> DbResult<Vec<CommissionRule>> {
        let rules = sqlx::query_as::<_, CommissionRule>(
            r#"
            SELECT * FROM commission_rules
            WHERE tenant_id = ?1 AND (?2 OR active = 1)
            ORDER BY priority ASC, name ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await?;

        Ok(rules)
    }

    /// Active rules that fire for `user_id` playing `role` on `trigger`.
    pub async fn applicable_for(
        &self,
        tenant_id: &str,
        user_id: &str,
        role: Role,
        trigger: Trigger,
    ) -> DbResult<Vec<CommissionRule>> {
        let rules = sqlx::query_as::<_, CommissionRule>(
            r#"
            SELECT * FROM commission_rules
            WHERE tenant_id = ?1
              AND active = 1
              AND (owner_user_id = ?2 OR owner_user_id IS NULL)
              AND (applies_to_role = ?3 OR applies_to_role IS NULL)
              AND applies_when = ?4
            ORDER BY priority ASC, name ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(role)
        .bind(trigger)
        .fetch_all(&self.pool)
        .await?;

        debug!(
            tenant_id = %tenant_id,
            user_id = %user_id,
            role = %role,
            count = rules.len(),
            "Loaded applicable rules"
        );
        Ok(rules)
    }

    /// Every active rule a user could earn from, whatever the role or
    /// trigger. Used by simulation.
    pub async fn active_for_user(&self, tenant_id: &str, user_id: &str) -> DbResult<Vec<CommissionRule>> {
        let rules = sqlx::query_as::<_, CommissionRule>(
            r#"
            SELECT * FROM commission_rules
            WHERE tenant_id = ?1
              AND active = 1
              AND (owner_user_id = ?2 OR owner_user_id IS NULL)
            ORDER BY priority ASC, name ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rules)
    }
}
