//! # Goal Repository

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::error::DbResult;
use tally_core::CommissionGoal;

#[derive(Debug, Clone)]
pub struct GoalRepository {
    pool: SqlitePool,
}

impl GoalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        GoalRepository { pool }
    }

    pub async fn insert(&self, goal: &CommissionGoal) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO commission_goals (
                id, tenant_id, user_id, period, target_amount_cents, bonus_rules,
                achieved_amount_cents, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&goal.id)
        .bind(&goal.tenant_id)
        .bind(&goal.user_id)
        .bind(&goal.period)
        .bind(goal.target_amount_cents)
        .bind(Json(&goal.bonus_rules))
        .bind(goal.achieved_amount_cents)
        .bind(goal.status)
        .bind(goal.created_at)
        .bind(goal.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, tenant_id: &str, id: &str) -> DbResult<Option<CommissionGoal>> {
        let goal = sqlx::query_as::<_, CommissionGoal>(
            "SELECT * FROM commission_goals WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(goal)
    }

    pub async fn list(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        period: Option<&str>,
    ) -> DbResult<Vec<CommissionGoal>> {
        let goals = sqlx::query_as::<_, CommissionGoal>(
            r#"
            SELECT * FROM commission_goals
            WHERE tenant_id = ?1
              AND (?2 IS NULL OR user_id = ?2)
              AND (?3 IS NULL OR period = ?3)
            ORDER BY period DESC, user_id ASC
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(period)
        .fetch_all(&self.pool)
        .await?;

        Ok(goals)
    }

    /// Overwrites the achievement cache of an active goal.
    pub async fn set_achieved(
        &self,
        tenant_id: &str,
        id: &str,
        achieved_amount_cents: i64,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commission_goals SET achieved_amount_cents = ?3, updated_at = ?4
            WHERE id = ?1 AND tenant_id = ?2 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(achieved_amount_cents)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `active → closed`, freezing the achievement cache at `achieved_amount_cents`.
    pub async fn close(
        &self,
        tenant_id: &str,
        id: &str,
        achieved_amount_cents: i64,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commission_goals SET
                status = 'closed',
                achieved_amount_cents = ?3,
                updated_at = ?4
            WHERE id = ?1 AND tenant_id = ?2 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(achieved_amount_cents)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
