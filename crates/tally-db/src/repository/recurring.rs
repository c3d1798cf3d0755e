//! # Recurring Commission Repository
//!
//! ## Monthly Idempotency
//! ```text
//! UPDATE recurring_commissions SET last_generated_at = today
//! WHERE id = ? AND status = 'active'
//!   AND (last_generated_at IS NULL OR last_generated_at < first day of period)
//! ```
//! The stamp is the first write of each row's transaction. A second run in
//! the same month (or a concurrent one) matches zero rows and skips.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{DbError, DbResult};
use tally_core::{RecurringCommission, RecurringStatus};

#[derive(Debug, Clone)]
pub struct RecurringRepository {
    pool: SqlitePool,
}

impl RecurringRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RecurringRepository { pool }
    }

    pub async fn insert(&self, link: &RecurringCommission) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recurring_commissions (
                id, tenant_id, user_id, recurring_contract_id, commission_rule_id,
                status, last_generated_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&link.id)
        .bind(&link.tenant_id)
        .bind(&link.user_id)
        .bind(&link.recurring_contract_id)
        .bind(&link.commission_rule_id)
        .bind(link.status)
        .bind(link.last_generated_at)
        .bind(link.created_at)
        .bind(link.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate(
                "recurring_commissions",
                format!(
                    "{}/{}/{}",
                    link.user_id, link.recurring_contract_id, link.commission_rule_id
                ),
            ),
            other => other,
        })?;

        Ok(())
    }

    pub async fn get(&self, tenant_id: &str, id: &str) -> DbResult<Option<RecurringCommission>> {
        let link = sqlx::query_as::<_, RecurringCommission>(
            "SELECT * FROM recurring_commissions WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(link)
    }

    pub async fn list(
        &self,
        tenant_id: &str,
        status: Option<RecurringStatus>,
    ) -> DbResult<Vec<RecurringCommission>> {
        let links = sqlx::query_as::<_, RecurringCommission>(
            r#"
            SELECT * FROM recurring_commissions
            WHERE tenant_id = ?1 AND (?2 IS NULL OR status = ?2)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(links)
    }

    /// Moves a link from `from` to `to`. Returns false when it is no longer in `from`.
    pub async fn set_status(
        &self,
        tenant_id: &str,
        id: &str,
        from: RecurringStatus,
        to: RecurringStatus,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE recurring_commissions SET status = ?4, updated_at = ?5
            WHERE id = ?1 AND tenant_id = ?2 AND status = ?3
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Claims this period's run for one link. Returns false when the link
    /// was already stamped in the period or is no longer active.
    pub async fn stamp_generated(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        today: NaiveDate,
        period_start: NaiveDate,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE recurring_commissions SET last_generated_at = ?2, updated_at = ?4
            WHERE id = ?1
              AND status = 'active'
              AND (last_generated_at IS NULL OR last_generated_at < ?3)
            "#,
        )
        .bind(id)
        .bind(today)
        .bind(period_start)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
