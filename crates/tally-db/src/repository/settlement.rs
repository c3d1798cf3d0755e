//! # Settlement Repository
//!
//! One row per (tenant, user, period), enforced by a UNIQUE constraint;
//! closing a period twice updates the same row.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tally_core::CommissionSettlement;

#[derive(Debug, Clone)]
pub struct SettlementRepository {
    pool: SqlitePool,
}

impl SettlementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettlementRepository { pool }
    }

    /// Inserts the (user, period) settlement, or refreshes the close stamp of
    /// the existing one while it is still `closed`. A `paid` row is left
    /// untouched.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_closed(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        tenant_id: &str,
        user_id: &str,
        period: &str,
        closed_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO commission_settlements (
                id, tenant_id, user_id, period, total_amount_cents, events_count,
                status, closed_by, closed_at, paid_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 0, 0, 'closed', ?5, ?6, NULL, ?6, ?6)
            ON CONFLICT (tenant_id, user_id, period) DO UPDATE SET
                closed_by = excluded.closed_by,
                closed_at = excluded.closed_at,
                updated_at = excluded.updated_at
            WHERE commission_settlements.status = 'closed'
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(user_id)
        .bind(period)
        .bind(closed_by)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn get_for_period_with(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        user_id: &str,
        period: &str,
    ) -> DbResult<Option<CommissionSettlement>> {
        let settlement = sqlx::query_as::<_, CommissionSettlement>(
            r#"
            SELECT * FROM commission_settlements
            WHERE tenant_id = ?1 AND user_id = ?2 AND period = ?3
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(period)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(settlement)
    }

    pub async fn set_totals(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        total_amount_cents: i64,
        events_count: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE commission_settlements SET
                total_amount_cents = ?2,
                events_count = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(total_amount_cents)
        .bind(events_count)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        debug!(
            settlement_id = %id,
            total_amount_cents,
            events_count,
            "Settlement totals recomputed"
        );
        Ok(())
    }

    pub async fn get(&self, tenant_id: &str, id: &str) -> DbResult<Option<CommissionSettlement>> {
        let settlement = sqlx::query_as::<_, CommissionSettlement>(
            "SELECT * FROM commission_settlements WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(settlement)
    }

    pub async fn list(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        period: Option<&str>,
    ) -> DbResult<Vec<CommissionSettlement>> {
        let settlements = sqlx::query_as::<_, CommissionSettlement>(
            r#"
            SELECT * FROM commission_settlements
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

        Ok(settlements)
    }

    /// `closed → paid`. Returns false when the settlement is not `closed`.
    pub async fn mark_paid(&self, tenant_id: &str, id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commission_settlements SET
                status = 'paid',
                paid_at = ?3,
                updated_at = ?3
            WHERE id = ?1 AND tenant_id = ?2 AND status = 'closed'
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
