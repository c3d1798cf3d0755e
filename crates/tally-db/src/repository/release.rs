//! # Payment Release Repository
//!
//! One row per received payment. The release transaction inserts it before
//! touching any event, so a payment delivered twice collides on the primary
//! key and releases nothing the second time.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tally_core::PaymentRelease;

#[derive(Debug, Clone)]
pub struct ReleaseRepository {
    pool: SqlitePool,
}

impl ReleaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReleaseRepository { pool }
    }

    /// Fails with [`crate::DbError::UniqueViolation`] if the receivable was
    /// already released.
    pub async fn claim(&self, conn: &mut SqliteConnection, release: &PaymentRelease) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO commission_payment_releases (
                tenant_id, receivable_id, work_order_id, payment_cents,
                proportion_bps, events_count, released_by, released_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&release.tenant_id)
        .bind(&release.receivable_id)
        .bind(&release.work_order_id)
        .bind(release.payment_cents)
        .bind(release.proportion_bps)
        .bind(release.events_count)
        .bind(&release.released_by)
        .bind(release.released_at)
        .execute(&mut *conn)
        .await?;

        debug!(
            tenant_id = %release.tenant_id,
            receivable_id = %release.receivable_id,
            "Payment release claimed"
        );
        Ok(())
    }

    /// Σ payments released against the work order before `receivable_id`.
    pub async fn paid_before(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        work_order_id: &str,
        receivable_id: &str,
    ) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(payment_cents), 0) FROM commission_payment_releases
            WHERE tenant_id = ?1 AND work_order_id = ?2 AND receivable_id <> ?3
            "#,
        )
        .bind(tenant_id)
        .bind(work_order_id)
        .bind(receivable_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(total)
    }

    /// Fills in what the claimed release ended up doing.
    pub async fn record_outcome(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        receivable_id: &str,
        proportion_bps: i64,
        events_count: i64,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE commission_payment_releases SET proportion_bps = ?3, events_count = ?4
            WHERE tenant_id = ?1 AND receivable_id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(receivable_id)
        .bind(proportion_bps)
        .bind(events_count)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn get(&self, tenant_id: &str, receivable_id: &str) -> DbResult<Option<PaymentRelease>> {
        let release = sqlx::query_as::<_, PaymentRelease>(
            "SELECT * FROM commission_payment_releases WHERE tenant_id = ?1 AND receivable_id = ?2",
        )
        .bind(tenant_id)
        .bind(receivable_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(release)
    }

    /// Releases of one work order, oldest first.
    pub async fn list_for_work_order(
        &self,
        tenant_id: &str,
        work_order_id: &str,
    ) -> DbResult<Vec<PaymentRelease>> {
        let releases = sqlx::query_as::<_, PaymentRelease>(
            r#"
            SELECT * FROM commission_payment_releases
            WHERE tenant_id = ?1 AND work_order_id = ?2
            ORDER BY released_at ASC, rowid ASC
            "#,
        )
        .bind(tenant_id)
        .bind(work_order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(releases)
    }
}
