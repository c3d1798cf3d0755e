//! # Dispute Repository
//!
//! The partial index `uq_commission_disputes_open` allows at most one open
//! dispute per event; a second concurrent insert fails with
//! [`DbError::UniqueViolation`](crate::DbError::UniqueViolation).

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tally_core::{CommissionDispute, DisputeStatus};

/// How an open dispute is being closed.
#[derive(Debug, Clone)]
pub struct DisputeClosure<'a> {
    pub status: DisputeStatus,
    pub resolution_notes: Option<&'a str>,
    pub resolved_by: &'a str,
    pub new_amount_cents: Option<i64>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DisputeRepository {
    pool: SqlitePool,
}

impl DisputeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DisputeRepository { pool }
    }

    pub async fn insert(&self, dispute: &CommissionDispute) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO commission_disputes (
                id, tenant_id, commission_event_id, user_id, reason, status,
                resolution_notes, resolved_by, resolved_at, new_amount_cents,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&dispute.id)
        .bind(&dispute.tenant_id)
        .bind(&dispute.commission_event_id)
        .bind(&dispute.user_id)
        .bind(&dispute.reason)
        .bind(dispute.status)
        .bind(&dispute.resolution_notes)
        .bind(&dispute.resolved_by)
        .bind(dispute.resolved_at)
        .bind(dispute.new_amount_cents)
        .bind(dispute.created_at)
        .bind(dispute.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(
            dispute_id = %dispute.id,
            event_id = %dispute.commission_event_id,
            "Dispute opened"
        );
        Ok(())
    }

    pub async fn get(&self, tenant_id: &str, id: &str) -> DbResult<Option<CommissionDispute>> {
        let dispute = sqlx::query_as::<_, CommissionDispute>(
            "SELECT * FROM commission_disputes WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(dispute)
    }

    pub async fn get_with(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        id: &str,
    ) -> DbResult<Option<CommissionDispute>> {
        let dispute = sqlx::query_as::<_, CommissionDispute>(
            "SELECT * FROM commission_disputes WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(dispute)
    }

    pub async fn list(
        &self,
        tenant_id: &str,
        status: Option<DisputeStatus>,
        user_id: Option<&str>,
    ) -> DbResult<Vec<CommissionDispute>> {
        let disputes = sqlx::query_as::<_, CommissionDispute>(
            r#"
            SELECT * FROM commission_disputes
            WHERE tenant_id = ?1
              AND (?2 IS NULL OR status = ?2)
              AND (?3 IS NULL OR user_id = ?3)
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(tenant_id)
        .bind(status)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(disputes)
    }

    /// Closes an open dispute. Returns false when it was no longer open.
    pub async fn close(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        id: &str,
        closure: &DisputeClosure<'_>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commission_disputes SET
                status = ?3,
                resolution_notes = ?4,
                resolved_by = ?5,
                resolved_at = ?6,
                new_amount_cents = ?7,
                updated_at = ?6
            WHERE id = ?1 AND tenant_id = ?2 AND status = 'open'
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(closure.status)
        .bind(closure.resolution_notes)
        .bind(closure.resolved_by)
        .bind(closure.at)
        .bind(closure.new_amount_cents)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
