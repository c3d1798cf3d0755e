//! # Split Repository
//!
//! The shares of a split event. A new split replaces the old one as a whole,
//! inside the caller's transaction.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tally_core::CommissionSplit;

#[derive(Debug, Clone)]
pub struct SplitRepository {
    pool: SqlitePool,
}

impl SplitRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SplitRepository { pool }
    }

    /// Deletes the event's current shares and writes `splits` in their place.
    pub async fn replace(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        commission_event_id: &str,
        splits: &[CommissionSplit],
    ) -> DbResult<()> {
        let removed = sqlx::query(
            "DELETE FROM commission_splits WHERE tenant_id = ?1 AND commission_event_id = ?2",
        )
        .bind(tenant_id)
        .bind(commission_event_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        for split in splits {
            sqlx::query(
                r#"
                INSERT INTO commission_splits (
                    id, tenant_id, commission_event_id, user_id,
                    percentage_bps, amount_cents, role, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&split.id)
            .bind(&split.tenant_id)
            .bind(&split.commission_event_id)
            .bind(&split.user_id)
            .bind(split.percentage_bps)
            .bind(split.amount_cents)
            .bind(split.role)
            .bind(split.created_at)
            .execute(&mut *conn)
            .await?;
        }

        debug!(
            event_id = %commission_event_id,
            removed,
            written = splits.len(),
            "Event splits replaced"
        );
        Ok(())
    }

    /// Shares of one event in the order they were given.
    pub async fn list_for_event(
        &self,
        tenant_id: &str,
        commission_event_id: &str,
    ) -> DbResult<Vec<CommissionSplit>> {
        let splits = sqlx::query_as::<_, CommissionSplit>(
            r#"
            SELECT * FROM commission_splits
            WHERE tenant_id = ?1 AND commission_event_id = ?2
            ORDER BY rowid ASC
            "#,
        )
        .bind(tenant_id)
        .bind(commission_event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(splits)
    }
}
