//! # Notification Outbox Repository
//!
//! Queue of user notifications written after the owning transaction commits.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Notification Outbox                                  │
//! │                                                                         │
//! │  ENGINE OPERATION (e.g. resolve_dispute)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ledger changes                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  queue(notification) ── fails? log a warning, the ledger stays          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  DISPATCHER (`tally-worker flush-outbox`, or an external one)   │   │
//! │  │                                                                 │   │
//! │  │  1. get_pending(limit)      status = 'pending', oldest first    │   │
//! │  │  2. deliver                                                     │   │
//! │  │     a. ok   → mark_sent     status = 'sent', sent_at = now      │   │
//! │  │     b. fail → mark_failed   attempts += 1, last_error = ?       │   │
//! │  │               (status = 'failed' after MAX_DELIVERY_ATTEMPTS)   │   │
//! │  │  3. cleanup_sent(days)      drop delivered rows                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use tally_core::{Notification, NotificationKind};

/// Delivery attempts before an entry is parked as `failed`.
pub const MAX_DELIVERY_ATTEMPTS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OutboxEntry {
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    #[sqlx(json)]
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Queues a notification; returns the outbox entry id.
    pub async fn queue(&self, notification: &Notification) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        debug!(
            tenant_id = %notification.tenant_id,
            user_id = %notification.user_id,
            kind = notification.kind.as_str(),
            "Queuing notification"
        );

        sqlx::query(
            r#"
            INSERT INTO notification_outbox (
                id, tenant_id, user_id, kind, title, body, payload,
                status, attempts, last_error, created_at, sent_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', 0, NULL, ?8, NULL)
            "#,
        )
        .bind(&id)
        .bind(&notification.tenant_id)
        .bind(&notification.user_id)
        .bind(notification.kind)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(Json(&notification.payload))
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Pending entries, oldest first.
    pub async fn get_pending(&self, limit: u32) -> DbResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(
            r#"
            SELECT * FROM notification_outbox
            WHERE status = 'pending'
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Every entry addressed to a user, newest first.
    pub async fn list_for_user(&self, tenant_id: &str, user_id: &str) -> DbResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(
            r#"
            SELECT * FROM notification_outbox
            WHERE tenant_id = ?1 AND user_id = ?2
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    pub async fn mark_sent(&self, id: &str) -> DbResult<()> {
        sqlx::query("UPDATE notification_outbox SET status = 'sent', sent_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Records a failed delivery.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE notification_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                status = CASE WHEN attempts + 1 >= ?3 THEN 'failed' ELSE status END
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(MAX_DELIVERY_ATTEMPTS)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notification_outbox WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Deletes entries delivered more than `days_old` days ago.
    pub async fn cleanup_sent(&self, days_old: u32) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_old));

        let result = sqlx::query(
            "DELETE FROM notification_outbox WHERE status = 'sent' AND sent_at < ?1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
