//! # Commission Event Repository
//!
//! Ledger events and the one-per-work-order generation marker.
//!
//! ## Generation Marker
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    INSERT INTO commission_generation_markers (tenant, work_order) ◄─┐   │
//! │    INSERT INTO commission_events ... (one per rule × user)          │   │
//! │    UPDATE commission_generation_markers SET events_count = n        │   │
//! │  COMMIT                                                             │   │
//! │                                                                     │   │
//! │  A second pass for the same work order fails on the PRIMARY KEY ────┘   │
//! │  of the marker, before it writes a single event.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Status Writes
//! Every status change is a conditional UPDATE (`WHERE status = ?from`), so
//! two concurrent writers can never both move the same event.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tally_core::{CommissionEvent, EventStatus, Trigger};

/// Optional filters for [`EventRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub user_id: Option<String>,
    pub period: Option<String>,
    pub status: Option<EventStatus>,
    pub work_order_id: Option<String>,
}

/// Sum and count of a user's events in one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StatusTotal {
    pub status: EventStatus,
    pub total_cents: i64,
    pub events_count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct GenerationMarker {
    pub tenant_id: String,
    pub work_order_id: String,
    pub trigger_type: Trigger,
    pub events_count: i64,
    pub generated_by: Option<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EventRepository {
    pool: SqlitePool,
}

impl EventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        EventRepository { pool }
    }

    // =========================================================================
    // Generation marker
    // =========================================================================

    /// Claims the generation slot of a work order.
    ///
    /// Fails with [`crate::DbError::UniqueViolation`] if any pass (committed,
    /// or in flight on another connection) already holds it.
    pub async fn claim_generation(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        work_order_id: &str,
        trigger: Trigger,
        generated_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO commission_generation_markers (
                tenant_id, work_order_id, trigger_type, events_count, generated_by, generated_at
            ) VALUES (?1, ?2, ?3, 0, ?4, ?5)
            "#,
        )
        .bind(tenant_id)
        .bind(work_order_id)
        .bind(trigger)
        .bind(generated_by)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        debug!(tenant_id = %tenant_id, work_order_id = %work_order_id, "Generation marker claimed");
        Ok(())
    }

    pub async fn record_generation_count(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        work_order_id: &str,
        events_count: i64,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE commission_generation_markers SET events_count = ?3
            WHERE tenant_id = ?1 AND work_order_id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(work_order_id)
        .bind(events_count)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn generation_marker(
        &self,
        tenant_id: &str,
        work_order_id: &str,
    ) -> DbResult<Option<GenerationMarker>> {
        let marker = sqlx::query_as::<_, GenerationMarker>(
            r#"
            SELECT * FROM commission_generation_markers
            WHERE tenant_id = ?1 AND work_order_id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(work_order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(marker)
    }

    /// Whether any event, generated or recurring, already references the
    /// work order.
    pub async fn exists_for_work_order(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        work_order_id: &str,
    ) -> DbResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM commission_events
                WHERE tenant_id = ?1 AND work_order_id = ?2
            )
            "#,
        )
        .bind(tenant_id)
        .bind(work_order_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(exists)
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub async fn insert(&self, conn: &mut SqliteConnection, event: &CommissionEvent) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO commission_events (
                id, tenant_id, rule_id, work_order_id, recurring_commission_id,
                user_id, role, trigger_type, period, base_amount_cents,
                commission_amount_cents, multiplier_bps, status, settlement_id,
                notes, created_by, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18
            )
            "#,
        )
        .bind(&event.id)
        .bind(&event.tenant_id)
        .bind(&event.rule_id)
        .bind(&event.work_order_id)
        .bind(&event.recurring_commission_id)
        .bind(&event.user_id)
        .bind(event.role)
        .bind(event.trigger_type)
        .bind(&event.period)
        .bind(event.base_amount_cents)
        .bind(event.commission_amount_cents)
        .bind(event.multiplier_bps)
        .bind(event.status)
        .bind(&event.settlement_id)
        .bind(&event.notes)
        .bind(&event.created_by)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&mut *conn)
        .await?;

        debug!(
            event_id = %event.id,
            user_id = %event.user_id,
            amount_cents = event.commission_amount_cents,
            "Commission event inserted"
        );
        Ok(())
    }

    pub async fn get(&self, tenant_id: &str, id: &str) -> DbResult<Option<CommissionEvent>> {
        let event = sqlx::query_as::<_, CommissionEvent>(
            "SELECT * FROM commission_events WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    /// Same as [`get`](Self::get), read through an open transaction.
    pub async fn get_with(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        id: &str,
    ) -> DbResult<Option<CommissionEvent>> {
        let event = sqlx::query_as::<_, CommissionEvent>(
            "SELECT * FROM commission_events WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(event)
    }

    pub async fn list(&self, tenant_id: &str, filter: &EventFilter) -> DbResult<Vec<CommissionEvent>> {
        let events = sqlx::query_as::<_, CommissionEvent>(
            r#"
            SELECT * FROM commission_events
            WHERE tenant_id = ?1
              AND (?2 IS NULL OR user_id = ?2)
              AND (?3 IS NULL OR period = ?3)
              AND (?4 IS NULL OR status = ?4)
              AND (?5 IS NULL OR work_order_id = ?5)
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(tenant_id)
        .bind(&filter.user_id)
        .bind(&filter.period)
        .bind(filter.status)
        .bind(&filter.work_order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Events of one work order in insertion order.
    pub async fn list_for_work_order(
        &self,
        tenant_id: &str,
        work_order_id: &str,
    ) -> DbResult<Vec<CommissionEvent>> {
        let events = sqlx::query_as::<_, CommissionEvent>(
            r#"
            SELECT * FROM commission_events
            WHERE tenant_id = ?1 AND work_order_id = ?2
            ORDER BY rowid ASC
            "#,
        )
        .bind(tenant_id)
        .bind(work_order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Pending events of a work order, read inside the caller's transaction.
    pub async fn pending_for_work_order(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        work_order_id: &str,
    ) -> DbResult<Vec<CommissionEvent>> {
        let events = sqlx::query_as::<_, CommissionEvent>(
            r#"
            SELECT * FROM commission_events
            WHERE tenant_id = ?1 AND work_order_id = ?2 AND status = 'pending'
            ORDER BY rowid ASC
            "#,
        )
        .bind(tenant_id)
        .bind(work_order_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(events)
    }

    /// Lowers a pending event from `expected_cents` to `amount_cents`.
    ///
    /// Returns false when the event is no longer pending or its amount has
    /// changed since it was read.
    #[allow(clippy::too_many_arguments)]
    pub async fn reduce_pending(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        id: &str,
        expected_cents: i64,
        amount_cents: i64,
        note: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commission_events SET
                commission_amount_cents = ?4,
                notes = CASE
                    WHEN notes IS NULL OR notes = '' THEN ?5
                    ELSE notes || char(10) || ?5
                END,
                updated_at = ?6
            WHERE id = ?1 AND tenant_id = ?2
              AND status = 'pending' AND commission_amount_cents = ?3
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(expected_cents)
        .bind(amount_cents)
        .bind(note)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Moves an event from `from` to `to`, appending `note` when given.
    ///
    /// Returns false when the event is no longer in `from`.
    #[allow(clippy::too_many_arguments)]
    pub async fn transition(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        id: &str,
        from: EventStatus,
        to: EventStatus,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commission_events SET
                status = ?4,
                notes = CASE
                    WHEN ?5 IS NULL THEN notes
                    WHEN notes IS NULL OR notes = '' THEN ?5
                    ELSE notes || char(10) || ?5
                END,
                updated_at = ?6
            WHERE id = ?1 AND tenant_id = ?2 AND status = ?3
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .bind(note)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Overwrites the amount of an unsettled event and appends an audit note.
    ///
    /// Returns false when the event is no longer pending or approved.
    pub async fn rewrite_amount(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        id: &str,
        amount_cents: i64,
        note: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE commission_events SET
                commission_amount_cents = ?3,
                notes = CASE
                    WHEN notes IS NULL OR notes = '' THEN ?4
                    ELSE notes || char(10) || ?4
                END,
                updated_at = ?5
            WHERE id = ?1 AND tenant_id = ?2 AND status IN ('pending', 'approved')
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(amount_cents)
        .bind(note)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Folds every approved event of (user, period) into `settlement_id` and
    /// marks it paid. Returns how many events moved.
    pub async fn settle_approved(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        user_id: &str,
        period: &str,
        settlement_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE commission_events SET
                status = 'paid',
                settlement_id = ?4,
                updated_at = ?5
            WHERE tenant_id = ?1 AND user_id = ?2 AND period = ?3 AND status = 'approved'
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(period)
        .bind(settlement_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// `(sum, count)` of the events folded into a settlement.
    pub async fn settlement_totals(
        &self,
        conn: &mut SqliteConnection,
        settlement_id: &str,
    ) -> DbResult<(i64, i64)> {
        let totals: (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(commission_amount_cents), 0), COUNT(*)
            FROM commission_events
            WHERE settlement_id = ?1 AND status = 'paid'
            "#,
        )
        .bind(settlement_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(totals)
    }

    /// Σ amount over approved and paid events of (user, period).
    pub async fn achieved_total(&self, tenant_id: &str, user_id: &str, period: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(commission_amount_cents), 0)
            FROM commission_events
            WHERE tenant_id = ?1 AND user_id = ?2 AND period = ?3
              AND status IN ('approved', 'paid')
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(period)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// Per-status totals of a user's events, optionally limited to a period.
    pub async fn totals_by_status(
        &self,
        tenant_id: &str,
        user_id: &str,
        period: Option<&str>,
    ) -> DbResult<Vec<StatusTotal>> {
        let totals = sqlx::query_as::<_, StatusTotal>(
            r#"
            SELECT
                status,
                COALESCE(SUM(commission_amount_cents), 0) AS total_cents,
                COUNT(*) AS events_count
            FROM commission_events
            WHERE tenant_id = ?1 AND user_id = ?2 AND (?3 IS NULL OR period = ?3)
            GROUP BY status
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(period)
        .fetch_all(&self.pool)
        .await?;

        Ok(totals)
    }
}
