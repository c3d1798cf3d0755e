//! Read-only balance per user.

use serde::Serialize;

use super::error::EngineResult;
use super::CommissionEngine;
use tally_core::validation::{validate_id, validate_period};
use tally_core::{EngineContext, EventStatus};

/// Totals of one status bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub total_cents: i64,
    pub events_count: i64,
}

/// What a user has pending, approved (payable) and already paid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BalanceSummary {
    pub user_id: String,
    /// None when the summary covers every period.
    pub period: Option<String>,
    pub pending: Bucket,
    pub approved: Bucket,
    pub paid: Bucket,
}

impl CommissionEngine {
    /// Sums a user's events by status. Reversed events are left out.
    pub async fn balance_summary(
        &self,
        ctx: &EngineContext,
        user_id: &str,
        period: Option<&str>,
    ) -> EngineResult<BalanceSummary> {
        validate_id("user_id", user_id)?;
        let period = period.map(validate_period).transpose()?.map(|p| p.to_string());

        let totals = self
            .db
            .events()
            .totals_by_status(&ctx.tenant_id, user_id, period.as_deref())
            .await?;

        let mut summary = BalanceSummary {
            user_id: user_id.to_string(),
            period,
            ..Default::default()
        };
        for row in totals {
            let bucket = Bucket {
                total_cents: row.total_cents,
                events_count: row.events_count,
            };
            match row.status {
                EventStatus::Pending => summary.pending = bucket,
                EventStatus::Approved => summary.approved = bucket,
                EventStatus::Paid => summary.paid = bucket,
                EventStatus::Reversed => {}
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[tokio::test]
    async fn test_summary_buckets() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "u1", 100, EventStatus::Pending, "2025-01").await;
        insert_event(&db, "e2", "r1", "u1", 200, EventStatus::Approved, "2025-01").await;
        insert_event(&db, "e3", "r1", "u1", 300, EventStatus::Approved, "2025-01").await;
        insert_event(&db, "e4", "r1", "u1", 400, EventStatus::Paid, "2024-12").await;
        insert_event(&db, "e5", "r1", "u1", 500, EventStatus::Reversed, "2025-01").await;

        let all = engine.balance_summary(&ctx(), "u1", None).await.unwrap();
        assert_eq!(all.pending, Bucket { total_cents: 100, events_count: 1 });
        assert_eq!(all.approved, Bucket { total_cents: 500, events_count: 2 });
        assert_eq!(all.paid, Bucket { total_cents: 400, events_count: 1 });

        let january = engine.balance_summary(&ctx(), "u1", Some("2025-01")).await.unwrap();
        assert_eq!(january.paid, Bucket::default());
        assert_eq!(january.period.as_deref(), Some("2025-01"));
    }

    #[tokio::test]
    async fn test_summary_rejects_bad_period() {
        let engine = test_engine().await;
        let err = engine.balance_summary(&ctx(), "u1", Some("2025-1")).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
