//! Sharing one commission event between several users.
//!
//! A split records who the event's amount is owed to; the event itself is
//! left untouched. Splitting again replaces the previous shares.

use chrono::Utc;
use tracing::info;

use super::error::{ConflictKind, EngineError, EngineResult};
use super::{new_id, observe, require_actor, CommissionEngine};
use tally_core::split::allocate;
use tally_core::validation::{validate_id, validate_split};
use tally_core::{CommissionSplit, EngineContext, EventStatus, Role, SplitEvent};

impl CommissionEngine {
    /// Replaces the shares of an event.
    ///
    /// The last share absorbs rounding, so the stored amounts always add up
    /// to the event's amount.
    pub async fn split_event(
        &self,
        ctx: &EngineContext,
        event_id: &str,
        input: &SplitEvent,
    ) -> EngineResult<Vec<CommissionSplit>> {
        let result = self.split_event_inner(ctx, event_id, input).await;
        observe("split_event", ctx, event_id, result)
    }

    async fn split_event_inner(
        &self,
        ctx: &EngineContext,
        event_id: &str,
        input: &SplitEvent,
    ) -> EngineResult<Vec<CommissionSplit>> {
        validate_id("event_id", event_id)?;
        validate_split(input)?;
        let actor = require_actor(ctx)?;

        let events = self.db.events();
        let mut tx = self.db.pool().begin().await?;

        let event = events
            .get_with(&mut *tx, &ctx.tenant_id, event_id)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionEvent", event_id))?;
        if event.status == EventStatus::Reversed {
            return Err(EngineError::conflict(
                ConflictKind::InvalidTransition,
                "A reversed commission cannot be split",
            ));
        }

        let bps: Vec<i64> = input.shares.iter().map(|s| s.percentage_bps).collect();
        let now = Utc::now();
        let splits: Vec<CommissionSplit> = input
            .shares
            .iter()
            .zip(allocate(event.commission_amount(), &bps))
            .map(|(share, amount)| CommissionSplit {
                id: new_id(),
                tenant_id: ctx.tenant_id.clone(),
                commission_event_id: event.id.clone(),
                user_id: share.user_id.trim().to_string(),
                percentage_bps: share.percentage_bps,
                amount_cents: amount.cents(),
                role: share.role.unwrap_or(Role::Technician),
                created_at: now,
            })
            .collect();

        self.db
            .splits()
            .replace(&mut *tx, &ctx.tenant_id, &event.id, &splits)
            .await?;
        tx.commit().await?;

        info!(
            tenant_id = %ctx.tenant_id,
            event_id = %event.id,
            shares = splits.len(),
            actor = %actor,
            "Commission event split"
        );
        Ok(splits)
    }

    pub async fn list_event_splits(
        &self,
        ctx: &EngineContext,
        event_id: &str,
    ) -> EngineResult<Vec<CommissionSplit>> {
        validate_id("event_id", event_id)?;
        Ok(self
            .db
            .splits()
            .list_for_event(&ctx.tenant_id, event_id)
            .await?)
    }
}
