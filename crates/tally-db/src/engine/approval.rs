//! Manual event transitions: approve, reverse, mark paid, and the batch form.
//!
//! Every write is a conditional UPDATE on the status the caller saw, so an
//! event moved by someone else in the meantime surfaces as a conflict instead
//! of being overwritten.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

use super::error::{ConflictKind, EngineError, EngineResult};
use super::{observe, require_actor, CommissionEngine};
use crate::repository::event::EventFilter;
use tally_core::lifecycle::{check_event_transition, check_not_self_approval};
use tally_core::validation::{validate_batch, validate_id, validate_text};
use tally_core::{BatchStatusUpdate, CommissionEvent, EngineContext, EventStatus};

/// An event the batch update left alone, and why.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedEvent {
    pub event_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStatusReport {
    pub updated: Vec<String>,
    pub skipped: Vec<SkippedEvent>,
}

impl CommissionEngine {
    pub async fn list_events(
        &self,
        ctx: &EngineContext,
        filter: &EventFilter,
    ) -> EngineResult<Vec<CommissionEvent>> {
        Ok(self.db.events().list(&ctx.tenant_id, filter).await?)
    }

    pub async fn get_event(&self, ctx: &EngineContext, id: &str) -> EngineResult<CommissionEvent> {
        self.db
            .events()
            .get(&ctx.tenant_id, id)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionEvent", id))
    }

    /// `pending → approved`. The beneficiary may not approve their own event
    /// without privilege.
    pub async fn approve_event(&self, ctx: &EngineContext, id: &str) -> EngineResult<CommissionEvent> {
        let result = self
            .transition_event(ctx, id, EventStatus::Approved, None)
            .await;
        observe("approve_event", ctx, id, result)
    }

    /// `pending | approved → reversed`, recording the reason in the notes.
    pub async fn reverse_event(
        &self,
        ctx: &EngineContext,
        id: &str,
        reason: &str,
    ) -> EngineResult<CommissionEvent> {
        validate_text("reason", reason, true)?;
        let note = format!("Reversed by {}: {}", ctx.actor_or_system(), reason.trim());
        let result = self
            .transition_event(ctx, id, EventStatus::Reversed, Some(&note))
            .await;
        observe("reverse_event", ctx, id, result)
    }

    /// `approved → paid` outside a settlement.
    pub async fn mark_event_paid(&self, ctx: &EngineContext, id: &str) -> EngineResult<CommissionEvent> {
        let result = self.transition_event(ctx, id, EventStatus::Paid, None).await;
        observe("mark_event_paid", ctx, id, result)
    }

    async fn transition_event(
        &self,
        ctx: &EngineContext,
        id: &str,
        to: EventStatus,
        note: Option<&str>,
    ) -> EngineResult<CommissionEvent> {
        validate_id("event_id", id)?;
        let actor = require_actor(ctx)?;
        let events = self.db.events();

        let current = self.get_event(ctx, id).await?;
        check_event_transition(current.status, to)?;
        if matches!(to, EventStatus::Approved | EventStatus::Reversed) {
            check_not_self_approval(&current, actor, ctx.privileged)?;
        }

        let mut tx = self.db.pool().begin().await?;
        let moved = events
            .transition(&mut *tx, &ctx.tenant_id, id, current.status, to, note, Utc::now())
            .await?;
        if !moved {
            return Err(EngineError::conflict(
                ConflictKind::InvalidTransition,
                format!("Commission event {} changed status concurrently", id),
            ));
        }
        let updated = events
            .get_with(&mut *tx, &ctx.tenant_id, id)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionEvent", id))?;
        tx.commit().await?;

        info!(
            tenant_id = %ctx.tenant_id,
            event_id = %id,
            from = %current.status,
            to = %to,
            actor = %actor,
            "Commission event transitioned"
        );
        Ok(updated)
    }

    /// Moves many events to one status in a single transaction.
    ///
    /// Events that are missing, in the wrong status or the actor's own are
    /// skipped with a reason; the rest move together.
    pub async fn batch_update_status(
        &self,
        ctx: &EngineContext,
        input: &BatchStatusUpdate,
    ) -> EngineResult<BatchStatusReport> {
        validate_batch(input)?;
        let actor = require_actor(ctx)?;
        let events = self.db.events();

        let mut report = BatchStatusReport::default();
        let mut planned: Vec<CommissionEvent> = Vec::new();
        let mut seen = HashSet::new();

        for id in &input.event_ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            let skip = |reason: String| SkippedEvent {
                event_id: id.clone(),
                reason,
            };
            let Some(event) = events.get(&ctx.tenant_id, id).await? else {
                report.skipped.push(skip("not found".to_string()));
                continue;
            };
            if let Err(e) = check_event_transition(event.status, input.status) {
                report.skipped.push(skip(e.to_string()));
                continue;
            }
            if matches!(input.status, EventStatus::Approved | EventStatus::Reversed) {
                if let Err(e) = check_not_self_approval(&event, actor, ctx.privileged) {
                    report.skipped.push(skip(e.to_string()));
                    continue;
                }
            }
            planned.push(event);
        }

        if planned.is_empty() {
            return Ok(report);
        }

        let now = Utc::now();
        let mut tx = self.db.pool().begin().await?;
        for event in planned {
            let moved = events
                .transition(&mut *tx, &ctx.tenant_id, &event.id, event.status, input.status, None, now)
                .await?;
            if moved {
                report.updated.push(event.id);
            } else {
                report.skipped.push(SkippedEvent {
                    event_id: event.id,
                    reason: "status changed concurrently".to_string(),
                });
            }
        }
        tx.commit().await?;

        info!(
            tenant_id = %ctx.tenant_id,
            to = %input.status,
            updated = report.updated.len(),
            skipped = report.skipped.len(),
            "Batch status update"
        );
        Ok(report)
    }
}
