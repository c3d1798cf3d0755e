//! Goal tracker.
//!
//! `achieved_amount_cents` on a goal is a cache over the approved and paid
//! events of its (user, period). Refreshing only overwrites that cache, so
//! it can run any number of times.

use chrono::Utc;
use tracing::{debug, info};

use super::error::{EngineError, EngineResult};
use super::{new_id, require_actor, CommissionEngine};
use tally_core::goal::{compute_achievement, Achievement};
use tally_core::validation::{validate_id, validate_new_goal};
use tally_core::{CommissionGoal, CoreError, EngineContext, GoalStatus, Money, NewCommissionGoal};

impl CommissionEngine {
    pub async fn create_goal(
        &self,
        ctx: &EngineContext,
        input: &NewCommissionGoal,
    ) -> EngineResult<CommissionGoal> {
        let period = validate_new_goal(input)?;
        require_actor(ctx)?;

        let now = Utc::now();
        let goal = CommissionGoal {
            id: new_id(),
            tenant_id: ctx.tenant_id.clone(),
            user_id: input.user_id.clone(),
            period: period.to_string(),
            target_amount_cents: input.target_amount_cents,
            bonus_rules: input.bonus_rules.clone(),
            achieved_amount_cents: 0,
            status: GoalStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.db.goals().insert(&goal).await?;

        info!(tenant_id = %ctx.tenant_id, goal_id = %goal.id, user_id = %goal.user_id, "Goal created");
        Ok(goal)
    }

    pub async fn get_goal(&self, ctx: &EngineContext, id: &str) -> EngineResult<CommissionGoal> {
        self.db
            .goals()
            .get(&ctx.tenant_id, id)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionGoal", id))
    }

    pub async fn list_goals(
        &self,
        ctx: &EngineContext,
        user_id: Option<&str>,
        period: Option<&str>,
    ) -> EngineResult<Vec<CommissionGoal>> {
        Ok(self.db.goals().list(&ctx.tenant_id, user_id, period).await?)
    }

    /// Recomputes the goal's achieved amount and reports percentage and bonus.
    ///
    /// A closed goal keeps its frozen amount; the result is computed from it.
    pub async fn refresh_achievement(&self, ctx: &EngineContext, goal_id: &str) -> EngineResult<Achievement> {
        validate_id("goal_id", goal_id)?;
        let goal = self.get_goal(ctx, goal_id).await?;

        if goal.status == GoalStatus::Closed {
            return Ok(achievement_of(&goal, goal.achieved_amount()));
        }

        let achieved = self
            .db
            .events()
            .achieved_total(&ctx.tenant_id, &goal.user_id, &goal.period)
            .await?;
        let written = self
            .db
            .goals()
            .set_achieved(&ctx.tenant_id, goal_id, achieved, Utc::now())
            .await?;
        if !written {
            // Closed in the meantime; report what it was frozen at.
            let closed = self.get_goal(ctx, goal_id).await?;
            return Ok(achievement_of(&closed, closed.achieved_amount()));
        }

        let achievement = achievement_of(&goal, Money::from_cents(achieved));
        debug!(
            tenant_id = %ctx.tenant_id,
            goal_id = %goal_id,
            achieved_cents = achievement.achieved_cents,
            pct_bps = achievement.pct_bps,
            "Goal achievement refreshed"
        );
        Ok(achievement)
    }

    /// `active → closed`, freezing a final refresh of the achieved amount.
    pub async fn close_goal(&self, ctx: &EngineContext, goal_id: &str) -> EngineResult<CommissionGoal> {
        validate_id("goal_id", goal_id)?;
        require_actor(ctx)?;
        let goal = self.get_goal(ctx, goal_id).await?;
        if goal.status == GoalStatus::Closed {
            return Err(CoreError::GoalClosed.into());
        }

        let achieved = self
            .db
            .events()
            .achieved_total(&ctx.tenant_id, &goal.user_id, &goal.period)
            .await?;
        if !self
            .db
            .goals()
            .close(&ctx.tenant_id, goal_id, achieved, Utc::now())
            .await?
        {
            return Err(CoreError::GoalClosed.into());
        }

        info!(tenant_id = %ctx.tenant_id, goal_id = %goal_id, achieved_cents = achieved, "Goal closed");
        self.get_goal(ctx, goal_id).await
    }
}

fn achievement_of(goal: &CommissionGoal, achieved: Money) -> Achievement {
    compute_achievement(achieved, goal.target_amount(), &goal.bonus_rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ConflictKind;
    use crate::test_support::*;
    use tally_core::{BonusRule, EventStatus};

    fn new_goal(target: i64) -> NewCommissionGoal {
        NewCommissionGoal {
            user_id: "u1".to_string(),
            period: "2025-01".to_string(),
            target_amount_cents: target,
            bonus_rules: vec![
                BonusRule { threshold_bps: 8_000, bonus_bps: 200 },
                BonusRule { threshold_bps: 10_000, bonus_bps: 500 },
            ],
        }
    }

    #[tokio::test]
    async fn test_refresh_counts_approved_and_paid() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "u1", 400, EventStatus::Approved, "2025-01").await;
        insert_event(&db, "e2", "r1", "u1", 500, EventStatus::Paid, "2025-01").await;
        insert_event(&db, "e3", "r1", "u1", 700, EventStatus::Pending, "2025-01").await;
        insert_event(&db, "e4", "r1", "u1", 800, EventStatus::Reversed, "2025-01").await;
        insert_event(&db, "e5", "r1", "u1", 900, EventStatus::Approved, "2024-12").await;
        let goal = engine.create_goal(&ctx(), &new_goal(1_000)).await.unwrap();

        let achievement = engine.refresh_achievement(&ctx(), &goal.id).await.unwrap();

        assert_eq!(achievement.achieved_cents, 900);
        assert_eq!(achievement.target_cents, 1_000);
        assert_eq!(achievement.pct_bps, 9_000);
        assert_eq!(achievement.bonus_cents, 18);
        assert_eq!(engine.get_goal(&ctx(), &goal.id).await.unwrap().achieved_amount_cents, 900);
    }

    #[tokio::test]
    async fn test_refresh_is_repeatable() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "u1", 1_200, EventStatus::Approved, "2025-01").await;
        let goal = engine.create_goal(&ctx(), &new_goal(1_000)).await.unwrap();

        let first = engine.refresh_achievement(&ctx(), &goal.id).await.unwrap();
        let second = engine.refresh_achievement(&ctx(), &goal.id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.achieved_cents, 1_200);
        assert_eq!(second.bonus_cents, 60);
    }

    #[tokio::test]
    async fn test_closed_goal_is_frozen() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        insert_event(&db, "e1", "r1", "u1", 500, EventStatus::Approved, "2025-01").await;
        let goal = engine.create_goal(&ctx(), &new_goal(1_000)).await.unwrap();

        let closed = engine.close_goal(&ctx(), &goal.id).await.unwrap();
        assert_eq!(closed.status, GoalStatus::Closed);
        assert_eq!(closed.achieved_amount_cents, 500);

        insert_event(&db, "e2", "r1", "u1", 500, EventStatus::Approved, "2025-01").await;
        let achievement = engine.refresh_achievement(&ctx(), &goal.id).await.unwrap();
        assert_eq!(achievement.achieved_cents, 500);

        let err = engine.close_goal(&ctx(), &goal.id).await.unwrap_err();
        assert!(err.is_conflict(ConflictKind::InvalidTransition));
    }

    #[tokio::test]
    async fn test_goal_validation() {
        let engine = test_engine().await;
        let err = engine.create_goal(&ctx(), &new_goal(0)).await.unwrap_err();
        assert_eq!(err.status_code(), 400);

        let mut bad_period = new_goal(1_000);
        bad_period.period = "January".to_string();
        let err = engine.create_goal(&ctx(), &bad_period).await.unwrap_err();
        assert_eq!(err.status_code(), 400);

        assert!(engine.list_goals(&ctx(), Some("u1"), None).await.unwrap().is_empty());
    }
}
