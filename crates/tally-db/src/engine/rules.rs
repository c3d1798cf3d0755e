//! Rule and campaign administration.

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::error::{EngineError, EngineResult};
use super::{new_id, require_actor, CommissionEngine};
use tally_core::validation::{validate_id, validate_new_campaign, validate_new_rule, validate_rule_update};
use tally_core::{
    CalculationType, CommissionCampaign, CommissionRule, EngineContext, NewCommissionCampaign,
    NewCommissionRule, UpdateCommissionRule,
};

/// One entry of the calculation type catalogue shown by rule editors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalculationTypeInfo {
    pub code: &'static str,
    pub label: &'static str,
    /// Whether the rule value is read as money instead of a percentage.
    pub fixed_amount: bool,
}

/// Every selectable calculation type, in display order.
pub fn calculation_types() -> Vec<CalculationTypeInfo> {
    CalculationType::ALL
        .iter()
        .map(|c| CalculationTypeInfo {
            code: c.code(),
            label: c.label(),
            fixed_amount: c.is_fixed_amount(),
        })
        .collect()
}

impl CommissionEngine {
    // =========================================================================
    // Rules
    // =========================================================================

    pub async fn create_rule(&self, ctx: &EngineContext, input: &NewCommissionRule) -> EngineResult<CommissionRule> {
        validate_new_rule(input)?;
        require_actor(ctx)?;

        let now = Utc::now();
        let rule = CommissionRule {
            id: new_id(),
            tenant_id: ctx.tenant_id.clone(),
            owner_user_id: input.owner_user_id.clone(),
            name: input.name.trim().to_string(),
            rule_type: input.rule_type,
            value_hundredths: input.value_hundredths,
            applies_to: input.applies_to,
            calculation_type: input.calculation_type,
            applies_to_role: input.applies_to_role,
            applies_when: input.applies_when,
            tiers: input.tiers.clone(),
            formula: input.formula.clone(),
            source_filter: input.source_filter.clone(),
            priority: input.priority,
            active: input.active,
            created_at: now,
            updated_at: now,
        };
        self.db.rules().insert(&rule).await?;

        info!(
            tenant_id = %ctx.tenant_id,
            rule_id = %rule.id,
            calculation_type = %rule.calculation_type,
            "Commission rule created"
        );
        Ok(rule)
    }

    /// Merges a partial update into the stored rule.
    pub async fn update_rule(
        &self,
        ctx: &EngineContext,
        id: &str,
        update: &UpdateCommissionRule,
    ) -> EngineResult<CommissionRule> {
        validate_id("rule_id", id)?;
        require_actor(ctx)?;
        let mut rule = self.get_rule(ctx, id).await?;
        validate_rule_update(&rule, update)?;

        if let Some(name) = update.name.as_deref() {
            rule.name = name.trim().to_string();
        }
        if let Some(v) = update.rule_type {
            rule.rule_type = v;
        }
        if let Some(v) = update.value_hundredths {
            rule.value_hundredths = v;
        }
        if let Some(v) = update.applies_to {
            rule.applies_to = v;
        }
        if let Some(v) = update.calculation_type {
            rule.calculation_type = v;
        }
        if let Some(v) = update.applies_to_role {
            rule.applies_to_role = Some(v);
        }
        if let Some(v) = update.applies_when {
            rule.applies_when = v;
        }
        if let Some(v) = &update.tiers {
            rule.tiers = v.clone();
        }
        if let Some(v) = &update.formula {
            rule.formula = Some(v.clone());
        }
        if let Some(v) = &update.source_filter {
            rule.source_filter = Some(v.clone());
        }
        if let Some(v) = update.priority {
            rule.priority = v;
        }
        if let Some(v) = update.active {
            rule.active = v;
        }
        rule.updated_at = Utc::now();

        self.db.rules().update(&rule).await?;
        info!(tenant_id = %ctx.tenant_id, rule_id = %id, "Commission rule updated");
        Ok(rule)
    }

    /// Rules are never deleted; events keep pointing at them.
    pub async fn deactivate_rule(&self, ctx: &EngineContext, id: &str) -> EngineResult<CommissionRule> {
        validate_id("rule_id", id)?;
        require_actor(ctx)?;
        self.db
            .rules()
            .set_active(&ctx.tenant_id, id, false, Utc::now())
            .await?;
        info!(tenant_id = %ctx.tenant_id, rule_id = %id, "Commission rule deactivated");
        self.get_rule(ctx, id).await
    }

    pub async fn get_rule(&self, ctx: &EngineContext, id: &str) -> EngineResult<CommissionRule> {
        self.db
            .rules()
            .get(&ctx.tenant_id, id)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionRule", id))
    }

    pub async fn list_rules(&self, ctx: &EngineContext, include_inactive: bool) -> EngineResult<Vec<CommissionRule>> {
        Ok(self.db.rules().list(&ctx.tenant_id, include_inactive).await?)
    }

    // =========================================================================
    // Campaigns
    // =========================================================================

    pub async fn create_campaign(
        &self,
        ctx: &EngineContext,
        input: &NewCommissionCampaign,
    ) -> EngineResult<CommissionCampaign> {
        validate_new_campaign(input)?;
        require_actor(ctx)?;

        let campaign = CommissionCampaign {
            id: new_id(),
            tenant_id: ctx.tenant_id.clone(),
            name: input.name.trim().to_string(),
            multiplier_bps: input.multiplier_bps,
            applies_to_role: input.applies_to_role,
            applies_to_calculation_type: input.applies_to_calculation_type,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            active: true,
            created_at: Utc::now(),
        };
        self.db.campaigns().insert(&campaign).await?;

        info!(
            tenant_id = %ctx.tenant_id,
            campaign_id = %campaign.id,
            multiplier_bps = campaign.multiplier_bps,
            "Campaign created"
        );
        Ok(campaign)
    }

    pub async fn list_campaigns(&self, ctx: &EngineContext) -> EngineResult<Vec<CommissionCampaign>> {
        Ok(self.db.campaigns().list(&ctx.tenant_id).await?)
    }

    pub async fn deactivate_campaign(&self, ctx: &EngineContext, id: &str) -> EngineResult<CommissionCampaign> {
        validate_id("campaign_id", id)?;
        require_actor(ctx)?;
        self.db.campaigns().deactivate(&ctx.tenant_id, id).await?;
        info!(tenant_id = %ctx.tenant_id, campaign_id = %id, "Campaign deactivated");
        self.db
            .campaigns()
            .get(&ctx.tenant_id, id)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionCampaign", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use chrono::NaiveDate;
    use tally_core::{AppliesTo, Role, RuleType, Tier, Trigger};

    fn new_rule(name: &str) -> NewCommissionRule {
        NewCommissionRule {
            owner_user_id: Some("tech-1".to_string()),
            name: name.to_string(),
            rule_type: RuleType::Percentage,
            value_hundredths: 1_000,
            applies_to: AppliesTo::All,
            calculation_type: CalculationType::PercentGross,
            applies_to_role: Some(Role::Technician),
            applies_when: Trigger::OsCompleted,
            tiers: Vec::new(),
            formula: None,
            source_filter: None,
            priority: 0,
            active: true,
        }
    }

    #[test]
    fn test_catalogue_lists_every_selectable_type() {
        let catalogue = calculation_types();
        assert_eq!(catalogue.len(), 11);
        assert!(catalogue.iter().all(|c| c.code != "unrecognized"));
        let fixed: Vec<&str> = catalogue.iter().filter(|c| c.fixed_amount).map(|c| c.code).collect();
        assert_eq!(fixed, vec!["fixed_per_os", "fixed_per_item"]);
    }

    #[tokio::test]
    async fn test_create_update_deactivate() {
        let engine = test_engine().await;

        let rule = engine.create_rule(&ctx(), &new_rule("  Tech 10%  ")).await.unwrap();
        assert_eq!(rule.name, "Tech 10%");

        let update = UpdateCommissionRule {
            calculation_type: Some(CalculationType::TieredGross),
            tiers: Some(vec![Tier { threshold_cents: 0, value_bps: 500 }]),
            priority: Some(5),
            ..Default::default()
        };
        let updated = engine.update_rule(&ctx(), &rule.id, &update).await.unwrap();
        assert_eq!(updated.calculation_type, CalculationType::TieredGross);
        assert_eq!(updated.priority, 5);
        assert_eq!(engine.get_rule(&ctx(), &rule.id).await.unwrap().tiers.len(), 1);

        let inactive = engine.deactivate_rule(&ctx(), &rule.id).await.unwrap();
        assert!(!inactive.active);
        assert!(engine.list_rules(&ctx(), false).await.unwrap().is_empty());
        assert_eq!(engine.list_rules(&ctx(), true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tiered_rule_without_tiers_is_rejected() {
        let engine = test_engine().await;
        let mut input = new_rule("Tiered");
        input.calculation_type = CalculationType::TieredGross;

        let err = engine.create_rule(&ctx(), &input).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_update_unknown_rule_is_not_found() {
        let engine = test_engine().await;
        let err = engine
            .update_rule(&ctx(), "missing", &UpdateCommissionRule::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_campaign_lifecycle() {
        let engine = test_engine().await;
        let input = NewCommissionCampaign {
            name: "Summer".to_string(),
            multiplier_bps: 15_000,
            applies_to_role: None,
            applies_to_calculation_type: None,
            starts_at: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            ends_at: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        };
        let campaign = engine.create_campaign(&ctx(), &input).await.unwrap();
        assert!(campaign.active);

        let off = engine.deactivate_campaign(&ctx(), &campaign.id).await.unwrap();
        assert!(!off.active);
        assert_eq!(engine.list_campaigns(&ctx()).await.unwrap().len(), 1);

        let backwards = NewCommissionCampaign {
            ends_at: NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
            ..input
        };
        let err = engine.create_campaign(&ctx(), &backwards).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
