//! # Campaign Repository

use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::CommissionCampaign;

#[derive(Debug, Clone)]
pub struct CampaignRepository {
    pool: SqlitePool,
}

impl CampaignRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CampaignRepository { pool }
    }

    pub async fn insert(&self, campaign: &CommissionCampaign) -> DbResult<()> {
        debug!(campaign_id = %campaign.id, name = %campaign.name, "Inserting campaign");

        sqlx::query(
            r#"
            INSERT INTO commission_campaigns (
                id, tenant_id, name, multiplier_bps, applies_to_role,
                applies_to_calculation_type, starts_at, ends_at, active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&campaign.id)
        .bind(&campaign.tenant_id)
        .bind(&campaign.name)
        .bind(campaign.multiplier_bps)
        .bind(campaign.applies_to_role)
        .bind(campaign.applies_to_calculation_type)
        .bind(campaign.starts_at)
        .bind(campaign.ends_at)
        .bind(campaign.active)
        .bind(campaign.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, tenant_id: &str, id: &str) -> DbResult<Option<CommissionCampaign>> {
        let campaign = sqlx::query_as::<_, CommissionCampaign>(
            "SELECT * FROM commission_campaigns WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(campaign)
    }

    pub async fn list(&self, tenant_id: &str) -> DbResult<Vec<CommissionCampaign>> {
        let campaigns = sqlx::query_as::<_, CommissionCampaign>(
            "SELECT * FROM commission_campaigns WHERE tenant_id = ?1 ORDER BY starts_at DESC, name ASC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(campaigns)
    }

    /// Active campaigns whose inclusive window contains `date`, oldest first.
    pub async fn running_on(&self, tenant_id: &str, date: NaiveDate) -> DbResult<Vec<CommissionCampaign>> {
        let campaigns = sqlx::query_as::<_, CommissionCampaign>(
            r#"
            SELECT * FROM commission_campaigns
            WHERE tenant_id = ?1
              AND active = 1
              AND starts_at <= ?2
              AND ends_at >= ?2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(campaigns)
    }

    pub async fn deactivate(&self, tenant_id: &str, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE commission_campaigns SET active = 0 WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CommissionCampaign", id));
        }
        Ok(())
    }
}
