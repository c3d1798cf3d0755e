//! # Recurring Contract Repository
//!
//! Read access to recurring contracts; `insert` is for seeding and tests.

use sqlx::SqlitePool;

use crate::error::DbResult;
use tally_core::RecurringContract;

#[derive(Debug, Clone)]
pub struct ContractRepository {
    pool: SqlitePool,
}

impl ContractRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ContractRepository { pool }
    }

    pub async fn get(&self, tenant_id: &str, id: &str) -> DbResult<Option<RecurringContract>> {
        let contract = sqlx::query_as::<_, RecurringContract>(
            "SELECT * FROM recurring_contracts WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(contract)
    }

    pub async fn insert(&self, contract: &RecurringContract) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recurring_contracts (
                id, tenant_id, name, is_active, monthly_value_cents, total_value_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&contract.id)
        .bind(&contract.tenant_id)
        .bind(&contract.name)
        .bind(contract.is_active)
        .bind(contract.monthly_value_cents)
        .bind(contract.total_value_cents)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
