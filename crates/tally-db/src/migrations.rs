//! Embedded schema migrations.
//!
//! The SQL lives in `migrations/sqlite/` at the workspace root and is
//! compiled into the binary, so the worker and the seed tool never need the
//! files at runtime. Applied versions are tracked in `_sqlx_migrations`.
//!
//! New schema changes go in a new `NNN_description.sql` file; applied files
//! are checksummed and must not be edited.

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Where the schema stands relative to the embedded migrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub embedded: usize,
    pub applied: usize,
}

impl MigrationStatus {
    pub fn is_current(&self) -> bool {
        self.applied >= self.embedded
    }
}

/// Applies pending migrations. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    debug!(embedded = MIGRATOR.migrations.len(), "Applying migrations");
    MIGRATOR.run(pool).await?;
    info!("Schema is up to date");
    Ok(())
}

pub async fn migration_status(pool: &SqlitePool) -> DbResult<MigrationStatus> {
    let has_table: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;

    let applied: i64 = if has_table > 0 {
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?
    } else {
        0
    };

    Ok(MigrationStatus {
        embedded: MIGRATOR.migrations.len(),
        applied: applied as usize,
    })
}
