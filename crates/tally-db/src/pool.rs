//! # Database Pool Management
//!
//! Opens the ledger database and hands out repositories.
//!
//! ## Connection Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tally-worker / seed / tests                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(DbConfig) ── file: WAL, busy_timeout, foreign_keys       │
//! │       │                  └─ :memory: one pinned connection              │
//! │       ▼                                                                 │
//! │  SqlitePool ─┬─ readers: any connection, never blocked by the writer    │
//! │              └─ writer:  one BEGIN … COMMIT at a time; other writers    │
//! │                          wait up to busy_timeout, then Busy (503)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  db.rules() / db.events() / db.splits() …  (repository handles)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The single-writer lock is what serialises two generation passes racing
//! for the same work order marker.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations::{self, MigrationStatus};
use crate::repository::campaign::CampaignRepository;
use crate::repository::contract::ContractRepository;
use crate::repository::dispute::DisputeRepository;
use crate::repository::event::EventRepository;
use crate::repository::goal::GoalRepository;
use crate::repository::outbox::OutboxRepository;
use crate::repository::recurring::RecurringRepository;
use crate::repository::release::ReleaseRepository;
use crate::repository::rule::RuleRepository;
use crate::repository::settlement::SettlementRepository;
use crate::repository::split::SplitRepository;
use crate::repository::work_order::WorkOrderRepository;

const IN_MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// How to open the ledger.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/tally/tally.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file; created on first open.
    pub database_path: PathBuf,

    /// Default 5. Only one of them writes at a time.
    pub max_connections: u32,

    /// Default 1.
    pub min_connections: u32,

    /// How long to wait for a free connection. Default 30s.
    pub connect_timeout: Duration,

    /// How long a transaction waits on another writer's lock. Default 5s.
    pub busy_timeout: Duration,

    /// Default 10 minutes.
    pub idle_timeout: Duration,

    /// Apply embedded migrations on open. Default true.
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// A private, migrated, throwaway ledger for tests.
    ///
    /// Everything shares one connection, so callers must not touch the
    /// pool while they hold an open transaction.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = if self.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.database_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        };
        Ok(options.foreign_keys(true).busy_timeout(self.busy_timeout))
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        if self.is_in_memory() {
            // The database disappears with its connection; never recycle it.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .acquire_timeout(self.connect_timeout)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(self.max_connections)
                .min_connections(self.min_connections)
                .acquire_timeout(self.connect_timeout)
                .idle_timeout(Some(self.idle_timeout))
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the ledger. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (and by default migrates) the ledger.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening ledger database");

        let options = config.connect_options()?;
        let pool = config
            .pool_options()
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        debug!(
            max_connections = config.max_connections,
            busy_timeout_ms = config.busy_timeout.as_millis() as u64,
            "Pool ready"
        );

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub async fn migration_status(&self) -> DbResult<MigrationStatus> {
        migrations::migration_status(&self.pool).await
    }

    /// For transactions (`pool().begin()`); plain reads go through repositories.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn rules(&self) -> RuleRepository {
        RuleRepository::new(self.pool.clone())
    }

    pub fn campaigns(&self) -> CampaignRepository {
        CampaignRepository::new(self.pool.clone())
    }

    pub fn events(&self) -> EventRepository {
        EventRepository::new(self.pool.clone())
    }

    pub fn disputes(&self) -> DisputeRepository {
        DisputeRepository::new(self.pool.clone())
    }

    pub fn settlements(&self) -> SettlementRepository {
        SettlementRepository::new(self.pool.clone())
    }

    pub fn goals(&self) -> GoalRepository {
        GoalRepository::new(self.pool.clone())
    }

    pub fn recurring(&self) -> RecurringRepository {
        RecurringRepository::new(self.pool.clone())
    }

    pub fn releases(&self) -> ReleaseRepository {
        ReleaseRepository::new(self.pool.clone())
    }

    pub fn splits(&self) -> SplitRepository {
        SplitRepository::new(self.pool.clone())
    }

    /// Work orders, their lines, technicians and expenses.
    pub fn work_orders(&self) -> WorkOrderRepository {
        WorkOrderRepository::new(self.pool.clone())
    }

    pub fn contracts(&self) -> ContractRepository {
        ContractRepository::new(self.pool.clone())
    }

    pub fn outbox(&self) -> OutboxRepository {
        OutboxRepository::new(self.pool.clone())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Ledger database closed");
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let status = db.migration_status().await.unwrap();
        assert!(status.embedded > 0);
        assert!(status.is_current());
    }

    #[tokio::test]
    async fn test_unmigrated_database_reports_pending() {
        let db = Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap();

        let status = db.migration_status().await.unwrap();
        assert_eq!(status.applied, 0);
        assert!(!status.is_current());

        db.run_migrations().await.unwrap();
        assert!(db.migration_status().await.unwrap().is_current());
    }

    #[tokio::test]
    async fn test_foreign_keys_are_enforced() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/tally-test.db")
            .max_connections(10)
            .min_connections(2)
            .busy_timeout(Duration::from_secs(1));

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }
}
