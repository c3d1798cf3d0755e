//! Worker configuration.
//!
//! Loaded from an optional TOML file overlaid by `TALLY_*` environment
//! variables. Nested keys use a double underscore:
//!
//! ```text
//! TALLY_DATABASE_PATH=/var/lib/tally/tally.db
//! TALLY_ENGINE__CAMPAIGN_COMPOSITION=highest
//! ```

use std::path::Path;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use tally_core::EngineConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// SQLite database file
    pub database_path: String,

    /// Pool size
    pub max_connections: u32,

    /// Default filter when RUST_LOG is unset
    pub log_level: String,

    pub engine: EngineConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            database_path: "tally.db".to_string(),
            max_connections: 5,
            log_level: "info".to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Reads `path` (if it exists) and the environment.
    pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
        let builder = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("TALLY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, config::ConfigError> {
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use tally_core::CampaignComposition;

    fn from_toml(toml: &str) -> WorkerConfig {
        let builder = Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        WorkerConfig::build(builder).unwrap()
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        assert_eq!(from_toml("max_connections = 5"), WorkerConfig::default());
    }

    #[test]
    fn test_engine_table_overrides() {
        let cfg = from_toml(
            r#"
            database_path = "/tmp/ledger.db"

            [engine]
            campaign_composition = "highest"
            split_technician_commissions = true
            "#,
        );

        assert_eq!(cfg.database_path, "/tmp/ledger.db");
        assert_eq!(cfg.max_connections, 5);
        assert_eq!(cfg.engine.campaign_composition, CampaignComposition::Highest);
        assert!(cfg.engine.split_technician_commissions);
        assert!(cfg.engine.skip_warranty_orders);
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let cfg = WorkerConfig::load(Path::new("/nonexistent/tally.toml")).unwrap();
        assert_eq!(cfg.max_connections, WorkerConfig::default().max_connections);
    }
}
