//! Engine behaviour switches.
//!
//! Loaded by the worker from `tally.toml` / `TALLY_ENGINE__*` and handed to
//! the engine at construction.

use serde::{Deserialize, Serialize};

/// How simultaneously active campaigns combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignComposition {
    /// 1.5× and 1.2× give 1.8×.
    #[default]
    Multiply,
    /// 1.5× and 1.2× give 1.5×.
    Highest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub campaign_composition: CampaignComposition,

    /// Divide each technician's commission by the number of technicians on
    /// the work order. On by default.
    pub split_technician_commissions: bool,

    /// Do not pay a seller commission to a user who is also a technician on
    /// the same work order. On by default.
    pub block_seller_when_technician: bool,

    /// Warranty work orders generate no commissions.
    pub skip_warranty_orders: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            campaign_composition: CampaignComposition::Multiply,
            split_technician_commissions: true,
            block_seller_when_technician: true,
            skip_warranty_orders: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"campaign_composition":"highest"}"#).unwrap();
        assert_eq!(cfg.campaign_composition, CampaignComposition::Highest);
        assert!(cfg.skip_warranty_orders);
        assert!(cfg.split_technician_commissions);
        assert!(cfg.block_seller_when_technician);
    }
}
