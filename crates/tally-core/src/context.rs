//! The explicit caller context threaded through every engine call.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::period::Period;

/// Who is calling, for which tenant, and what day it is.
///
/// The engine never looks up a "current user" or reads the wall clock for a
/// business decision; everything comes from here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineContext {
    pub tenant_id: String,
    /// None for scheduled runs.
    pub actor_id: Option<String>,
    /// Elevated privilege: may approve own commissions, resolve any dispute.
    pub privileged: bool,
    pub today: NaiveDate,
}

impl EngineContext {
    pub fn new(tenant_id: impl Into<String>, today: NaiveDate) -> Self {
        EngineContext {
            tenant_id: tenant_id.into(),
            actor_id: None,
            privileged: false,
            today,
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub fn current_period(&self) -> Period {
        Period::from_date(self.today)
    }

    /// Actor id for audit columns; scheduled runs record `system`.
    pub fn actor_or_system(&self) -> &str {
        self.actor_id.as_deref().unwrap_or("system")
    }
}
