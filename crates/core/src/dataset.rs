//! Collaborator query results for one invocation.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::FundlensResult;
use crate::types::{AdDeliveryMetric, AttributionRule, CodeMapping, CreativeRecord, DonationEvent};

/// Everything the engine reads for one invocation. Read-only for the
/// duration of a call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub events: Vec<DonationEvent>,
    #[serde(default)]
    pub rules: Vec<AttributionRule>,
    #[serde(default)]
    pub mappings: Vec<CodeMapping>,
    #[serde(default)]
    pub delivery: Vec<AdDeliveryMetric>,
    #[serde(default)]
    pub creatives: Vec<CreativeRecord>,
}

impl Dataset {
    pub fn from_json(raw: &str) -> FundlensResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Restrict organization-owned rows to one organization. Global rules
    /// are kept; other organizations' rules are dropped so their errors
    /// cannot fail this organization's run.
    pub fn for_organization(&self, organization_id: Uuid) -> Self {
        let scoped = Self {
            events: self
                .events
                .iter()
                .filter(|e| e.organization_id == organization_id)
                .cloned()
                .collect(),
            rules: self
                .rules
                .iter()
                .filter(|r| r.scope.covers(organization_id))
                .cloned()
                .collect(),
            mappings: self
                .mappings
                .iter()
                .filter(|m| m.organization_id == organization_id)
                .cloned()
                .collect(),
            delivery: self
                .delivery
                .iter()
                .filter(|d| d.organization_id == organization_id)
                .cloned()
                .collect(),
            creatives: self
                .creatives
                .iter()
                .filter(|c| c.organization_id == organization_id)
                .cloned()
                .collect(),
        };
        debug!(
            %organization_id,
            events = scoped.events.len(),
            rules = scoped.rules.len(),
            mappings = scoped.mappings.len(),
            delivery_rows = scoped.delivery.len(),
            creatives = scoped.creatives.len(),
            "Scoped dataset to organization"
        );
        scoped
    }
}
