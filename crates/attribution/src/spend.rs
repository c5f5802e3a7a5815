//! Daily campaign spend per organization, used by the temporal-correlation
//! tier to answer "which campaign was spending on this date".

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use fundlens_core::types::AdDeliveryMetric;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One campaign's spend on one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignDaySpend {
    pub campaign_id: String,
    pub channel: String,
    pub spend: f64,
}

/// Campaigns with positive spend, indexed by `(organization, date)` and
/// ordered by descending spend then ascending campaign id.
#[derive(Debug, Clone, Default)]
pub struct ActiveSpendIndex {
    days: HashMap<(Uuid, NaiveDate), Vec<CampaignDaySpend>>,
}

impl ActiveSpendIndex {
    pub fn from_delivery(delivery: &[AdDeliveryMetric]) -> Self {
        // (org, date) -> campaign -> (channel, spend)
        let mut totals: BTreeMap<(Uuid, NaiveDate), BTreeMap<&str, (&str, f64)>> = BTreeMap::new();
        for row in delivery {
            let entry = totals
                .entry((row.organization_id, row.date))
                .or_default()
                .entry(row.campaign_id.as_str())
                .or_insert((row.channel.as_str(), 0.0));
            // A campaign reporting several channels keeps the smallest name.
            if row.channel.as_str() < entry.0 {
                entry.0 = row.channel.as_str();
            }
            entry.1 += row.spend;
        }

        let days = totals
            .into_iter()
            .filter_map(|(key, campaigns)| {
                let mut active: Vec<CampaignDaySpend> = campaigns
                    .into_iter()
                    .filter(|(_, (_, spend))| *spend > 0.0)
                    .map(|(campaign_id, (channel, spend))| CampaignDaySpend {
                        campaign_id: campaign_id.to_string(),
                        channel: channel.to_string(),
                        spend,
                    })
                    .collect();
                if active.is_empty() {
                    return None;
                }
                active.sort_by(|a, b| {
                    b.spend
                        .total_cmp(&a.spend)
                        .then_with(|| a.campaign_id.cmp(&b.campaign_id))
                });
                Some((key, active))
            })
            .collect();

        Self { days }
    }

    /// Highest-spend campaign active for the organization on `date`.
    pub fn top_campaign(
        &self,
        organization_id: Uuid,
        date: NaiveDate,
    ) -> Option<&CampaignDaySpend> {
        self.days.get(&(organization_id, date))?.first()
    }

    pub fn active_campaigns(&self, organization_id: Uuid, date: NaiveDate) -> &[CampaignDaySpend] {
        self.days
            .get(&(organization_id, date))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
