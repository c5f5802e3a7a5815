//! Batch attribution: fans the resolver out over a set of donations for
//! backfills and dashboards.

use std::collections::BTreeMap;

use fundlens_core::precision;
use fundlens_core::types::{AttributionResult, ConfidenceTier, DonationEvent};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::resolver::AttributionResolver;

/// Donations and revenue that resolved to one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierBreakdown {
    pub tier: ConfidenceTier,
    pub events: usize,
    pub revenue: f64,
}

/// Donations and revenue that resolved to one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelBreakdown {
    pub channel: String,
    pub events: usize,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionSummary {
    pub total_events: usize,
    pub attributed_events: usize,
    pub attribution_rate: f64,
    pub total_revenue: f64,
    pub attributed_revenue: f64,
    pub by_tier: Vec<TierBreakdown>,
    pub by_channel: Vec<ChannelBreakdown>,
}

/// Results in input order plus their summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAttribution {
    pub results: Vec<AttributionResult>,
    pub summary: AttributionSummary,
}

pub struct BatchAttributionRunner<'a> {
    resolver: AttributionResolver<'a>,
}

impl<'a> BatchAttributionRunner<'a> {
    pub fn new(resolver: AttributionResolver<'a>) -> Self {
        Self { resolver }
    }

    /// Resolve every event independently. Events share no state, so the
    /// output for each one does not depend on batch order or size.
    pub fn run(&self, events: &[DonationEvent]) -> BatchAttribution {
        let results: Vec<AttributionResult> = events
            .par_iter()
            .map(|event| self.resolver.resolve(event))
            .collect();

        let summary = summarize(events, &results);
        for tier in &summary.by_tier {
            metrics::counter!("attribution.resolved", "tier" => tier.tier.as_str())
                .increment(tier.events as u64);
        }
        info!(
            events = summary.total_events,
            attributed = summary.attributed_events,
            attribution_rate = summary.attribution_rate,
            "Batch attribution complete"
        );

        BatchAttribution { results, summary }
    }
}

/// `events` and `results` are index-aligned.
pub fn summarize(events: &[DonationEvent], results: &[AttributionResult]) -> AttributionSummary {
    let mut tiers: BTreeMap<ConfidenceTier, (usize, f64)> = BTreeMap::new();
    let mut channels: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    let mut total_revenue = 0.0;
    let mut attributed_events = 0;
    let mut attributed_revenue = 0.0;

    for (event, result) in events.iter().zip(results) {
        total_revenue += event.amount;
        let tier = tiers.entry(result.confidence_tier).or_insert((0, 0.0));
        tier.0 += 1;
        tier.1 += event.amount;
        let channel = channels.entry(result.channel.as_str()).or_insert((0, 0.0));
        channel.0 += 1;
        channel.1 += event.amount;
        if result.is_attributed() {
            attributed_events += 1;
            attributed_revenue += event.amount;
        }
    }

    let by_tier = ConfidenceTier::ALL
        .iter()
        .map(|tier| {
            let (events, revenue) = tiers.get(tier).copied().unwrap_or((0, 0.0));
            TierBreakdown {
                tier: *tier,
                events,
                revenue: precision::currency(revenue),
            }
        })
        .collect();

    let mut by_channel: Vec<ChannelBreakdown> = channels
        .into_iter()
        .map(|(channel, (events, revenue))| ChannelBreakdown {
            channel: channel.to_string(),
            events,
            revenue: precision::currency(revenue),
        })
        .collect();
    by_channel.sort_by(|a, b| {
        b.revenue
            .total_cmp(&a.revenue)
            .then_with(|| a.channel.cmp(&b.channel))
    });

    let total_events = results.len();
    AttributionSummary {
        total_events,
        attributed_events,
        attribution_rate: if total_events > 0 {
            precision::ratio(attributed_events as f64 / total_events as f64)
        } else {
            0.0
        },
        total_revenue: precision::currency(total_revenue),
        attributed_revenue: precision::currency(attributed_revenue),
        by_tier,
        by_channel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleStore;
    use crate::spend::ActiveSpendIndex;
    use chrono::Utc;
    use fundlens_core::config::AttributionConfig;
    use fundlens_core::types::{AttributionRule, PatternKind, RuleScope};
    use uuid::Uuid;

    fn event(code: &str, amount: f64) -> DonationEvent {
        DonationEvent {
            id: Uuid::new_v4(),
            organization_id: Uuid::nil(),
            occurred_at: Utc::now(),
            amount,
            tracking_code: Some(code.to_string()),
            click_id: None,
            secondary_click_id: None,
        }
    }

    #[test]
    fn test_batch_preserves_order_and_summarizes() {
        let rules = RuleStore::new(
            vec![AttributionRule {
                id: Uuid::new_v4(),
                name: "sms".to_string(),
                scope: RuleScope::Global,
                pattern: "sms_".to_string(),
                pattern_kind: PatternKind::Prefix,
                channel: "sms".to_string(),
                confidence: 0.9,
                priority: 1,
                active: true,
            }],
            vec![],
        )
        .unwrap();
        let spend = ActiveSpendIndex::default();
        let config = AttributionConfig::default();
        let runner = BatchAttributionRunner::new(AttributionResolver::new(&rules, &spend, &config));

        let events = vec![
            event("sms_gotv", 25.0),
            event("mystery", 10.0),
            event("sms_match", 15.0),
        ];
        let batch = runner.run(&events);

        let ids: Vec<Uuid> = batch.results.iter().map(|r| r.event_id).collect();
        let expected: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, expected);

        assert_eq!(batch.summary.total_events, 3);
        assert_eq!(batch.summary.attributed_events, 2);
        assert!((batch.summary.attributed_revenue - 40.0).abs() < f64::EPSILON);
        assert!((batch.summary.attribution_rate - 0.6667).abs() < 1e-9);
        assert_eq!(batch.summary.by_tier.len(), 5);
        assert_eq!(batch.summary.by_channel[0].channel, "sms");
    }

    #[test]
    fn test_payload_uses_snake_case_labels() {
        let id = Uuid::new_v4();
        let result = AttributionResult::unattributed(id);
        let json = serde_json::to_value(summarize(&[event("x", 5.0)], &[result])).unwrap();
        assert_eq!(json["by_tier"][0]["tier"], "deterministic");
        assert_eq!(json["by_tier"][4]["tier"], "none");
        assert_eq!(json["by_channel"][0]["channel"], "unattributed");
    }

    #[test]
    fn test_empty_batch() {
        let summary = summarize(&[], &[]);
        assert_eq!(summary.total_events, 0);
        assert_eq!(summary.attribution_rate, 0.0);
    }
}
