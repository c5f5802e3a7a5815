//! Joins attributed revenue with ad delivery per creative over a date
//! window.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use fundlens_core::config::AnalysisConfig;
use fundlens_core::precision;
use fundlens_core::types::{
    AdDeliveryMetric, AttributionResult, CreativeRecord, DateWindow, DonationEvent,
    QualitativeTags,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a creative's delivery totals came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSource {
    /// Daily delivery history within the window.
    Delivery,
    /// Lifetime totals stored on the creative record.
    Snapshot,
    /// Neither history nor snapshot exists.
    Missing,
}

/// One day of delivery for one creative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyMetric {
    pub date: NaiveDate,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
}

impl DailyMetric {
    pub fn ctr(&self) -> f64 {
        ratio_or_zero(self.clicks as f64, self.impressions as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreativePerformance {
    pub creative_id: String,
    pub ad_id: String,
    pub total_impressions: u64,
    pub total_clicks: u64,
    pub total_spend: f64,
    pub total_revenue: f64,
    pub click_through_rate: f64,
    pub return_on_spend: f64,
    pub days_with_data: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub metric_source: MetricSource,
    /// Completed video views over impressions, when the ad reports video progress.
    pub video_completion_rate: Option<f64>,
}

/// A creative's performance plus what the downstream engines need.
#[derive(Debug, Clone, PartialEq)]
pub struct CreativeAnalysis {
    pub performance: CreativePerformance,
    /// Date-ordered delivery inside the window; empty for snapshot rows.
    pub daily: Vec<DailyMetric>,
    pub tags: QualitativeTags,
    pub analysis_confidence: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct AggregationOutcome {
    /// Creatives meeting the impression floor, ordered by creative id.
    pub qualifying: Vec<CreativeAnalysis>,
    pub creatives_considered: usize,
    pub low_volume: Vec<String>,
    pub snapshot_fallbacks: Vec<String>,
    pub without_delivery: Vec<String>,
    /// No creative had any delivery row inside the window.
    pub no_delivery_data: bool,
    /// Revenue that landed on some creative, inside the window.
    pub creative_revenue: f64,
}

pub struct PerformanceAggregator<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> PerformanceAggregator<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn aggregate(
        &self,
        window: &DateWindow,
        creatives: &[CreativeRecord],
        delivery: &[AdDeliveryMetric],
        events: &[DonationEvent],
        results: &[AttributionResult],
    ) -> AggregationOutcome {
        let owners = ad_owners(creatives);
        let revenue = attributed_revenue(window, creatives, &owners, events, results);
        let daily_by_ad = daily_delivery(window, delivery);

        let mut analyses: Vec<CreativeAnalysis> = creatives
            .par_iter()
            .map(|creative| {
                let owns_ad = owners.get(creative.ad_id.as_str()).copied()
                    == Some(creative.creative_id.as_str());
                let daily = if owns_ad {
                    daily_by_ad.get(creative.ad_id.as_str())
                } else {
                    debug!(
                        creative_id = %creative.creative_id,
                        ad_id = %creative.ad_id,
                        "Ad delivery credited to another creative on the same ad"
                    );
                    None
                };
                let revenue = revenue.get(creative.creative_id.as_str()).copied().unwrap_or(0.0);
                build_analysis(creative, daily, revenue)
            })
            .collect();
        analyses.sort_by(|a, b| a.performance.creative_id.cmp(&b.performance.creative_id));

        let mut outcome = AggregationOutcome {
            creatives_considered: analyses.len(),
            creative_revenue: precision::currency(revenue.values().sum()),
            ..Default::default()
        };

        for analysis in analyses {
            let perf = &analysis.performance;
            match perf.metric_source {
                MetricSource::Snapshot => {
                    warn!(
                        creative_id = %perf.creative_id,
                        "No delivery history in window, using snapshot totals"
                    );
                    outcome.snapshot_fallbacks.push(perf.creative_id.clone());
                }
                MetricSource::Missing => {
                    outcome.without_delivery.push(perf.creative_id.clone());
                }
                MetricSource::Delivery => {}
            }

            if perf.total_impressions >= self.config.min_impressions {
                outcome.qualifying.push(analysis);
            } else {
                debug!(
                    creative_id = %perf.creative_id,
                    impressions = perf.total_impressions,
                    "Creative below impression floor"
                );
                outcome.low_volume.push(analysis.performance.creative_id);
            }
        }

        outcome.no_delivery_data = outcome.creatives_considered > 0
            && outcome.snapshot_fallbacks.len() + outcome.without_delivery.len()
                == outcome.creatives_considered;
        if outcome.no_delivery_data {
            warn!(
                window_start = %window.start,
                window_end = %window.end,
                "No delivery data for any creative in window"
            );
        }
        metrics::counter!("analytics.creatives_excluded", "reason" => "low_volume")
            .increment(outcome.low_volume.len() as u64);

        info!(
            considered = outcome.creatives_considered,
            qualifying = outcome.qualifying.len(),
            low_volume = outcome.low_volume.len(),
            snapshot_fallbacks = outcome.snapshot_fallbacks.len(),
            "Performance aggregation complete"
        );
        outcome
    }
}

/// The creative that owns each ad's delivery and ad-level revenue: the
/// smallest creative id running that ad.
fn ad_owners(creatives: &[CreativeRecord]) -> HashMap<&str, &str> {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for creative in creatives {
        owners
            .entry(creative.ad_id.as_str())
            .and_modify(|existing| {
                if creative.creative_id.as_str() < *existing {
                    *existing = creative.creative_id.as_str();
                }
            })
            .or_insert(creative.creative_id.as_str());
    }
    owners
}

/// Revenue per creative id from donations inside the window. A result
/// naming a creative credits it directly; one naming only an ad credits the
/// ad's owner.
fn attributed_revenue<'c>(
    window: &DateWindow,
    creatives: &'c [CreativeRecord],
    creative_by_ad: &HashMap<&str, &'c str>,
    events: &[DonationEvent],
    results: &[AttributionResult],
) -> HashMap<&'c str, f64> {
    let known: HashMap<&str, &'c str> = creatives
        .iter()
        .map(|c| (c.creative_id.as_str(), c.creative_id.as_str()))
        .collect();

    let events_by_id: HashMap<Uuid, &DonationEvent> = events.iter().map(|e| (e.id, e)).collect();
    let mut revenue: HashMap<&'c str, f64> = HashMap::new();
    for result in results {
        let Some(event) = events_by_id.get(&result.event_id) else {
            continue;
        };
        if !window.contains(event.occurred_on()) {
            continue;
        }
        let target = result
            .matched_creative_id
            .as_deref()
            .and_then(|id| known.get(id).copied())
            .or_else(|| {
                result
                    .matched_ad_id
                    .as_deref()
                    .and_then(|ad| creative_by_ad.get(ad).copied())
            });
        if let Some(creative_id) = target {
            *revenue.entry(creative_id).or_insert(0.0) += event.amount;
        }
    }
    revenue
}

struct AdDay {
    metric: DailyMetric,
    video_completions: Option<u64>,
}

/// Window-filtered delivery per ad, one entry per date.
fn daily_delivery<'d>(
    window: &DateWindow,
    delivery: &'d [AdDeliveryMetric],
) -> HashMap<&'d str, Vec<AdDay>> {
    let mut grouped: HashMap<&str, BTreeMap<NaiveDate, AdDay>> = HashMap::new();
    for row in delivery.iter().filter(|r| window.contains(r.date)) {
        let day = grouped
            .entry(row.ad_id.as_str())
            .or_default()
            .entry(row.date)
            .or_insert(AdDay {
                metric: DailyMetric {
                    date: row.date,
                    impressions: 0,
                    clicks: 0,
                    spend: 0.0,
                },
                video_completions: None,
            });
        day.metric.impressions += row.impressions;
        day.metric.clicks += row.clicks;
        day.metric.spend += row.spend;
        if let Some(video) = row.video_progress {
            *day.video_completions.get_or_insert(0) += video.p100;
        }
    }
    grouped
        .into_iter()
        .map(|(ad, days)| (ad, days.into_values().collect()))
        .collect()
}

fn build_analysis(
    creative: &CreativeRecord,
    daily: Option<&Vec<AdDay>>,
    revenue: f64,
) -> CreativeAnalysis {
    let (impressions, clicks, spend, source, series, video) = match daily {
        Some(days) if !days.is_empty() => {
            let series: Vec<DailyMetric> = days.iter().map(|d| d.metric).collect();
            let video = days
                .iter()
                .filter_map(|d| d.video_completions)
                .reduce(|a, b| a + b);
            (
                series.iter().map(|d| d.impressions).sum(),
                series.iter().map(|d| d.clicks).sum(),
                series.iter().map(|d| d.spend).sum(),
                MetricSource::Delivery,
                series,
                video,
            )
        }
        _ => match creative.snapshot {
            Some(s) => (
                s.impressions,
                s.clicks,
                s.spend,
                MetricSource::Snapshot,
                Vec::new(),
                None,
            ),
            None => (0, 0, 0.0, MetricSource::Missing, Vec::new(), None),
        },
    };

    let performance = CreativePerformance {
        creative_id: creative.creative_id.clone(),
        ad_id: creative.ad_id.clone(),
        total_impressions: impressions,
        total_clicks: clicks,
        total_spend: precision::currency(spend),
        total_revenue: precision::currency(revenue),
        click_through_rate: precision::ratio(ratio_or_zero(clicks as f64, impressions as f64)),
        return_on_spend: precision::ratio(ratio_or_zero(revenue, spend)),
        days_with_data: series.len(),
        first_date: series.first().map(|d| d.date),
        last_date: series.last().map(|d| d.date),
        metric_source: source,
        video_completion_rate: video
            .map(|v| precision::ratio(ratio_or_zero(v as f64, impressions as f64))),
    };

    CreativeAnalysis {
        performance,
        daily: series,
        tags: creative.tags.clone(),
        analysis_confidence: creative.analysis_confidence,
    }
}

pub(crate) fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
