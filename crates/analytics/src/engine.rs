//! One invocation from raw dataset to report.
//!
//! Order is strict: resolve → aggregate → {significance, leading
//! indicators, fatigue} → recommendations. The three middle engines only
//! read the aggregation output, so they run concurrently.

use std::collections::BTreeMap;

use fundlens_attribution::{
    ActiveSpendIndex, AttributionResolver, AttributionSummary, BatchAttribution,
    BatchAttributionRunner, RuleStore,
};
use fundlens_core::config::{AnalysisConfig, AttributionConfig};
use fundlens_core::precision;
use fundlens_core::types::{DateWindow, DonationEvent};
use fundlens_core::{Dataset, FundlensResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::fatigue::{FatigueAssessment, FatigueDetector, FatigueReport};
use crate::leading::{IndicatorCorrelation, LeadingIndicatorEngine, LeadingIndicatorReport};
use crate::performance::{AggregationOutcome, PerformanceAggregator};
use crate::recommend::{CreativeRecommendation, Recommendation, RecommendationSynthesizer};
use crate::significance::{ExcludedGroup, GroupPerformance, SignificanceEngine, SignificanceReport};

/// Qualifying creatives needed before the tables are considered reliable.
const ADEQUATE_SAMPLE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub organization_id: Uuid,
    pub window: DateWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleAdequacy {
    Adequate,
    Limited,
    Insufficient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub donations: usize,
    pub total_revenue: f64,
    pub attributed_revenue: f64,
    /// Revenue credited to a creative of this organization.
    pub creative_revenue: f64,
    pub creatives_analyzed: usize,
    pub total_impressions: u64,
    pub total_spend: f64,
    pub overall_return_on_spend: f64,
    pub significant_groups: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub creatives_considered: usize,
    pub creatives_qualifying: usize,
    pub low_volume_creatives: Vec<String>,
    pub snapshot_fallbacks: Vec<String>,
    pub creatives_without_delivery: Vec<String>,
    pub no_delivery_data: bool,
    pub excluded_groups: Vec<ExcludedGroup>,
    pub leading_indicator_sample: usize,
    pub leading_indicator_short_history: Vec<String>,
    pub leading_indicator_low_early_volume: Vec<String>,
    pub fatigue_insufficient_history: Vec<String>,
    pub sample_adequacy: SampleAdequacy,
    pub warnings: Vec<String>,
}

/// Everything one analysis run reports. Contains no timestamps, so the
/// same inputs always serialize identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub organization_id: Uuid,
    pub window: DateWindow,
    pub summary: ReportSummary,
    pub attribution: AttributionSummary,
    pub significance: Vec<GroupPerformance>,
    pub leading_indicators: Vec<IndicatorCorrelation>,
    pub fatigue_alerts: Vec<FatigueAssessment>,
    pub recommendations: Vec<CreativeRecommendation>,
    pub recommendation_counts: BTreeMap<Recommendation, usize>,
    pub data_quality: DataQuality,
}

pub struct AnalysisEngine<'a> {
    attribution: &'a AttributionConfig,
    analysis: &'a AnalysisConfig,
}

impl<'a> AnalysisEngine<'a> {
    pub fn new(attribution: &'a AttributionConfig, analysis: &'a AnalysisConfig) -> Self {
        Self {
            attribution,
            analysis,
        }
    }

    /// Resolve every donation in `dataset` without running the analysis.
    pub fn attribute(&self, dataset: &Dataset) -> FundlensResult<BatchAttribution> {
        self.attribution.validate()?;
        let rules = RuleStore::new(dataset.rules.clone(), dataset.mappings.clone())?;
        let spend = ActiveSpendIndex::from_delivery(&dataset.delivery);
        let resolver = AttributionResolver::new(&rules, &spend, self.attribution);
        Ok(BatchAttributionRunner::new(resolver).run(&dataset.events))
    }

    pub fn run(
        &self,
        request: &AnalysisRequest,
        dataset: &Dataset,
    ) -> FundlensResult<AnalysisReport> {
        request.window.validate()?;
        self.attribution.validate()?;
        self.analysis.validate()?;

        let scoped = dataset.for_organization(request.organization_id);
        let rules = RuleStore::new(scoped.rules, scoped.mappings)?;
        let spend = ActiveSpendIndex::from_delivery(&scoped.delivery);
        info!(
            organization_id = %request.organization_id,
            window_start = %request.window.start,
            window_end = %request.window.end,
            rules = rules.rule_count(),
            mappings = rules.mapping_count(),
            "Starting analysis"
        );

        let events: Vec<DonationEvent> = scoped
            .events
            .into_iter()
            .filter(|e| request.window.contains(e.occurred_on()))
            .collect();
        let resolver = AttributionResolver::new(&rules, &spend, self.attribution);
        let batch = BatchAttributionRunner::new(resolver).run(&events);

        let outcome = PerformanceAggregator::new(self.analysis).aggregate(
            &request.window,
            &scoped.creatives,
            &scoped.delivery,
            &events,
            &batch.results,
        );

        let creatives = outcome.qualifying.as_slice();
        let (significance, (leading, fatigue)) = rayon::join(
            || SignificanceEngine::new(self.analysis).analyze(creatives),
            || {
                rayon::join(
                    || LeadingIndicatorEngine::new(self.analysis).analyze(creatives),
                    || FatigueDetector::new(self.analysis).analyze(creatives),
                )
            },
        );
        let recommendations = RecommendationSynthesizer::new(self.analysis).synthesize(
            creatives,
            &significance,
            &fatigue,
        );

        metrics::counter!("analytics.runs").increment(1);
        let report = self.assemble(
            request,
            batch.summary,
            outcome,
            significance,
            leading,
            fatigue,
            recommendations,
        );
        info!(
            creatives = report.summary.creatives_analyzed,
            significant_groups = report.summary.significant_groups,
            fatigue_alerts = report.fatigue_alerts.len(),
            adequacy = ?report.data_quality.sample_adequacy,
            "Analysis complete"
        );
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        request: &AnalysisRequest,
        attribution: AttributionSummary,
        outcome: AggregationOutcome,
        significance: SignificanceReport,
        leading: LeadingIndicatorReport,
        fatigue: FatigueReport,
        recommendations: Vec<CreativeRecommendation>,
    ) -> AnalysisReport {
        let analyzed = &outcome.qualifying;
        let total_impressions: u64 = analyzed
            .iter()
            .map(|c| c.performance.total_impressions)
            .sum();
        let total_spend: f64 = analyzed.iter().map(|c| c.performance.total_spend).sum();
        let qualifying_revenue: f64 = analyzed
            .iter()
            .map(|c| c.performance.total_revenue)
            .sum();
        let overall_return_on_spend = if total_spend > 0.0 {
            qualifying_revenue / total_spend
        } else {
            0.0
        };

        let mut recommendation_counts: BTreeMap<Recommendation, usize> =
            Recommendation::ALL.iter().map(|r| (*r, 0)).collect();
        for rec in &recommendations {
            *recommendation_counts.entry(rec.recommendation).or_insert(0) += 1;
        }

        let qualifying = outcome.qualifying.len();
        let sample_adequacy = if qualifying >= ADEQUATE_SAMPLE {
            SampleAdequacy::Adequate
        } else if qualifying >= self.analysis.min_group_size {
            SampleAdequacy::Limited
        } else {
            SampleAdequacy::Insufficient
        };

        let mut warnings = Vec::new();
        if attribution.total_events == 0 {
            warnings.push("No donations fall inside the analysis window.".to_string());
        }
        if outcome.no_delivery_data {
            warnings.push(
                "No delivery data for the window; performance uses creative snapshots where \
                 available."
                    .to_string(),
            );
        }
        match sample_adequacy {
            SampleAdequacy::Adequate => {}
            SampleAdequacy::Limited => warnings.push(format!(
                "Only {qualifying} creatives qualify; significance results may be unstable."
            )),
            SampleAdequacy::Insufficient => warnings.push(format!(
                "Only {qualifying} creatives qualify; too few for statistical comparison."
            )),
        }
        for warning in &warnings {
            warn!(organization_id = %request.organization_id, "{warning}");
        }

        let significant_groups = significance.groups.iter().filter(|g| g.is_significant).count();

        AnalysisReport {
            organization_id: request.organization_id,
            window: request.window,
            summary: ReportSummary {
                donations: attribution.total_events,
                total_revenue: attribution.total_revenue,
                attributed_revenue: attribution.attributed_revenue,
                creative_revenue: outcome.creative_revenue,
                creatives_analyzed: qualifying,
                total_impressions,
                total_spend: precision::currency(total_spend),
                overall_return_on_spend: precision::ratio(overall_return_on_spend),
                significant_groups,
            },
            attribution,
            significance: significance.groups,
            leading_indicators: leading.indicators,
            fatigue_alerts: fatigue.alerts(),
            recommendations,
            recommendation_counts,
            data_quality: DataQuality {
                creatives_considered: outcome.creatives_considered,
                creatives_qualifying: qualifying,
                low_volume_creatives: outcome.low_volume,
                snapshot_fallbacks: outcome.snapshot_fallbacks,
                creatives_without_delivery: outcome.without_delivery,
                no_delivery_data: outcome.no_delivery_data,
                excluded_groups: significance.excluded,
                leading_indicator_sample: leading.signals.len(),
                leading_indicator_short_history: leading.short_history,
                leading_indicator_low_early_volume: leading.low_early_volume,
                fatigue_insufficient_history: fatigue.insufficient_history,
                sample_adequacy,
                warnings,
            },
        }
    }
}
