//! Per-creative budget recommendations.

use std::collections::BTreeSet;

use fundlens_core::config::AnalysisConfig;
use fundlens_core::precision;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::fatigue::{FatigueReport, FatigueState};
use crate::performance::CreativeAnalysis;
use crate::significance::{group_by_tags, SignificanceReport};

const SCALE_MIN_RETURN: f64 = 1.5;
const SCALE_MIN_IMPRESSIONS: u64 = 5_000;
const MAINTAIN_MIN_RETURN: f64 = 1.0;
const PAUSE_MAX_RETURN: f64 = 0.5;
const PAUSE_MIN_IMPRESSIONS: u64 = 3_000;
const VOLUME_WEIGHT: f64 = 0.6;
const ANALYSIS_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Scale,
    Maintain,
    Watch,
    Refresh,
    Pause,
    GatherData,
}

impl Recommendation {
    pub const ALL: [Recommendation; 6] = [
        Recommendation::Scale,
        Recommendation::Maintain,
        Recommendation::Watch,
        Recommendation::Refresh,
        Recommendation::Pause,
        Recommendation::GatherData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Scale => "SCALE",
            Recommendation::Maintain => "MAINTAIN",
            Recommendation::Watch => "WATCH",
            Recommendation::Refresh => "REFRESH",
            Recommendation::Pause => "PAUSE",
            Recommendation::GatherData => "GATHER_DATA",
        }
    }

    fn action(&self) -> &'static str {
        match self {
            Recommendation::Scale => "increase budget",
            Recommendation::Maintain => "keep current budget",
            Recommendation::Watch => "monitor before changing budget",
            Recommendation::Refresh => "rotate in new creative",
            Recommendation::Pause => "pause spend",
            Recommendation::GatherData => "gather more delivery before deciding",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreativeRecommendation {
    pub creative_id: String,
    pub ad_id: String,
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub return_on_spend: f64,
    pub total_impressions: u64,
    pub fatigue_state: Option<FatigueState>,
    pub trend_slope: f64,
    /// Significant tag groups this creative belongs to.
    pub significant_groups: Vec<String>,
    pub rationale: String,
}

pub struct RecommendationSynthesizer<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> RecommendationSynthesizer<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// First matching rule wins.
    pub fn decide(
        &self,
        return_on_spend: f64,
        impressions: u64,
        slope: f64,
        state: Option<FatigueState>,
    ) -> Recommendation {
        if state == Some(FatigueState::Fatigued) {
            Recommendation::Refresh
        } else if return_on_spend >= SCALE_MIN_RETURN
            && slope >= 0.0
            && impressions >= SCALE_MIN_IMPRESSIONS
        {
            Recommendation::Scale
        } else if return_on_spend >= MAINTAIN_MIN_RETURN && slope >= 0.0 {
            Recommendation::Maintain
        } else if return_on_spend < PAUSE_MAX_RETURN && impressions >= PAUSE_MIN_IMPRESSIONS {
            Recommendation::Pause
        } else if impressions < self.config.min_impressions.saturating_mul(2) {
            Recommendation::GatherData
        } else {
            Recommendation::Watch
        }
    }

    /// Blend of data volume and tagging reliability, in [0, 1].
    pub fn confidence(&self, impressions: u64, analysis_confidence: Option<f64>) -> f64 {
        let saturation = self.config.volume_saturation_impressions.max(1) as f64;
        let volume = (impressions as f64 / saturation).min(1.0);
        let analysis = analysis_confidence
            .unwrap_or(self.config.default_analysis_confidence)
            .clamp(0.0, 1.0);
        precision::ratio(VOLUME_WEIGHT * volume + ANALYSIS_WEIGHT * analysis)
    }

    pub fn synthesize(
        &self,
        creatives: &[CreativeAnalysis],
        significance: &SignificanceReport,
        fatigue: &FatigueReport,
    ) -> Vec<CreativeRecommendation> {
        let significant: BTreeSet<&str> = significance
            .groups
            .iter()
            .filter(|g| g.is_significant)
            .map(|g| g.group_key.as_str())
            .collect();

        let mut recommendations: Vec<CreativeRecommendation> = creatives
            .iter()
            .map(|creative| {
                let perf = &creative.performance;
                let assessment = fatigue.assessment(&perf.creative_id);
                let state = assessment.map(|a| a.state);
                let slope = assessment.map_or(0.0, |a| a.raw_slope);
                let recommendation =
                    self.decide(perf.return_on_spend, perf.total_impressions, slope, state);
                let trend = assessment.map(|a| (a.state, a.decline));

                let significant_groups: Vec<String> = group_by_tags(std::slice::from_ref(creative))
                    .iter()
                    .map(|g| g.key())
                    .filter(|key| significant.contains(key.as_str()))
                    .collect();

                CreativeRecommendation {
                    creative_id: perf.creative_id.clone(),
                    ad_id: perf.ad_id.clone(),
                    recommendation,
                    confidence: self
                        .confidence(perf.total_impressions, creative.analysis_confidence),
                    return_on_spend: perf.return_on_spend,
                    total_impressions: perf.total_impressions,
                    fatigue_state: state,
                    trend_slope: precision::slope(slope),
                    rationale: rationale(
                        recommendation,
                        perf.return_on_spend,
                        perf.total_impressions,
                        trend,
                    ),
                    significant_groups,
                }
            })
            .collect();

        recommendations.sort_by(|a, b| {
            a.recommendation
                .cmp(&b.recommendation)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| a.creative_id.cmp(&b.creative_id))
        });
        info!(count = recommendations.len(), "Recommendations synthesized");
        recommendations
    }
}

fn rationale(
    recommendation: Recommendation,
    return_on_spend: f64,
    impressions: u64,
    trend: Option<(FatigueState, f64)>,
) -> String {
    let trend = match trend {
        Some((FatigueState::Fatigued, decline)) => {
            format!("CTR is fatigued, down {:.1}% from peak", decline * 100.0)
        }
        Some((FatigueState::Declining, decline)) => {
            format!("CTR is declining, down {:.1}% from peak", decline * 100.0)
        }
        Some((FatigueState::Improving, _)) => "CTR is improving".to_string(),
        Some((FatigueState::Stable, _)) => "CTR is stable".to_string(),
        None => "not enough daily history to judge the trend".to_string(),
    };
    format!(
        "ROAS {:.2} on {} impressions; {}. Recommendation: {} ({}).",
        return_on_spend,
        impressions,
        trend,
        recommendation.as_str(),
        recommendation.action()
    )
}
