//! Creative fatigue: sustained CTR decline from peak with a negative trend.
//!
//! The state is recomputed from the full window on every run; nothing is
//! carried between invocations.

use fundlens_core::config::AnalysisConfig;
use fundlens_core::precision;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::performance::{ratio_or_zero, CreativeAnalysis, DailyMetric};
use crate::stats;

/// Absorbs float noise so a decline computed as exactly the threshold is
/// treated as reaching it.
const BOUNDARY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FatigueState {
    Stable,
    Improving,
    Declining,
    Fatigued,
}

impl FatigueState {
    pub fn is_alert(&self) -> bool {
        matches!(self, FatigueState::Declining | FatigueState::Fatigued)
    }
}

/// Classify a creative from its decline off peak and its CTR trend.
/// Both thresholds are inclusive.
pub fn classify(decline: f64, slope: f64, threshold: f64) -> FatigueState {
    if slope < 0.0 && decline + BOUNDARY_EPSILON >= threshold {
        FatigueState::Fatigued
    } else if slope < 0.0 && decline + BOUNDARY_EPSILON >= threshold / 2.0 {
        FatigueState::Declining
    } else if slope > 0.0 {
        FatigueState::Improving
    } else {
        FatigueState::Stable
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueAssessment {
    pub creative_id: String,
    pub state: FatigueState,
    pub peak_ctr: f64,
    pub recent_ctr: f64,
    pub decline: f64,
    /// CTR change per day, rounded for output.
    pub slope: f64,
    /// Unrounded trend. Its sign drives both the state and the
    /// recommendation, since the rounded slope can collapse to zero.
    #[serde(skip)]
    pub raw_slope: f64,
    pub valid_days: usize,
}


#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FatigueReport {
    pub assessments: Vec<FatigueAssessment>,
    pub insufficient_history: Vec<String>,
}

impl FatigueReport {
    pub fn assessment(&self, creative_id: &str) -> Option<&FatigueAssessment> {
        self.assessments.iter().find(|a| a.creative_id == creative_id)
    }

    /// DECLINING and FATIGUED creatives, steepest decline first.
    pub fn alerts(&self) -> Vec<FatigueAssessment> {
        let mut alerts: Vec<FatigueAssessment> = self
            .assessments
            .iter()
            .filter(|a| a.state.is_alert())
            .cloned()
            .collect();
        alerts.sort_by(|a, b| {
            b.decline
                .total_cmp(&a.decline)
                .then_with(|| a.creative_id.cmp(&b.creative_id))
        });
        alerts
    }
}

pub struct FatigueDetector<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> FatigueDetector<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, creatives: &[CreativeAnalysis]) -> FatigueReport {
        let mut report = FatigueReport::default();
        for creative in creatives {
            let id = &creative.performance.creative_id;
            match self.assess(id, &creative.daily) {
                Some(assessment) => report.assessments.push(assessment),
                None => {
                    debug!(
                        creative_id = %id,
                        days = creative.daily.len(),
                        "Insufficient history for fatigue"
                    );
                    report.insufficient_history.push(id.clone());
                }
            }
        }
        let fatigued = report
            .assessments
            .iter()
            .filter(|a| a.state == FatigueState::Fatigued)
            .count();
        metrics::counter!("analytics.fatigued_creatives").increment(fatigued as u64);
        info!(
            assessed = report.assessments.len(),
            fatigued,
            insufficient = report.insufficient_history.len(),
            "Fatigue detection complete"
        );
        report
    }

    /// `daily` must be in date order.
    pub fn assess(&self, creative_id: &str, daily: &[DailyMetric]) -> Option<FatigueAssessment> {
        if daily.len() < self.config.fatigue_min_days {
            return None;
        }
        let valid: Vec<&DailyMetric> = daily
            .iter()
            .filter(|d| d.impressions >= self.config.daily_impression_floor)
            .collect();
        if valid.len() < 2 {
            return None;
        }

        let peak = valid.iter().map(|d| d.ctr()).fold(0.0, f64::max);
        if peak <= 0.0 {
            return None;
        }
        let recent_days = &valid[valid.len().saturating_sub(self.config.recent_window_days)..];
        let (clicks, impressions) = recent_days
            .iter()
            .fold((0u64, 0u64), |(c, i), d| (c + d.clicks, i + d.impressions));
        let recent = ratio_or_zero(clicks as f64, impressions as f64);
        let decline = 1.0 - recent / peak;

        let origin = valid[0].date;
        let xs: Vec<f64> = valid
            .iter()
            .map(|d| (d.date - origin).num_days() as f64)
            .collect();
        let ys: Vec<f64> = valid.iter().map(|d| d.ctr()).collect();
        let slope = stats::ols_slope(&xs, &ys).unwrap_or(0.0);

        Some(FatigueAssessment {
            creative_id: creative_id.to_string(),
            state: classify(decline, slope, self.config.fatigue_threshold),
            peak_ctr: precision::ratio(peak),
            recent_ctr: precision::ratio(recent),
            decline: precision::ratio(decline),
            slope: precision::slope(slope),
            raw_slope: slope,
            valid_days: valid.len(),
        })
    }
}
