//! Early-window engagement as a predictor of final return on spend.

use std::fmt;

use fundlens_core::config::AnalysisConfig;
use fundlens_core::precision;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::performance::{ratio_or_zero, CreativeAnalysis};
use crate::stats;

/// Minimum number of creatives before a correlation is computed.
const MIN_SAMPLE: usize = 3;
/// Days of delivery required past the early window so the final outcome is
/// actually observed.
const OUTCOME_DAYS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlySignal {
    pub creative_id: String,
    pub early_impressions: u64,
    pub early_ctr: f64,
    pub early_cpm: f64,
    pub final_return: f64,
    /// Unrounded early CTR and CPM; correlations run on these.
    #[serde(skip)]
    pub raw_ctr: f64,
    #[serde(skip)]
    pub raw_cpm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorMetric {
    EarlyCtr,
    EarlyCpm,
}

impl fmt::Display for IndicatorMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorMetric::EarlyCtr => write!(f, "Early CTR"),
            IndicatorMetric::EarlyCpm => write!(f, "Early CPM"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    Strong,
    Moderate,
    Weak,
    Negligible,
    InsufficientData,
}

impl CorrelationStrength {
    pub fn from_r(r: f64) -> Self {
        let magnitude = r.abs();
        if magnitude >= 0.5 {
            CorrelationStrength::Strong
        } else if magnitude >= 0.3 {
            CorrelationStrength::Moderate
        } else if magnitude >= 0.1 {
            CorrelationStrength::Weak
        } else {
            CorrelationStrength::Negligible
        }
    }

    fn adjective(&self) -> &'static str {
        match self {
            CorrelationStrength::Strong => "strong",
            CorrelationStrength::Moderate => "moderate",
            CorrelationStrength::Weak => "weak",
            CorrelationStrength::Negligible => "negligible",
            CorrelationStrength::InsufficientData => "undetermined",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorCorrelation {
    pub metric: IndicatorMetric,
    pub n: usize,
    pub correlation: Option<f64>,
    pub p_value: Option<f64>,
    pub is_significant: bool,
    pub strength: CorrelationStrength,
    pub insight: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadingIndicatorReport {
    pub signals: Vec<EarlySignal>,
    pub indicators: Vec<IndicatorCorrelation>,
    /// Creatives without enough days past the early window.
    pub short_history: Vec<String>,
    /// Creatives whose early window fell below the impression floor.
    pub low_early_volume: Vec<String>,
}

pub struct LeadingIndicatorEngine<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> LeadingIndicatorEngine<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, creatives: &[CreativeAnalysis]) -> LeadingIndicatorReport {
        let mut report = LeadingIndicatorReport::default();
        let required_days = (self.config.early_window_days + OUTCOME_DAYS) as usize;

        for creative in creatives {
            let id = &creative.performance.creative_id;
            if creative.performance.days_with_data < required_days {
                debug!(
                    creative_id = %id,
                    days = creative.performance.days_with_data,
                    "Too little history for leading indicators"
                );
                report.short_history.push(id.clone());
                continue;
            }
            match self.early_signal(creative) {
                Some(signal) => report.signals.push(signal),
                None => {
                    debug!(creative_id = %id, "Early window below impression floor");
                    report.low_early_volume.push(id.clone());
                }
            }
        }

        let returns: Vec<f64> = report.signals.iter().map(|s| s.final_return).collect();
        let ctrs: Vec<f64> = report.signals.iter().map(|s| s.raw_ctr).collect();
        let cpms: Vec<f64> = report.signals.iter().map(|s| s.raw_cpm).collect();
        report.indicators = vec![
            self.correlate(IndicatorMetric::EarlyCtr, &ctrs, &returns),
            self.correlate(IndicatorMetric::EarlyCpm, &cpms, &returns),
        ];

        info!(
            sample = report.signals.len(),
            short_history = report.short_history.len(),
            low_early_volume = report.low_early_volume.len(),
            "Leading-indicator analysis complete"
        );
        report
    }

    fn early_signal(&self, creative: &CreativeAnalysis) -> Option<EarlySignal> {
        let first = creative.daily.first()?.date;
        let cutoff = first + chrono::Duration::days(i64::from(self.config.early_window_days));
        let (impressions, clicks, spend) = creative
            .daily
            .iter()
            .take_while(|d| d.date < cutoff)
            .fold((0u64, 0u64, 0.0f64), |(i, c, s), d| {
                (i + d.impressions, c + d.clicks, s + d.spend)
            });
        if impressions <= self.config.early_min_impressions {
            return None;
        }
        let impressions_f = impressions as f64;
        let ctr = ratio_or_zero(clicks as f64, impressions_f);
        let cpm = ratio_or_zero(spend, impressions_f) * 1000.0;
        Some(EarlySignal {
            creative_id: creative.performance.creative_id.clone(),
            early_impressions: impressions,
            early_ctr: precision::ratio(ctr),
            early_cpm: precision::currency(cpm),
            final_return: creative.performance.return_on_spend,
            raw_ctr: ctr,
            raw_cpm: cpm,
        })
    }

    fn correlate(
        &self,
        metric: IndicatorMetric,
        xs: &[f64],
        ys: &[f64],
    ) -> IndicatorCorrelation {
        let n = xs.len();
        let r = if n >= MIN_SAMPLE { stats::pearson(xs, ys) } else { None };
        let Some(r) = r else {
            return IndicatorCorrelation {
                metric,
                n,
                correlation: None,
                p_value: None,
                is_significant: false,
                strength: CorrelationStrength::InsufficientData,
                insight: format!(
                    "Not enough creatives with varied early-window data to evaluate {} \
                     against final ROAS (n = {n}).",
                    metric.to_string().to_lowercase()
                ),
            };
        };
        let p = stats::correlation_p_value(r, n).unwrap_or(1.0);
        let is_significant = p < self.config.significance_level;
        let strength = CorrelationStrength::from_r(r);
        IndicatorCorrelation {
            metric,
            n,
            correlation: Some(precision::ratio(r)),
            p_value: Some(precision::p_value(p)),
            is_significant,
            strength,
            insight: insight(metric, r, p, n, strength, is_significant),
        }
    }
}

fn insight(
    metric: IndicatorMetric,
    r: f64,
    p: f64,
    n: usize,
    strength: CorrelationStrength,
    is_significant: bool,
) -> String {
    let figures = format!("r = {:.2}, p = {:.4}, n = {n}", r, p);
    if !is_significant {
        return format!(
            "{metric} shows no statistically significant relationship with final ROAS yet \
             ({figures}); treat it as inconclusive."
        );
    }
    let direction = if r >= 0.0 { "positive" } else { "negative" };
    match strength {
        CorrelationStrength::Strong => {
            format!("{metric} is a strong {direction} predictor of final ROAS ({figures}).")
        }
        CorrelationStrength::Negligible => {
            format!(
                "{metric} has a significant but negligible relationship with final ROAS \
                 ({figures})."
            )
        }
        _ => format!(
            "{metric} has a {} {direction} relationship with final ROAS ({figures}).",
            strength.adjective()
        ),
    }
}
