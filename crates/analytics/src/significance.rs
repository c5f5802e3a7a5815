//! Statistical significance of qualitative creative attributes.
//!
//! Creatives are grouped by each tag value (issue, stance, target, pain
//! point). Every group with enough members and non-zero spread gets a
//! z-test of its mean ROAS against the global mean; p-values are then
//! corrected across all tested groups with Benjamini–Hochberg, so testing
//! dozens of tags at once does not manufacture winners.

use std::collections::BTreeMap;

use fundlens_core::config::AnalysisConfig;
use fundlens_core::precision;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::performance::CreativeAnalysis;
use crate::stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagDimension {
    Issue,
    Stance,
    Target,
    PainPoint,
}

impl TagDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagDimension::Issue => "issue",
            TagDimension::Stance => "stance",
            TagDimension::Target => "target",
            TagDimension::PainPoint => "pain_point",
        }
    }
}

/// Mean and spread of ROAS over every qualifying creative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalBaseline {
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl GlobalBaseline {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        Some(Self {
            n: values.len(),
            mean: stats::mean(values)?,
            std_dev: stats::sample_std_dev(values)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerLabel {
    AdequatelyPowered,
    ModeratelyPowered,
    Underpowered,
    InsufficientData,
}

impl PowerLabel {
    pub fn classify(n: usize, power: f64) -> Self {
        if n < 3 {
            PowerLabel::InsufficientData
        } else if power >= 0.8 {
            PowerLabel::AdequatelyPowered
        } else if power >= 0.5 {
            PowerLabel::ModeratelyPowered
        } else {
            PowerLabel::Underpowered
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupPerformance {
    pub group_key: String,
    pub dimension: TagDimension,
    pub value: String,
    pub n: usize,
    pub mean_return: f64,
    pub stddev_return: f64,
    pub confidence_interval: ConfidenceInterval,
    pub z_score: f64,
    pub p_value: f64,
    pub adjusted_p_value: f64,
    pub is_significant: bool,
    pub effect_size: f64,
    pub statistical_power: f64,
    pub power_label: PowerLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    InsufficientMembers,
    ZeroVariance,
}

/// A group that was not tested, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedGroup {
    pub group_key: String,
    pub n: usize,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignificanceReport {
    pub baseline: Option<GlobalBaseline>,
    /// Ordered by adjusted p-value, then group key.
    pub groups: Vec<GroupPerformance>,
    pub excluded: Vec<ExcludedGroup>,
}

/// Member ROAS values of one tag group.
#[derive(Debug, Clone, PartialEq)]
pub struct TagGroup {
    pub dimension: TagDimension,
    pub value: String,
    pub returns: Vec<f64>,
}

impl TagGroup {
    pub fn key(&self) -> String {
        format!("{}:{}", self.dimension.as_str(), self.value)
    }
}

/// Raw statistics of one group, before multiple-comparison correction.
struct GroupTest {
    group: TagGroup,
    mean: f64,
    std_dev: f64,
    z: f64,
    p: f64,
    effect_size: f64,
    power: f64,
}

pub struct SignificanceEngine<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> SignificanceEngine<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, creatives: &[CreativeAnalysis]) -> SignificanceReport {
        let returns: Vec<f64> = creatives
            .iter()
            .map(|c| c.performance.return_on_spend)
            .collect();
        let Some(baseline) = GlobalBaseline::from_values(&returns) else {
            debug!(creatives = creatives.len(), "Too few creatives for a global baseline");
            return SignificanceReport::default();
        };
        self.evaluate(group_by_tags(creatives), &baseline)
    }

    /// Test `groups` against `baseline` and apply FDR correction across
    /// every group that was actually tested.
    pub fn evaluate(&self, groups: Vec<TagGroup>, baseline: &GlobalBaseline) -> SignificanceReport {
        let mut tests = Vec::new();
        let mut excluded = Vec::new();

        for group in groups {
            match self.test_group(group, baseline) {
                Ok(test) => tests.push(test),
                Err(skip) => {
                    debug!(
                        group = %skip.group_key,
                        n = skip.n,
                        reason = ?skip.reason,
                        "Group excluded from significance testing"
                    );
                    excluded.push(skip);
                }
            }
        }

        let raw: Vec<f64> = tests.iter().map(|t| t.p).collect();
        let adjusted = stats::benjamini_hochberg(&raw);
        let alpha = self.config.significance_level;

        let mut results: Vec<GroupPerformance> = tests
            .into_iter()
            .zip(adjusted)
            .map(|(t, adj)| {
                let n = t.group.returns.len();
                let se = t.std_dev / (n as f64).sqrt();
                GroupPerformance {
                    group_key: t.group.key(),
                    dimension: t.group.dimension,
                    value: t.group.value,
                    n,
                    mean_return: precision::ratio(t.mean),
                    stddev_return: precision::ratio(t.std_dev),
                    confidence_interval: ConfidenceInterval {
                        lower: precision::ratio(t.mean - stats::Z_95 * se),
                        upper: precision::ratio(t.mean + stats::Z_95 * se),
                    },
                    z_score: precision::ratio(t.z),
                    p_value: precision::p_value(t.p),
                    adjusted_p_value: precision::p_value(adj),
                    is_significant: adj < alpha,
                    effect_size: precision::ratio(t.effect_size),
                    statistical_power: precision::ratio(t.power),
                    power_label: PowerLabel::classify(n, t.power),
                }
            })
            .collect();
        results.sort_by(|a, b| {
            a.adjusted_p_value
                .total_cmp(&b.adjusted_p_value)
                .then_with(|| a.group_key.cmp(&b.group_key))
        });
        excluded.sort_by(|a, b| a.group_key.cmp(&b.group_key));

        metrics::counter!("analytics.groups_excluded").increment(excluded.len() as u64);
        info!(
            tested = results.len(),
            significant = results.iter().filter(|g| g.is_significant).count(),
            excluded = excluded.len(),
            "Significance analysis complete"
        );

        SignificanceReport {
            baseline: Some(GlobalBaseline {
                n: baseline.n,
                mean: precision::ratio(baseline.mean),
                std_dev: precision::ratio(baseline.std_dev),
            }),
            groups: results,
            excluded,
        }
    }

    fn test_group(
        &self,
        group: TagGroup,
        baseline: &GlobalBaseline,
    ) -> Result<GroupTest, ExcludedGroup> {
        let n = group.returns.len();
        let exclude = |reason| ExcludedGroup {
            group_key: group.key(),
            n,
            reason,
        };
        if n < self.config.min_group_size {
            return Err(exclude(ExclusionReason::InsufficientMembers));
        }
        let (Some(mean), Some(std_dev)) = (
            stats::mean(&group.returns),
            stats::sample_std_dev(&group.returns),
        ) else {
            return Err(exclude(ExclusionReason::InsufficientMembers));
        };
        if std_dev <= 0.0 {
            return Err(exclude(ExclusionReason::ZeroVariance));
        }

        let se = std_dev / (n as f64).sqrt();
        let z = (mean - baseline.mean) / se;
        let effect_size = if baseline.std_dev > 0.0 {
            (mean - baseline.mean) / baseline.std_dev
        } else {
            0.0
        };
        Ok(GroupTest {
            mean,
            std_dev,
            z,
            p: stats::two_tailed_p_from_z(z),
            effect_size,
            power: stats::z_test_power(effect_size, n, self.config.significance_level),
            group,
        })
    }
}

/// One group per distinct `(dimension, value)`. Values are trimmed and
/// lower-cased; a creative joins each of its groups once.
pub fn group_by_tags(creatives: &[CreativeAnalysis]) -> Vec<TagGroup> {
    let mut groups: BTreeMap<(TagDimension, String), Vec<f64>> = BTreeMap::new();
    for creative in creatives {
        let tags = &creative.tags;
        let mut memberships: Vec<(TagDimension, String)> = Vec::new();
        let dimensions = tags
            .issue
            .iter()
            .map(|v| (TagDimension::Issue, v))
            .chain(tags.stances.iter().map(|v| (TagDimension::Stance, v)))
            .chain(tags.targets.iter().map(|v| (TagDimension::Target, v)))
            .chain(tags.pain_points.iter().map(|v| (TagDimension::PainPoint, v)));
        for (dimension, raw) in dimensions {
            let value = raw.trim().to_lowercase();
            if value.is_empty() {
                continue;
            }
            let membership = (dimension, value);
            if !memberships.contains(&membership) {
                memberships.push(membership);
            }
        }
        for membership in memberships {
            groups
                .entry(membership)
                .or_default()
                .push(creative.performance.return_on_spend);
        }
    }
    groups
        .into_iter()
        .map(|((dimension, value), returns)| TagGroup {
            dimension,
            value,
            returns,
        })
        .collect()
}
