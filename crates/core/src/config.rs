use serde::Deserialize;

use crate::error::{FundlensError, FundlensResult};

/// Root application configuration. Loaded from environment variables
/// with the prefix `FUNDLENS__` and an optional TOML/JSON/YAML config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

// ─── Attribution Config ─────────────────────────────────────────────────

/// Tier scores and thresholds used by the attribution resolver.
#[derive(Debug, Clone, Deserialize)]
pub struct AttributionConfig {
    /// Channel assigned when the primary click identifier is present.
    #[serde(default = "default_click_id_channel")]
    pub click_id_channel: String,
    /// Channel assigned when only the secondary click identifier is present.
    #[serde(default = "default_secondary_click_id_channel")]
    pub secondary_click_id_channel: String,
    #[serde(default = "default_high_tier_floor")]
    pub high_tier_floor: f64,
    #[serde(default = "default_high_tier_ceiling")]
    pub high_tier_ceiling: f64,
    #[serde(default = "default_channel_mapping_confidence")]
    pub channel_mapping_confidence: f64,
    /// Minimum trigram similarity for a fuzzy tracking-code match.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    #[serde(default = "default_fuzzy_confidence_cap")]
    pub fuzzy_confidence_cap: f64,
    #[serde(default = "default_temporal_confidence")]
    pub temporal_confidence: f64,
}

fn default_click_id_channel() -> String {
    "meta".to_string()
}
fn default_secondary_click_id_channel() -> String {
    "google".to_string()
}
fn default_high_tier_floor() -> f64 {
    0.85
}
fn default_high_tier_ceiling() -> f64 {
    0.95
}
fn default_channel_mapping_confidence() -> f64 {
    0.75
}
fn default_fuzzy_threshold() -> f64 {
    0.60
}
fn default_fuzzy_confidence_cap() -> f64 {
    0.80
}
fn default_temporal_confidence() -> f64 {
    0.40
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            click_id_channel: default_click_id_channel(),
            secondary_click_id_channel: default_secondary_click_id_channel(),
            high_tier_floor: default_high_tier_floor(),
            high_tier_ceiling: default_high_tier_ceiling(),
            channel_mapping_confidence: default_channel_mapping_confidence(),
            fuzzy_threshold: default_fuzzy_threshold(),
            fuzzy_confidence_cap: default_fuzzy_confidence_cap(),
            temporal_confidence: default_temporal_confidence(),
        }
    }
}

impl AttributionConfig {
    /// Tier scores must stay strictly ordered so that a higher tier always
    /// outranks a lower one.
    pub fn validate(&self) -> FundlensResult<()> {
        for (name, value) in [
            ("high_tier_floor", self.high_tier_floor),
            ("high_tier_ceiling", self.high_tier_ceiling),
            ("channel_mapping_confidence", self.channel_mapping_confidence),
            ("fuzzy_threshold", self.fuzzy_threshold),
            ("fuzzy_confidence_cap", self.fuzzy_confidence_cap),
            ("temporal_confidence", self.temporal_confidence),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(FundlensError::Config(format!(
                    "attribution.{name} must be within (0, 1), got {value}"
                )));
            }
        }
        let ordered = self.high_tier_floor <= self.high_tier_ceiling
            && self.channel_mapping_confidence < self.high_tier_floor
            && self.fuzzy_confidence_cap < self.high_tier_floor
            && self.fuzzy_threshold <= self.fuzzy_confidence_cap
            && self.temporal_confidence < self.fuzzy_threshold
            && self.temporal_confidence < self.channel_mapping_confidence;
        if !ordered {
            return Err(FundlensError::Config(
                "attribution tier scores must decrease from high to medium to low".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Analysis Config ────────────────────────────────────────────────────

/// Caller-supplied thresholds for the performance analysis pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Lifetime-window impressions a creative needs to enter analysis.
    #[serde(default = "default_min_impressions")]
    pub min_impressions: u64,
    #[serde(default = "default_min_group_size")]
    pub min_group_size: usize,
    #[serde(default = "default_significance_level")]
    pub significance_level: f64,
    #[serde(default = "default_early_window_days")]
    pub early_window_days: u32,
    #[serde(default = "default_early_min_impressions")]
    pub early_min_impressions: u64,
    #[serde(default = "default_fatigue_threshold")]
    pub fatigue_threshold: f64,
    #[serde(default = "default_fatigue_min_days")]
    pub fatigue_min_days: usize,
    #[serde(default = "default_daily_impression_floor")]
    pub daily_impression_floor: u64,
    #[serde(default = "default_recent_window_days")]
    pub recent_window_days: usize,
    /// Impression volume at which the data-reliability half of the
    /// recommendation confidence saturates.
    #[serde(default = "default_volume_saturation_impressions")]
    pub volume_saturation_impressions: u64,
    /// Used when the tagging step produced no analysis confidence.
    #[serde(default = "default_analysis_confidence")]
    pub default_analysis_confidence: f64,
}

fn default_min_impressions() -> u64 {
    1000
}
fn default_min_group_size() -> usize {
    3
}
fn default_significance_level() -> f64 {
    0.05
}
fn default_early_window_days() -> u32 {
    3
}
fn default_early_min_impressions() -> u64 {
    500
}
fn default_fatigue_threshold() -> f64 {
    0.20
}
fn default_fatigue_min_days() -> usize {
    5
}
fn default_daily_impression_floor() -> u64 {
    100
}
fn default_recent_window_days() -> usize {
    3
}
fn default_volume_saturation_impressions() -> u64 {
    10_000
}
fn default_analysis_confidence() -> f64 {
    0.5
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_impressions: default_min_impressions(),
            min_group_size: default_min_group_size(),
            significance_level: default_significance_level(),
            early_window_days: default_early_window_days(),
            early_min_impressions: default_early_min_impressions(),
            fatigue_threshold: default_fatigue_threshold(),
            fatigue_min_days: default_fatigue_min_days(),
            daily_impression_floor: default_daily_impression_floor(),
            recent_window_days: default_recent_window_days(),
            volume_saturation_impressions: default_volume_saturation_impressions(),
            default_analysis_confidence: default_analysis_confidence(),
        }
    }
}

impl AnalysisConfig {
    /// Reject caller input that would make any downstream statistic
    /// meaningless. Runs before any computation begins.
    pub fn validate(&self) -> FundlensResult<()> {
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(FundlensError::InvalidInput(format!(
                "significance_level must be within (0, 1), got {}",
                self.significance_level
            )));
        }
        if !(self.fatigue_threshold > 0.0 && self.fatigue_threshold <= 1.0) {
            return Err(FundlensError::InvalidInput(format!(
                "fatigue_threshold must be within (0, 1], got {}",
                self.fatigue_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.default_analysis_confidence) {
            return Err(FundlensError::InvalidInput(format!(
                "default_analysis_confidence must be within [0, 1], got {}",
                self.default_analysis_confidence
            )));
        }
        if self.min_group_size < 2 {
            return Err(FundlensError::InvalidInput(
                "min_group_size must be at least 2 to estimate a standard deviation".to_string(),
            ));
        }
        if self.early_window_days == 0 {
            return Err(FundlensError::InvalidInput(
                "early_window_days must be positive".to_string(),
            ));
        }
        if self.recent_window_days == 0 {
            return Err(FundlensError::InvalidInput(
                "recent_window_days must be positive".to_string(),
            ));
        }
        if self.volume_saturation_impressions == 0 {
            return Err(FundlensError::InvalidInput(
                "volume_saturation_impressions must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Runtime Config ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Caller timeout on a whole invocation.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Worker threads for the parallel stages; 0 lets rayon decide.
    #[serde(default)]
    pub worker_threads: usize,
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            worker_threads: 0,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and an optional config file.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("FUNDLENS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn validate(&self) -> FundlensResult<()> {
        self.attribution.validate()?;
        self.analysis.validate()
    }
}
