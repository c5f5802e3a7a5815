use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FundlensError, FundlensResult};

/// Channel reported when no signal attributes a donation.
pub const UNATTRIBUTED_CHANNEL: &str = "unattributed";

// ─── Donations ──────────────────────────────────────────────────────────

/// A single donation as recorded by the ledger. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationEvent {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub amount: f64,
    #[serde(default)]
    pub tracking_code: Option<String>,
    /// Meta click identifier (`fbclid`).
    #[serde(default)]
    pub click_id: Option<String>,
    /// Google click identifier (`gclid`).
    #[serde(default)]
    pub secondary_click_id: Option<String>,
}

impl DonationEvent {
    /// Tracking code with surrounding whitespace removed; empty codes count as absent.
    pub fn normalized_code(&self) -> Option<String> {
        normalize_present(self.tracking_code.as_deref()).map(|c| c.to_lowercase())
    }

    pub fn has_click_id(&self) -> bool {
        normalize_present(self.click_id.as_deref()).is_some()
    }

    pub fn has_secondary_click_id(&self) -> bool {
        normalize_present(self.secondary_click_id.as_deref()).is_some()
    }

    /// Calendar date (UTC) the donation occurred on.
    pub fn occurred_on(&self) -> NaiveDate {
        self.occurred_at.date_naive()
    }
}

fn normalize_present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ─── Attribution rules ──────────────────────────────────────────────────

/// Where an attribution rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "organization_id")]
pub enum RuleScope {
    Global,
    Organization(Uuid),
}

impl RuleScope {
    /// Whether a rule with this scope may be evaluated for the organization.
    pub fn covers(&self, organization_id: Uuid) -> bool {
        match self {
            RuleScope::Global => true,
            RuleScope::Organization(owner) => *owner == organization_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Exact,
    Prefix,
    Suffix,
    Contains,
    Regex,
}

/// A pattern rule mapping tracking codes to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionRule {
    pub id: Uuid,
    pub name: String,
    pub scope: RuleScope,
    pub pattern: String,
    pub pattern_kind: PatternKind,
    pub channel: String,
    /// Declared confidence in `[0, 1]`.
    pub confidence: f64,
    /// Lower values take precedence.
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Exact tracking-code mapping maintained per organization.
///
/// A mapping that names an ad identifies the donation's origin without
/// ambiguity; one without an ad only pins the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeMapping {
    pub organization_id: Uuid,
    pub tracking_code: String,
    pub channel: String,
    #[serde(default)]
    pub ad_id: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub creative_id: Option<String>,
}

// ─── Attribution results ────────────────────────────────────────────────

/// Confidence class of a resolved donation, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Deterministic,
    High,
    Medium,
    Low,
    None,
}

impl ConfidenceTier {
    pub const ALL: [ConfidenceTier; 5] = [
        ConfidenceTier::Deterministic,
        ConfidenceTier::High,
        ConfidenceTier::Medium,
        ConfidenceTier::Low,
        ConfidenceTier::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::Deterministic => "deterministic",
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
            ConfidenceTier::None => "none",
        }
    }
}

/// Which signal produced an attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionMethod {
    ClickId,
    SecondaryClickId,
    ExactMapping,
    PatternRule,
    ChannelMapping,
    FuzzyMatch,
    TemporalCorrelation,
    None,
}

impl AttributionMethod {
    /// Whether the attribution was derived from the tracking code itself.
    pub fn is_code_based(&self) -> bool {
        matches!(
            self,
            AttributionMethod::ExactMapping
                | AttributionMethod::PatternRule
                | AttributionMethod::ChannelMapping
                | AttributionMethod::FuzzyMatch
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionResult {
    pub event_id: Uuid,
    pub channel: String,
    pub confidence_score: f64,
    pub confidence_tier: ConfidenceTier,
    pub method: AttributionMethod,
    pub matched_ad_id: Option<String>,
    pub matched_campaign_id: Option<String>,
    pub matched_creative_id: Option<String>,
    pub rule_name: Option<String>,
    pub is_global_rule: bool,
}

impl AttributionResult {
    pub fn unattributed(event_id: Uuid) -> Self {
        Self {
            event_id,
            channel: UNATTRIBUTED_CHANNEL.to_string(),
            confidence_score: 0.0,
            confidence_tier: ConfidenceTier::None,
            method: AttributionMethod::None,
            matched_ad_id: None,
            matched_campaign_id: None,
            matched_creative_id: None,
            rule_name: None,
            is_global_rule: false,
        }
    }

    pub fn is_attributed(&self) -> bool {
        self.confidence_tier != ConfidenceTier::None
    }
}

// ─── Ad delivery ────────────────────────────────────────────────────────

/// Video view counts at each progress quartile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoProgress {
    pub p25: u64,
    pub p50: u64,
    pub p75: u64,
    pub p100: u64,
}

/// One day of delivery for one ad, as reported by the ad platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdDeliveryMetric {
    pub ad_id: String,
    pub organization_id: Uuid,
    pub campaign_id: String,
    pub channel: String,
    pub date: NaiveDate,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    #[serde(default)]
    pub video_progress: Option<VideoProgress>,
}

// ─── Creatives ──────────────────────────────────────────────────────────

/// Qualitative attributes extracted from a creative by the tagging step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualitativeTags {
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub stances: Vec<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub pain_points: Vec<String>,
}

/// Lifetime totals stored on the creative itself, used when no delivery
/// history exists for the requested window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CreativeSnapshot {
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreativeRecord {
    pub creative_id: String,
    pub ad_id: String,
    pub organization_id: Uuid,
    #[serde(default)]
    pub tags: QualitativeTags,
    /// Confidence reported by the tagging step, in `[0, 1]`.
    #[serde(default)]
    pub analysis_confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub snapshot: Option<CreativeSnapshot>,
}

// ─── Window ─────────────────────────────────────────────────────────────

/// Inclusive calendar-date window an analysis runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> FundlensResult<Self> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> FundlensResult<()> {
        if self.start > self.end {
            return Err(FundlensError::InvalidInput(format!(
                "window start {} is after end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}
