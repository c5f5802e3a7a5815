//! Turns one donation into a single best channel/campaign/ad match with a
//! calibrated confidence.
//!
//! Resolution walks a fixed waterfall of tiers and returns on the first
//! success, so confidence decreases monotonically with the tier reached:
//!
//! | Tier | Signal | Score |
//! |---|---|---|
//! | deterministic | click identifier, or exact mapping naming an ad | 1.00 |
//! | high | pattern rule (organization pass, then global pass) | rule confidence clamped to 0.85–0.95 |
//! | medium | channel-only mapping / fuzzy known-code match | 0.75 / similarity capped at 0.80 |
//! | low | highest-spend campaign active on the donation date | 0.40 |
//! | none | nothing matched | 0.00 |
//!
//! Missing inputs never fail resolution; they only push the event further
//! down the waterfall.

use fundlens_core::config::AttributionConfig;
use fundlens_core::precision;
use fundlens_core::types::{
    AttributionMethod, AttributionResult, CodeMapping, ConfidenceTier, DonationEvent,
};

use crate::rules::RuleStore;
use crate::spend::ActiveSpendIndex;

/// Score of every deterministic attribution.
pub const DETERMINISTIC_SCORE: f64 = 1.0;

/// One step of the waterfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    ClickId,
    SecondaryClickId,
    ExactMapping,
    PatternRule,
    ChannelMapping,
    FuzzyMatch,
    TemporalCorrelation,
}

const WATERFALL: [Strategy; 7] = [
    Strategy::ClickId,
    Strategy::SecondaryClickId,
    Strategy::ExactMapping,
    Strategy::PatternRule,
    Strategy::ChannelMapping,
    Strategy::FuzzyMatch,
    Strategy::TemporalCorrelation,
];

/// Stateless resolver over read-only rule and spend data.
#[derive(Debug, Clone, Copy)]
pub struct AttributionResolver<'a> {
    rules: &'a RuleStore,
    spend: &'a ActiveSpendIndex,
    config: &'a AttributionConfig,
}

impl<'a> AttributionResolver<'a> {
    pub fn new(
        rules: &'a RuleStore,
        spend: &'a ActiveSpendIndex,
        config: &'a AttributionConfig,
    ) -> Self {
        Self {
            rules,
            spend,
            config,
        }
    }

    /// Resolve a single donation. Identical inputs always give identical output.
    pub fn resolve(&self, event: &DonationEvent) -> AttributionResult {
        let code = event.normalized_code();
        WATERFALL
            .iter()
            .find_map(|strategy| self.attempt(*strategy, event, code.as_deref()))
            .unwrap_or_else(|| AttributionResult::unattributed(event.id))
    }

    fn attempt(
        &self,
        strategy: Strategy,
        event: &DonationEvent,
        code: Option<&str>,
    ) -> Option<AttributionResult> {
        match strategy {
            Strategy::ClickId => event.has_click_id().then(|| {
                self.click_result(
                    event,
                    code,
                    &self.config.click_id_channel,
                    AttributionMethod::ClickId,
                )
            }),
            Strategy::SecondaryClickId => event.has_secondary_click_id().then(|| {
                self.click_result(
                    event,
                    code,
                    &self.config.secondary_click_id_channel,
                    AttributionMethod::SecondaryClickId,
                )
            }),
            Strategy::ExactMapping => {
                let mapping = self.rules.mapping(event.organization_id, code?)?;
                mapping.ad_id.as_ref()?;
                Some(from_mapping(
                    event,
                    mapping,
                    DETERMINISTIC_SCORE,
                    ConfidenceTier::Deterministic,
                    AttributionMethod::ExactMapping,
                ))
            }
            Strategy::PatternRule => {
                let hit = self.rules.match_rule(event.organization_id, code?)?;
                Some(AttributionResult {
                    event_id: event.id,
                    channel: hit.rule.channel.clone(),
                    confidence_score: hit
                        .rule
                        .confidence
                        .clamp(self.config.high_tier_floor, self.config.high_tier_ceiling),
                    confidence_tier: ConfidenceTier::High,
                    method: AttributionMethod::PatternRule,
                    matched_ad_id: None,
                    matched_campaign_id: None,
                    matched_creative_id: None,
                    rule_name: Some(hit.rule.name.clone()),
                    is_global_rule: hit.is_global,
                })
            }
            Strategy::ChannelMapping => {
                let mapping = self.rules.mapping(event.organization_id, code?)?;
                // Mappings naming an ad were already taken as deterministic.
                Some(from_mapping(
                    event,
                    mapping,
                    self.config.channel_mapping_confidence,
                    ConfidenceTier::Medium,
                    AttributionMethod::ChannelMapping,
                ))
            }
            Strategy::FuzzyMatch => {
                let candidate =
                    self.rules
                        .fuzzy_match(event.organization_id, code?, self.config.fuzzy_threshold)?;
                let score =
                    precision::ratio(candidate.similarity.min(self.config.fuzzy_confidence_cap));
                Some(from_mapping(
                    event,
                    candidate.mapping,
                    score,
                    ConfidenceTier::Medium,
                    AttributionMethod::FuzzyMatch,
                ))
            }
            Strategy::TemporalCorrelation => {
                let campaign = self
                    .spend
                    .top_campaign(event.organization_id, event.occurred_on())?;
                Some(AttributionResult {
                    event_id: event.id,
                    channel: campaign.channel.clone(),
                    confidence_score: self.config.temporal_confidence,
                    confidence_tier: ConfidenceTier::Low,
                    method: AttributionMethod::TemporalCorrelation,
                    matched_ad_id: None,
                    matched_campaign_id: Some(campaign.campaign_id.clone()),
                    matched_creative_id: None,
                    rule_name: None,
                    is_global_rule: false,
                })
            }
        }
    }

    /// Click identifiers fix the channel; an exact mapping for the code, if
    /// any, still supplies the ad, campaign and creative.
    fn click_result(
        &self,
        event: &DonationEvent,
        code: Option<&str>,
        channel: &str,
        method: AttributionMethod,
    ) -> AttributionResult {
        let mapping = code.and_then(|c| self.rules.mapping(event.organization_id, c));
        AttributionResult {
            event_id: event.id,
            channel: channel.to_string(),
            confidence_score: DETERMINISTIC_SCORE,
            confidence_tier: ConfidenceTier::Deterministic,
            method,
            matched_ad_id: mapping.and_then(|m| m.ad_id.clone()),
            matched_campaign_id: mapping.and_then(|m| m.campaign_id.clone()),
            matched_creative_id: mapping.and_then(|m| m.creative_id.clone()),
            rule_name: None,
            is_global_rule: false,
        }
    }
}

fn from_mapping(
    event: &DonationEvent,
    mapping: &CodeMapping,
    score: f64,
    tier: ConfidenceTier,
    method: AttributionMethod,
) -> AttributionResult {
    AttributionResult {
        event_id: event.id,
        channel: mapping.channel.clone(),
        confidence_score: score,
        confidence_tier: tier,
        method,
        matched_ad_id: mapping.ad_id.clone(),
        matched_campaign_id: mapping.campaign_id.clone(),
        matched_creative_id: mapping.creative_id.clone(),
        rule_name: None,
        is_global_rule: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use fundlens_core::types::{
        AdDeliveryMetric, AttributionRule, PatternKind, RuleScope, UNATTRIBUTED_CHANNEL,
    };
    use uuid::Uuid;

    struct Fixture {
        org: Uuid,
        rules: RuleStore,
        spend: ActiveSpendIndex,
        config: AttributionConfig,
    }

    impl Fixture {
        fn new(org: Uuid, extra_rules: Vec<AttributionRule>) -> Self {
            let mut rules = vec![global_rule(
                "meta-prefix",
                "fb_",
                PatternKind::Prefix,
                "meta",
                0.90,
            )];
            rules.extend(extra_rules);
            let mappings = vec![
                CodeMapping {
                    organization_id: org,
                    tracking_code: "jul4_match_ad7".to_string(),
                    channel: "meta".to_string(),
                    ad_id: Some("ad-7".to_string()),
                    campaign_id: Some("camp-1".to_string()),
                    creative_id: Some("cr-7".to_string()),
                },
                CodeMapping {
                    organization_id: org,
                    tracking_code: "newsletter_oct".to_string(),
                    channel: "email".to_string(),
                    ad_id: None,
                    campaign_id: Some("camp-email".to_string()),
                    creative_id: None,
                },
            ];
            let spend = ActiveSpendIndex::from_delivery(&[AdDeliveryMetric {
                ad_id: "ad-9".to_string(),
                organization_id: org,
                campaign_id: "camp-ctv".to_string(),
                channel: "ctv".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 7, 4).unwrap(),
                impressions: 10_000,
                clicks: 40,
                spend: 900.0,
                video_progress: None,
            }]);
            Self {
                org,
                rules: RuleStore::new(rules, mappings).unwrap(),
                spend,
                config: AttributionConfig::default(),
            }
        }

        fn resolver(&self) -> AttributionResolver<'_> {
            AttributionResolver::new(&self.rules, &self.spend, &self.config)
        }

        fn event(&self, code: Option<&str>, click: Option<&str>) -> DonationEvent {
            DonationEvent {
                id: Uuid::new_v4(),
                organization_id: self.org,
                occurred_at: Utc.with_ymd_and_hms(2024, 7, 4, 15, 30, 0).unwrap(),
                amount: 50.0,
                tracking_code: code.map(str::to_string),
                click_id: click.map(str::to_string),
                secondary_click_id: None,
            }
        }
    }

    fn global_rule(
        name: &str,
        pattern: &str,
        kind: PatternKind,
        channel: &str,
        confidence: f64,
    ) -> AttributionRule {
        AttributionRule {
            id: Uuid::new_v4(),
            name: name.to_string(),
            scope: RuleScope::Global,
            pattern: pattern.to_string(),
            pattern_kind: kind,
            channel: channel.to_string(),
            confidence,
            priority: 100,
            active: true,
        }
    }

    #[test]
    fn test_prefix_rule_resolves_high_tier() {
        let fx = Fixture::new(Uuid::new_v4(), vec![]);
        let result = fx.resolver().resolve(&fx.event(Some("fb_summer24"), None));
        assert_eq!(result.channel, "meta");
        assert_eq!(result.confidence_tier, ConfidenceTier::High);
        assert!((result.confidence_score - 0.90).abs() < 1e-9);
        assert_eq!(result.rule_name.as_deref(), Some("meta-prefix"));
        assert!(result.is_global_rule);
    }

    #[test]
    fn test_click_id_beats_unknown_code() {
        let fx = Fixture::new(Uuid::new_v4(), vec![]);
        let result = fx.resolver().resolve(&fx.event(Some("unknown123"), Some("IwAR0abc")));
        assert_eq!(result.channel, "meta");
        assert_eq!(result.confidence_tier, ConfidenceTier::Deterministic);
        assert!((result.confidence_score - 1.0).abs() < f64::EPSILON);
        assert_eq!(result.method, AttributionMethod::ClickId);
    }

    #[test]
    fn test_secondary_click_id_is_deterministic_google() {
        let fx = Fixture::new(Uuid::new_v4(), vec![]);
        let mut event = fx.event(None, None);
        event.secondary_click_id = Some("Cj0KCQ".to_string());
        let result = fx.resolver().resolve(&event);
        assert_eq!(result.channel, "google");
        assert_eq!(result.confidence_tier, ConfidenceTier::Deterministic);
    }

    #[test]
    fn test_click_id_picks_up_mapped_ad() {
        let fx = Fixture::new(Uuid::new_v4(), vec![]);
        let result = fx.resolver().resolve(&fx.event(Some("JUL4_MATCH_AD7"), Some("fbclid")));
        assert_eq!(result.method, AttributionMethod::ClickId);
        assert_eq!(result.matched_ad_id.as_deref(), Some("ad-7"));
        assert_eq!(result.matched_creative_id.as_deref(), Some("cr-7"));
    }

    #[test]
    fn test_exact_mapping_with_ad_is_deterministic() {
        let fx = Fixture::new(Uuid::new_v4(), vec![]);
        let result = fx.resolver().resolve(&fx.event(Some("jul4_match_ad7"), None));
        assert_eq!(result.confidence_tier, ConfidenceTier::Deterministic);
        assert_eq!(result.method, AttributionMethod::ExactMapping);
        assert_eq!(result.matched_campaign_id.as_deref(), Some("camp-1"));
    }

    #[test]
    fn test_channel_only_mapping_is_medium() {
        let fx = Fixture::new(Uuid::new_v4(), vec![]);
        let result = fx.resolver().resolve(&fx.event(Some("newsletter_oct"), None));
        assert_eq!(result.channel, "email");
        assert_eq!(result.confidence_tier, ConfidenceTier::Medium);
        assert!((result.confidence_score - 0.75).abs() < 1e-9);
        assert_eq!(result.method, AttributionMethod::ChannelMapping);
    }

    #[test]
    fn test_pattern_rule_outranks_channel_mapping() {
        let fx = Fixture::new(
            Uuid::new_v4(),
            vec![global_rule(
                "newsletters",
                "newsletter_",
                PatternKind::Prefix,
                "email_rule",
                0.88,
            )],
        );
        let result = fx.resolver().resolve(&fx.event(Some("newsletter_oct"), None));
        assert_eq!(result.channel, "email_rule");
        assert_eq!(result.confidence_tier, ConfidenceTier::High);
    }

    #[test]
    fn test_fuzzy_match_recovers_typo() {
        let fx = Fixture::new(Uuid::new_v4(), vec![]);
        let result = fx.resolver().resolve(&fx.event(Some("newsleter_oct"), None));
        assert_eq!(result.method, AttributionMethod::FuzzyMatch);
        assert_eq!(result.channel, "email");
        assert!(result.confidence_score >= 0.60 && result.confidence_score <= 0.80);
    }

    #[test]
    fn test_fuzzy_never_overrides_pattern_match() {
        // "fb_summer24" also resembles a known code, but the prefix rule wins.
        let org = Uuid::new_v4();
        let mut fx = Fixture::new(org, vec![]);
        fx.rules = RuleStore::new(
            vec![global_rule("meta-prefix", "fb_", PatternKind::Prefix, "meta", 0.90)],
            vec![CodeMapping {
                organization_id: org,
                tracking_code: "fb_summer2024".to_string(),
                channel: "other".to_string(),
                ad_id: None,
                campaign_id: None,
                creative_id: None,
            }],
        )
        .unwrap();
        let result = fx.resolver().resolve(&fx.event(Some("fb_summer24"), None));
        assert_eq!(result.method, AttributionMethod::PatternRule);
        assert_eq!(result.channel, "meta");
    }

    #[test]
    fn test_temporal_fallback_uses_top_spender() {
        let fx = Fixture::new(Uuid::new_v4(), vec![]);
        let result = fx.resolver().resolve(&fx.event(Some("zzz"), None));
        assert_eq!(result.confidence_tier, ConfidenceTier::Low);
        assert_eq!(result.method, AttributionMethod::TemporalCorrelation);
        assert_eq!(result.channel, "ctv");
        assert_eq!(result.matched_campaign_id.as_deref(), Some("camp-ctv"));
        assert!((result.confidence_score - 0.40).abs() < 1e-9);
        assert!(!result.method.is_code_based());
    }

    #[test]
    fn test_no_signal_is_unattributed() {
        let fx = Fixture::new(Uuid::new_v4(), vec![]);
        let mut event = fx.event(None, None);
        event.occurred_at = Utc.with_ymd_and_hms(2024, 8, 1, 9, 0, 0).unwrap();
        let result = fx.resolver().resolve(&event);
        assert_eq!(result.channel, UNATTRIBUTED_CHANNEL);
        assert_eq!(result.confidence_tier, ConfidenceTier::None);
        assert_eq!(result.confidence_score, 0.0);
    }

    #[test]
    fn test_high_tier_score_is_clamped() {
        let fx = Fixture::new(
            Uuid::new_v4(),
            vec![
                global_rule("weak", "weak_", PatternKind::Prefix, "sms", 0.40),
                global_rule("strong", "strong_", PatternKind::Prefix, "sms", 1.0),
            ],
        );
        let weak = fx.resolver().resolve(&fx.event(Some("weak_1"), None));
        let strong = fx.resolver().resolve(&fx.event(Some("strong_1"), None));
        assert!((weak.confidence_score - 0.85).abs() < 1e-9);
        assert!((strong.confidence_score - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_org_rule_overrides_global_rule() {
        let org = Uuid::new_v4();
        let org_rule = AttributionRule {
            scope: RuleScope::Organization(org),
            priority: 500,
            ..global_rule("org-meta", "fb_", PatternKind::Prefix, "meta_paid_social", 0.93)
        };
        let fx = Fixture::new(org, vec![org_rule]);
        let result = fx.resolver().resolve(&fx.event(Some("fb_summer24"), None));
        assert_eq!(result.channel, "meta_paid_social");
        assert!((result.confidence_score - 0.93).abs() < 1e-9);
        assert!(!result.is_global_rule);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let fx = Fixture::new(Uuid::new_v4(), vec![]);
        let event = fx.event(Some("newsleter_oct"), None);
        assert_eq!(fx.resolver().resolve(&event), fx.resolver().resolve(&event));
    }
}
