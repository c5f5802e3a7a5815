use chrono::{Duration, NaiveDate, TimeZone, Utc};
use fundlens_attribution::{
    ActiveSpendIndex, AttributionResolver, BatchAttributionRunner, RuleStore,
};
use fundlens_core::config::AttributionConfig;
use fundlens_core::types::{
    AdDeliveryMetric, AttributionMethod, AttributionRule, CodeMapping, ConfidenceTier,
    DonationEvent, PatternKind, RuleScope,
};
use proptest::prelude::*;
use uuid::Uuid;

fn org() -> Uuid {
    Uuid::from_u128(0x5eed)
}

fn store() -> RuleStore {
    let rule = |name: &str, scope, pattern: &str, kind, channel: &str, confidence, priority| {
        AttributionRule {
            id: Uuid::new_v4(),
            name: name.to_string(),
            scope,
            pattern: pattern.to_string(),
            pattern_kind: kind,
            channel: channel.to_string(),
            confidence,
            priority,
            active: true,
        }
    };
    let mapping = |code: &str, channel: &str, ad: Option<&str>| CodeMapping {
        organization_id: org(),
        tracking_code: code.to_string(),
        channel: channel.to_string(),
        ad_id: ad.map(str::to_string),
        campaign_id: Some(format!("camp-{channel}")),
        creative_id: None,
    };
    RuleStore::new(
        vec![
            rule("meta", RuleScope::Global, "fb_", PatternKind::Prefix, "meta", 0.90, 10),
            rule("sms", RuleScope::Global, "_sms", PatternKind::Suffix, "sms", 0.70, 20),
            rule("ctv", RuleScope::Global, r"^ctv\d+", PatternKind::Regex, "ctv", 0.99, 30),
            rule(
                "org-meta",
                RuleScope::Organization(org()),
                "fb_vip",
                PatternKind::Prefix,
                "meta_vip",
                0.92,
                99,
            ),
        ],
        vec![
            mapping("jul4_match_ad7", "meta", Some("ad-7")),
            mapping("newsletter_oct", "email", None),
            mapping("gotv_texts", "sms", None),
        ],
    )
    .unwrap()
}

fn spend() -> ActiveSpendIndex {
    let start = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
    let rows: Vec<AdDeliveryMetric> = (0..10)
        .map(|d| AdDeliveryMetric {
            ad_id: format!("ad-{d}"),
            organization_id: org(),
            campaign_id: format!("camp-{}", d % 3),
            channel: "meta".to_string(),
            date: start + Duration::days(d),
            impressions: 5_000,
            clicks: 50,
            spend: 100.0 + d as f64,
            video_progress: None,
        })
        .collect();
    ActiveSpendIndex::from_delivery(&rows)
}

fn code_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("fb_summer24".to_string())),
        Just(Some("fb_vip_gala".to_string())),
        Just(Some("oct_sms".to_string())),
        Just(Some("ctv123".to_string())),
        Just(Some("jul4_match_ad7".to_string())),
        Just(Some("newsletter_oct".to_string())),
        Just(Some("newsleter_oct".to_string())),
        Just(Some("gotv_text".to_string())),
        "[a-z0-9_]{0,16}".prop_map(Some),
    ]
}

fn event_strategy() -> impl Strategy<Value = DonationEvent> {
    (
        code_strategy(),
        proptest::option::of("[A-Za-z0-9]{4,12}"),
        proptest::option::of("[A-Za-z0-9]{4,12}"),
        0i64..20,
        1u32..50_000,
    )
        .prop_map(|(code, click, secondary, day, cents)| DonationEvent {
            id: Uuid::new_v4(),
            organization_id: org(),
            occurred_at: Utc.with_ymd_and_hms(2024, 6, 25, 12, 0, 0).unwrap() + Duration::days(day),
            amount: cents as f64 / 100.0,
            tracking_code: code,
            click_id: click,
            secondary_click_id: secondary,
        })
}

fn score_range(tier: ConfidenceTier) -> (f64, f64) {
    match tier {
        ConfidenceTier::Deterministic => (1.0, 1.0),
        ConfidenceTier::High => (0.85, 0.95),
        ConfidenceTier::Medium => (0.60, 0.80),
        ConfidenceTier::Low => (0.40, 0.40),
        ConfidenceTier::None => (0.0, 0.0),
    }
}

proptest! {
    #[test]
    fn resolve_is_idempotent(event in event_strategy()) {
        let (rules, spend, config) = (store(), spend(), AttributionConfig::default());
        let resolver = AttributionResolver::new(&rules, &spend, &config);
        prop_assert_eq!(resolver.resolve(&event), resolver.resolve(&event));
    }

    #[test]
    fn scores_stay_inside_their_tier_band(event in event_strategy()) {
        let (rules, spend, config) = (store(), spend(), AttributionConfig::default());
        let result = AttributionResolver::new(&rules, &spend, &config).resolve(&event);
        let (lo, hi) = score_range(result.confidence_tier);
        prop_assert!(
            result.confidence_score >= lo - 1e-9 && result.confidence_score <= hi + 1e-9,
            "{:?} scored {}", result.confidence_tier, result.confidence_score
        );
    }

    #[test]
    fn click_identifier_is_never_downgraded(event in event_strategy()) {
        let (rules, spend, config) = (store(), spend(), AttributionConfig::default());
        let result = AttributionResolver::new(&rules, &spend, &config).resolve(&event);
        if event.has_click_id() || event.has_secondary_click_id() {
            prop_assert_eq!(result.confidence_tier, ConfidenceTier::Deterministic);
        }
        if result.method == AttributionMethod::TemporalCorrelation {
            prop_assert!(!event.has_click_id());
            let code = event.normalized_code();
            prop_assert!(
                code.is_none() || rules.match_rule(org(), code.as_deref().unwrap_or("")).is_none()
            );
        }
    }

    #[test]
    fn batch_order_does_not_change_results(
        events in proptest::collection::vec(event_strategy(), 0..40)
    ) {
        let (rules, spend, config) = (store(), spend(), AttributionConfig::default());
        let runner = BatchAttributionRunner::new(AttributionResolver::new(&rules, &spend, &config));

        let forward = runner.run(&events);
        let mut reversed_events = events.clone();
        reversed_events.reverse();
        let mut reversed = runner.run(&reversed_events).results;
        reversed.reverse();

        prop_assert_eq!(forward.results, reversed);
    }
}

#[test]
fn confidence_strictly_orders_tiers() {
    let tiers = ConfidenceTier::ALL;
    for pair in tiers.windows(2) {
        let (_, weaker_high) = score_range(pair[1]);
        let (stronger_low, _) = score_range(pair[0]);
        assert!(stronger_low > weaker_high, "{:?} vs {:?}", pair[0], pair[1]);
    }
}
