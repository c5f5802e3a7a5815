use fundlens_analytics::significance::{
    ExclusionReason, GlobalBaseline, SignificanceEngine, TagDimension, TagGroup,
};
use fundlens_analytics::stats::benjamini_hochberg;
use fundlens_core::config::AnalysisConfig;
use proptest::prelude::*;

proptest! {
    #[test]
    fn adjusted_never_below_raw(raw in proptest::collection::vec(0.0f64..=1.0, 1..60)) {
        let adjusted = benjamini_hochberg(&raw);
        prop_assert_eq!(adjusted.len(), raw.len());
        for (a, p) in adjusted.iter().zip(&raw) {
            prop_assert!(*a >= *p - 1e-15, "adjusted {} below raw {}", a, p);
            prop_assert!(*a <= 1.0);
        }
    }

    #[test]
    fn adjusted_monotone_in_raw_order(raw in proptest::collection::vec(0.0f64..=1.0, 1..60)) {
        let adjusted = benjamini_hochberg(&raw);
        let mut order: Vec<usize> = (0..raw.len()).collect();
        order.sort_by(|&a, &b| raw[a].total_cmp(&raw[b]));
        for pair in order.windows(2) {
            prop_assert!(adjusted[pair[0]] <= adjusted[pair[1]] + 1e-15);
        }
    }

    #[test]
    fn groups_below_minimum_are_never_tested(
        sizes in proptest::collection::vec(0usize..6, 1..12),
        spread in 0.1f64..2.0,
    ) {
        let config = AnalysisConfig::default();
        let engine = SignificanceEngine::new(&config);
        let groups: Vec<TagGroup> = sizes
            .iter()
            .enumerate()
            .map(|(i, &n)| TagGroup {
                dimension: TagDimension::Target,
                value: format!("t{i:02}"),
                returns: (0..n).map(|k| 1.0 + spread * k as f64).collect(),
            })
            .collect();
        let baseline = GlobalBaseline { n: 100, mean: 1.0, std_dev: 1.0 };
        let report = engine.evaluate(groups, &baseline);

        let small = sizes.iter().filter(|&&n| n < config.min_group_size).count();
        prop_assert_eq!(report.groups.len(), sizes.len() - small);
        prop_assert!(report.groups.iter().all(|g| g.n >= config.min_group_size));
        prop_assert_eq!(
            report
                .excluded
                .iter()
                .filter(|e| e.reason == ExclusionReason::InsufficientMembers)
                .count(),
            small
        );
    }
}
