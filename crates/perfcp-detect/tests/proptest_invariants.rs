// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use perfcp_core::{RevisionDatum, bucket_observations};
use perfcp_detect::{WindowedDetectorConfig, WindowedRegressionDetector};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

const MIN_PROPTEST_CASES: u32 = 256;

fn proptest_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .map(|parsed| parsed.max(MIN_PROPTEST_CASES))
        .unwrap_or(MIN_PROPTEST_CASES)
}

fn revisions_from(batches: &[Vec<f64>]) -> Vec<RevisionDatum<usize>> {
    batches
        .iter()
        .enumerate()
        .map(|(key, values)| RevisionDatum::new(key, values.clone()).expect("generated values"))
        .collect()
}

fn batch_strategy(max_revisions: usize) -> impl Strategy<Value = Vec<Vec<f64>>> {
    prop::collection::vec(prop::collection::vec(1.0f64..100.0, 1..4), 0..max_revisions)
}

fn config_strategy() -> impl Strategy<Value = WindowedDetectorConfig> {
    (1usize..8, 0usize..8, 1usize..8, 0.5f64..10.0).prop_map(
        |(min_back_window, extra_back, fore_window, threshold)| WindowedDetectorConfig {
            min_back_window,
            max_back_window: min_back_window + extra_back,
            fore_window,
            threshold,
            ..WindowedDetectorConfig::default()
        },
    )
}

#[test]
fn duplicate_timestamps_collapse_before_detection() {
    let mut observations = Vec::new();
    for key in 0..30u32 {
        let value = if key < 15 { 3.0 } else { 6.0 };
        observations.push((key, value));
        observations.push((key, value));
    }
    let revisions = bucket_observations(observations).expect("bucketing should succeed");
    assert_eq!(revisions.len(), 30);

    let detection = WindowedRegressionDetector::new(WindowedDetectorConfig::default())
        .expect("valid config")
        .detect(&revisions)
        .expect("detection should succeed");
    assert_eq!(detection.change_indices(), vec![15]);
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: proptest_cases(),
        max_shrink_iters: 1024,
        max_global_rejects: 16384,
        failure_persistence: Some(Box::new(FileFailurePersistence::Direct("proptest-regressions/tests/proptest_invariants.txt"))),
        .. ProptestConfig::default()
    })]

    #[test]
    fn too_few_values_never_produce_events(
        batches in batch_strategy(24),
        config in config_strategy(),
    ) {
        let total: usize = batches.iter().map(Vec::len).sum();
        prop_assume!(total < config.min_back_window + config.fore_window);

        let detection = WindowedRegressionDetector::new(config)
            .expect("generated config is valid")
            .detect(&revisions_from(&batches))
            .expect("short input is not an error");
        prop_assert!(detection.events.is_empty());
        prop_assert!(detection.analyses.iter().all(|analysis| !analysis.is_change));
    }

    #[test]
    fn changes_are_eligible_local_maxima_above_threshold(
        batches in batch_strategy(64),
        config in config_strategy(),
    ) {
        let detection = WindowedRegressionDetector::new(config.clone())
            .expect("generated config is valid")
            .detect(&revisions_from(&batches))
            .expect("detection should succeed");
        let analyses = &detection.analyses;
        prop_assert_eq!(analyses.len(), batches.len());

        for (idx, analysis) in analyses.iter().enumerate() {
            let eligible = idx > 0
                && analysis.amount_prev >= config.min_back_window
                && analysis.amount_next >= config.fore_window;
            let local_max = idx > 0
                && analyses[idx - 1].statistic <= analysis.statistic
                && analyses
                    .get(idx + 1)
                    .is_none_or(|next| next.statistic <= analysis.statistic);
            prop_assert_eq!(
                analysis.is_change,
                eligible && local_max && analysis.statistic > config.threshold
            );
            if !analysis.is_change {
                continue;
            }
            prop_assert!(idx > 0);
            prop_assert!(analysis.statistic > config.threshold);
            prop_assert!(analysis.amount_prev >= config.min_back_window);
            prop_assert!(analysis.amount_next >= config.fore_window);
            prop_assert!(analyses[idx - 1].statistic <= analysis.statistic);
            if let Some(next) = analyses.get(idx + 1) {
                prop_assert!(next.statistic <= analysis.statistic);
            }
        }

        let mut marked: Vec<usize> = detection.change_indices();
        marked.extend(detection.suppressed.iter().copied());
        marked.sort_unstable();
        let expected: Vec<usize> = analyses
            .iter()
            .enumerate()
            .filter(|(_, analysis)| analysis.is_change)
            .map(|(idx, _)| idx)
            .collect();
        prop_assert_eq!(marked, expected);
    }

    #[test]
    fn detection_is_deterministic(
        batches in batch_strategy(48),
        config in config_strategy(),
    ) {
        let revisions = revisions_from(&batches);
        let detector = WindowedRegressionDetector::new(config).expect("generated config is valid");
        let first = detector.detect(&revisions).expect("first run succeeds");
        let second = detector.detect(&revisions).expect("second run succeeds");
        prop_assert_eq!(first.change_indices(), second.change_indices());
        prop_assert_eq!(first.suppressed, second.suppressed);
    }

    #[test]
    fn single_sharp_shift_is_the_only_event(
        change_at in 12usize..40,
        tail in 12usize..30,
        base in 1.0f64..50.0,
        jump in 5.0f64..50.0,
    ) {
        let n = change_at + tail;
        let batches: Vec<Vec<f64>> = (0..n)
            .map(|idx| vec![if idx < change_at { base } else { base + jump }])
            .collect();
        let events = perfcp_detect::detect(&revisions_from(&batches), 12, 24, 12, 7.0)
            .expect("detection should succeed");
        prop_assert_eq!(events.len(), 1);
        prop_assert_eq!(events[0].index, change_at);
    }
}
