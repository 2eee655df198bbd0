// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]

#[path = "common.rs"]
mod common;

use libfuzzer_sys::fuzz_target;
use perfcp_consensus::{
    CandidateSets, PairwiseStrategy, aggregate, aggregate_with_veto, combine_pair,
};
use perfcp_eval::{Annotations, covering, evaluate, multi_annotator_f1, score};

const INDEX_LIMIT: usize = 2_048;

fuzz_target!(|data: &[u8]| {
    let mut cursor = common::ByteCursor::new(data);

    let method_count = common::bounded(cursor.next_u8(), 0, 8);
    let sets: CandidateSets = (0..method_count)
        .map(|method| {
            (
                format!("m{method}"),
                common::index_list(&mut cursor, 48, INDEX_LIMIT),
            )
        })
        .collect();
    let veto = common::index_list(&mut cursor, 16, INDEX_LIMIT);
    let min_votes = common::bounded(cursor.next_u8(), 0, 9);
    let margin = common::bounded(cursor.next_u8(), 0, 64);

    let quorum = aggregate(&sets, min_votes, margin);
    let vetoed = aggregate_with_veto(&veto, &sets, min_votes, margin);
    assert_eq!(quorum.is_err(), min_votes == 0);
    if let Ok(points) = &vetoed {
        assert!(veto.iter().all(|point| points.contains(point)));
    }

    let first = sets.values().next().cloned().unwrap_or_default();
    for strategy in [
        PairwiseStrategy::Union,
        PairwiseStrategy::IntersectionStrict,
        PairwiseStrategy::IntersectionFirst,
    ] {
        let combined = combine_pair(&first, &veto, strategy, margin);
        assert!(combined.windows(2).all(|pair| pair[0] < pair[1]));
    }

    let annotations: Annotations = sets
        .iter()
        .take(3)
        .map(|(method, points)| (method.clone(), points.clone()))
        .collect();
    let predicted = quorum.unwrap_or_default();
    let n_obs = common::bounded(cursor.next_u8(), 0, 255) * 8;

    let metrics = score(&first, &predicted, margin);
    assert!((0.0..=1.0).contains(&metrics.f1));
    let _ = multi_annotator_f1(&annotations, &predicted, margin);
    let _ = evaluate(&annotations, &predicted, margin, Some(n_obs));
    if let Ok(value) = covering(&annotations, &veto, n_obs) {
        assert!(value.is_finite());
    }
});
