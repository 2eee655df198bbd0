// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use perfcp_core::normalize_indices;
use std::collections::BTreeSet;

/// How two methods' change points are combined into one list.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairwiseStrategy {
    Union,
    /// Only indices reported by both methods.
    IntersectionStrict,
    /// Indices of the first method confirmed by the second within a margin.
    IntersectionFirst,
}

/// Combines two change-point lists; the result is sorted and deduplicated.
pub fn combine_pair(
    first: &[usize],
    second: &[usize],
    strategy: PairwiseStrategy,
    margin: usize,
) -> Vec<usize> {
    match strategy {
        PairwiseStrategy::Union => {
            let mut all = first.to_vec();
            all.extend_from_slice(second);
            normalize_indices(&all)
        }
        PairwiseStrategy::IntersectionStrict => {
            let second: BTreeSet<usize> = second.iter().copied().collect();
            let shared: Vec<usize> = first
                .iter()
                .copied()
                .filter(|point| second.contains(point))
                .collect();
            normalize_indices(&shared)
        }
        PairwiseStrategy::IntersectionFirst => {
            let reference = normalize_indices(second);
            let confirmed: Vec<usize> = first
                .iter()
                .copied()
                .filter(|&point| {
                    let low = point.saturating_sub(margin);
                    let start = reference.partition_point(|&other| other < low);
                    reference
                        .get(start)
                        .is_some_and(|&other| other <= point.saturating_add(margin))
                })
                .collect();
            normalize_indices(&confirmed)
        }
    }
}
