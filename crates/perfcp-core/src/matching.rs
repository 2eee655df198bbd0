// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

/// Greedy one-to-one tolerance matching.
///
/// Each query, in the order given, takes the nearest reference index that is
/// still unmatched and lies within `margin`; on equal distance the smaller
/// reference wins. Returns `(query, reference)` pairs in match order.
/// Duplicate references are treated as one point.
pub fn nearest_matches(
    reference: &[usize],
    queries: &[usize],
    margin: usize,
) -> Vec<(usize, usize)> {
    let mut sorted_reference = reference.to_vec();
    sorted_reference.sort_unstable();
    sorted_reference.dedup();

    let mut used = vec![false; sorted_reference.len()];
    let mut pairs = Vec::with_capacity(queries.len().min(sorted_reference.len()));

    for &query in queries {
        let low = query.saturating_sub(margin);
        let high = query.saturating_add(margin);
        let start = sorted_reference.partition_point(|&candidate| candidate < low);

        let mut best: Option<(usize, usize)> = None;
        for (offset, &candidate) in sorted_reference[start..].iter().enumerate() {
            if candidate > high {
                break;
            }
            let slot = start + offset;
            if used[slot] {
                continue;
            }
            let distance = candidate.abs_diff(query);
            if best.is_none_or(|(best_distance, _)| distance < best_distance) {
                best = Some((distance, slot));
            }
        }

        if let Some((_, slot)) = best {
            used[slot] = true;
            pairs.push((query, sorted_reference[slot]));
        }
    }

    pairs
}
