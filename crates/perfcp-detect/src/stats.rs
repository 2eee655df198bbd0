// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use perfcp_core::WindowStats;

/// Per-revision weighting applied when averaging a window.
///
/// Position 0 is the revision adjacent to the candidate point: the most recent
/// one for a historical window, the candidate itself for a forward window.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Weighting {
    #[default]
    Uniform,
    /// `(n - i) / n` for the `i`-th revision of an `n`-revision window.
    Linear,
}

impl Weighting {
    pub fn weight(self, position: usize, window_len: usize) -> f64 {
        match self {
            Self::Uniform => 1.0,
            Self::Linear => {
                if position >= window_len {
                    0.0
                } else {
                    (window_len - position) as f64 / window_len as f64
                }
            }
        }
    }
}

/// Weighted average and sample variance of a window of revisions.
///
/// Every value of a revision shares that revision's weight, so a revision with
/// many repeated measurements counts proportionally more. The variance is
/// taken around the weighted average with an `n - 1` denominator and is 0 for
/// fewer than two values. An empty window summarizes to all zeros.
///
/// Sums are accumulated relative to the first value so that a constant window
/// averages to exactly that constant.
pub fn analyze(window: &[&[f64]], weighting: Weighting) -> WindowStats {
    let window_len = window.len();
    let pivot = window
        .iter()
        .find_map(|values| values.first())
        .copied()
        .unwrap_or(0.0);
    let mut weighted_sum = 0.0;
    let mut sum_of_weights = 0.0;
    let mut n = 0usize;

    for (position, values) in window.iter().enumerate() {
        let weight = weighting.weight(position, window_len);
        weighted_sum += values.iter().map(|value| (value - pivot) * weight).sum::<f64>();
        sum_of_weights += weight * values.len() as f64;
        n += values.len();
    }

    let avg = if window_len > 0 && sum_of_weights > 0.0 {
        pivot + weighted_sum / sum_of_weights
    } else {
        0.0
    };

    let variance = if n > 1 {
        let squared = window
            .iter()
            .flat_map(|values| values.iter())
            .map(|value| (value - avg).powi(2))
            .sum::<f64>();
        squared / (n - 1) as f64
    } else {
        0.0
    };

    WindowStats { avg, n, variance }
}

/// Signed two-sample statistic comparing `forward` against `historical`.
///
/// Returns 0 when either window is empty or the weighted means coincide, and
/// `+inf` when the means differ while both windows have zero variance.
pub fn t_statistic(historical: &[&[f64]], forward: &[&[f64]], weighting: Weighting) -> f64 {
    if historical.is_empty() || forward.is_empty() {
        return 0.0;
    }

    let before = analyze(historical, weighting);
    let after = analyze(forward, weighting);
    let delta = after.avg - before.avg;

    if delta == 0.0 {
        return 0.0;
    }
    if before.variance == 0.0 && after.variance == 0.0 {
        return f64::INFINITY;
    }

    let standard_error =
        (before.variance / before.n as f64 + after.variance / after.n as f64).sqrt();
    delta / standard_error
}
