// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use perfcp_core::{CpError, nearest_matches, normalize_indices};
use std::collections::{BTreeMap, BTreeSet};

/// Change points per annotator for one series.
pub type Annotations = BTreeMap<String, Vec<usize>>;

/// Precision/recall/F1 summary for tolerance-based matching.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct F1Metrics {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl F1Metrics {
    fn perfect(true_positives: usize) -> Self {
        Self {
            true_positives,
            false_positives: 0,
            false_negatives: 0,
            precision: 1.0,
            recall: 1.0,
            f1: 1.0,
        }
    }
}

/// Half-open range `[start, end)` of observation indices.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Jaccard index of the two index ranges.
    pub fn overlap(&self, other: &Self) -> f64 {
        let intersection = self
            .end
            .min(other.end)
            .saturating_sub(self.start.max(other.start));
        let union = self.len() + other.len() - intersection;
        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    }
}

/// Scores reported for one predicted change-point list.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    pub covering: Option<f64>,
}

fn harmonic_mean(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

fn dedup_keep_first(points: &[usize]) -> Vec<usize> {
    let mut seen = BTreeSet::new();
    points
        .iter()
        .copied()
        .filter(|point| seen.insert(*point))
        .collect()
}

fn validate_annotations(annotations: &Annotations, metric: &str) -> Result<(), CpError> {
    if annotations.is_empty() {
        return Err(CpError::input_shape(format!(
            "{metric} needs at least one annotator; got none"
        )));
    }
    Ok(())
}

/// Computes precision, recall, and F1 with greedy one-to-one matching.
///
/// Predicted points are visited in input order and each takes the nearest
/// still-unmatched ground-truth point within `margin`. Two empty lists agree
/// perfectly.
pub fn score(ground_truth: &[usize], predicted: &[usize], margin: usize) -> F1Metrics {
    let truth = normalize_indices(ground_truth);
    let predicted = dedup_keep_first(predicted);
    if truth.is_empty() && predicted.is_empty() {
        return F1Metrics::perfect(0);
    }

    let true_positives = nearest_matches(&truth, &predicted, margin).len();
    let precision = ratio(true_positives, predicted.len());
    let recall = ratio(true_positives, truth.len());

    F1Metrics {
        true_positives,
        false_positives: predicted.len() - true_positives,
        false_negatives: truth.len() - true_positives,
        precision,
        recall,
        f1: harmonic_mean(precision, recall),
    }
}

/// F-measure against several annotators at once.
///
/// Index 0 is added to every annotation and to the prediction, so the start of
/// the series always counts as a shared change point. Precision is measured
/// against the union of all annotations, recall is the mean per-annotator
/// recall.
pub fn multi_annotator_f1(
    annotations: &Annotations,
    predicted: &[usize],
    margin: usize,
) -> Result<F1Metrics, CpError> {
    validate_annotations(annotations, "multi_annotator_f1")?;

    let with_origin = |points: &[usize]| {
        let mut out = points.to_vec();
        out.push(0);
        normalize_indices(&out)
    };
    let predicted = with_origin(predicted);
    let per_annotator: Vec<Vec<usize>> = annotations
        .values()
        .map(|points| with_origin(points))
        .collect();
    let union: Vec<usize> = normalize_indices(&per_annotator.concat());

    let true_positives = nearest_matches(&predicted, &union, margin).len();
    let precision = ratio(true_positives, predicted.len());
    let recall = per_annotator
        .iter()
        .map(|truth| ratio(nearest_matches(&predicted, truth, margin).len(), truth.len()))
        .sum::<f64>()
        / per_annotator.len() as f64;

    Ok(F1Metrics {
        true_positives,
        false_positives: predicted.len() - true_positives,
        false_negatives: union.len() - true_positives,
        precision,
        recall,
        f1: harmonic_mean(precision, recall),
    })
}

/// Splits `[0, n_obs)` at the given change points.
///
/// Index 0 and indices at or beyond `n_obs` open no new segment.
pub fn partition_from_change_points(change_points: &[usize], n_obs: usize) -> Vec<Segment> {
    if n_obs == 0 {
        return vec![];
    }
    let mut segments = Vec::new();
    let mut start = 0usize;
    for point in normalize_indices(change_points) {
        if point == 0 || point >= n_obs {
            continue;
        }
        segments.push(Segment { start, end: point });
        start = point;
    }
    segments.push(Segment { start, end: n_obs });
    segments
}

/// Covering of `annotated` by `predicted`: each annotated segment contributes
/// its length times its best overlap with a predicted segment.
///
/// # Panics
///
/// Panics when the two segmentations cover different numbers of observations,
/// which means one of them was built incorrectly.
pub fn cover_single(predicted: &[Segment], annotated: &[Segment]) -> f64 {
    let total = annotated.iter().map(Segment::len).sum::<usize>();
    let predicted_total = predicted.iter().map(Segment::len).sum::<usize>();
    assert_eq!(
        predicted_total, total,
        "segmentations must tile the same observations"
    );
    if total == 0 {
        return 0.0;
    }

    let weighted = annotated
        .iter()
        .map(|segment| {
            let best = predicted
                .iter()
                .map(|candidate| segment.overlap(candidate))
                .fold(0.0, f64::max);
            segment.len() as f64 * best
        })
        .sum::<f64>();
    weighted / total as f64
}

/// Mean covering of each annotator's segmentation by the predicted one.
pub fn covering(
    annotations: &Annotations,
    predicted: &[usize],
    n_obs: usize,
) -> Result<f64, CpError> {
    if n_obs == 0 {
        return Err(CpError::input_shape("covering requires n_obs >= 1; got 0"));
    }
    validate_annotations(annotations, "covering")?;

    let predicted = partition_from_change_points(predicted, n_obs);
    let total = annotations
        .values()
        .map(|points| cover_single(&predicted, &partition_from_change_points(points, n_obs)))
        .sum::<f64>();
    Ok(total / annotations.len() as f64)
}

/// Averages per-annotator [`score`]s and optionally adds [`covering`].
pub fn evaluate(
    annotations: &Annotations,
    predicted: &[usize],
    margin: usize,
    n_obs: Option<usize>,
) -> Result<EvaluationScores, CpError> {
    validate_annotations(annotations, "evaluate")?;

    let count = annotations.len() as f64;
    let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
    for truth in annotations.values() {
        let metrics = score(truth, predicted, margin);
        precision += metrics.precision;
        recall += metrics.recall;
        f1 += metrics.f1;
    }

    let covering = n_obs
        .map(|n_obs| covering(annotations, predicted, n_obs))
        .transpose()?;

    Ok(EvaluationScores {
        precision: precision / count,
        recall: recall / count,
        f1: f1 / count,
        covering,
    })
}

#[cfg(test)]
mod tests {
    use super::{
        Annotations, Segment, cover_single, covering, evaluate, multi_annotator_f1,
        partition_from_change_points, score,
    };
    use perfcp_core::CpError;

    fn assert_approx_eq(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "expected {expected}, got {actual}"
        );
    }

    fn annotations(entries: &[(&str, &[usize])]) -> Annotations {
        entries
            .iter()
            .map(|(annotator, points)| (annotator.to_string(), points.to_vec()))
            .collect()
    }

    #[test]
    fn score_returns_perfect_agreement_for_two_empty_lists() {
        let metrics = score(&[], &[], 5);
        assert_approx_eq(metrics.precision, 1.0);
        assert_approx_eq(metrics.recall, 1.0);
        assert_approx_eq(metrics.f1, 1.0);
    }

    #[test]
    fn score_matches_within_margin_only() {
        let exact = score(&[10], &[10], 0);
        assert_eq!(exact.true_positives, 1);
        assert_approx_eq(exact.f1, 1.0);

        let near = score(&[10], &[13], 5);
        assert_eq!(near.true_positives, 1);
        assert_approx_eq(near.precision, 1.0);
        assert_approx_eq(near.recall, 1.0);

        let far = score(&[10], &[20], 5);
        assert_eq!(far.true_positives, 0);
        assert_eq!(far.false_positives, 1);
        assert_eq!(far.false_negatives, 1);
        assert_approx_eq(far.precision, 0.0);
        assert_approx_eq(far.recall, 0.0);
        assert_approx_eq(far.f1, 0.0);
    }

    #[test]
    fn score_uses_one_to_one_matching() {
        let metrics = score(&[10, 30], &[9, 11, 31, 31], 2);
        assert_eq!(metrics.true_positives, 2);
        assert_eq!(metrics.false_positives, 1);
        assert_eq!(metrics.false_negatives, 0);
        assert_approx_eq(metrics.precision, 2.0 / 3.0);
        assert_approx_eq(metrics.recall, 1.0);
        assert_approx_eq(metrics.f1, 0.8);
    }

    #[test]
    fn score_with_one_empty_side_is_zero() {
        let metrics = score(&[], &[4], 5);
        assert_approx_eq(metrics.precision, 0.0);
        assert_approx_eq(metrics.f1, 0.0);
        let metrics = score(&[4], &[], 5);
        assert_approx_eq(metrics.recall, 0.0);
        assert_eq!(metrics.false_negatives, 1);
    }

    #[test]
    fn multi_annotator_f1_uses_union_precision_and_mean_recall() {
        let truth = annotations(&[("a", &[10, 20]), ("b", &[10])]);
        let metrics = multi_annotator_f1(&truth, &[11], 5).expect("valid input");
        assert_approx_eq(metrics.precision, 1.0);
        assert_approx_eq(metrics.recall, 5.0 / 6.0);
        assert_approx_eq(metrics.f1, 10.0 / 11.0);
        assert_eq!(metrics.true_positives, 2);
        assert_eq!(metrics.false_negatives, 1);

        let err = multi_annotator_f1(&Annotations::new(), &[1], 5)
            .expect_err("no annotators must fail");
        assert!(matches!(err, CpError::InputShape(_)));
    }

    #[test]
    fn partition_ignores_origin_and_out_of_range_points() {
        let segments = partition_from_change_points(&[0, 7, 3, 3, 10, 12], 10);
        assert_eq!(
            segments,
            vec![
                Segment { start: 0, end: 3 },
                Segment { start: 3, end: 7 },
                Segment { start: 7, end: 10 },
            ]
        );
        assert_eq!(
            partition_from_change_points(&[], 4),
            vec![Segment { start: 0, end: 4 }]
        );
        assert!(partition_from_change_points(&[1], 0).is_empty());
    }

    #[test]
    fn segment_overlap_is_jaccard_index() {
        let a = Segment { start: 0, end: 10 };
        let b = Segment { start: 5, end: 15 };
        assert_approx_eq(a.overlap(&b), 5.0 / 15.0);
        assert_approx_eq(a.overlap(&Segment { start: 10, end: 12 }), 0.0);
        assert_approx_eq(a.overlap(&a), 1.0);
    }

    #[test]
    fn covering_of_identical_segmentation_is_one() {
        let truth = annotations(&[("solo", &[10, 25])]);
        assert_approx_eq(covering(&truth, &[25, 10], 40).expect("valid input"), 1.0);
    }

    #[test]
    fn covering_matches_hand_computed_values() {
        let truth = annotations(&[("a", &[])]);
        assert_approx_eq(covering(&truth, &[5], 10).expect("valid input"), 0.5);

        let truth = annotations(&[("a", &[5])]);
        assert_approx_eq(covering(&truth, &[], 10).expect("valid input"), 0.5);

        // Averaged across annotators.
        let truth = annotations(&[("a", &[5]), ("b", &[])]);
        assert_approx_eq(covering(&truth, &[5], 10).expect("valid input"), 0.75);
    }

    #[test]
    fn covering_rejects_empty_inputs() {
        let truth = annotations(&[("a", &[5])]);
        assert!(matches!(
            covering(&truth, &[5], 0),
            Err(CpError::InputShape(_))
        ));
        assert!(covering(&Annotations::new(), &[5], 10).is_err());
    }

    #[test]
    #[should_panic(expected = "segmentations must tile the same observations")]
    fn cover_single_panics_on_mismatched_tiling() {
        let predicted = [Segment { start: 0, end: 5 }];
        let annotated = [Segment { start: 0, end: 6 }];
        let _ = cover_single(&predicted, &annotated);
    }

    #[test]
    fn evaluate_averages_annotators_and_adds_covering() {
        let truth = annotations(&[("a", &[10]), ("b", &[30])]);
        let scores = evaluate(&truth, &[11], 5, Some(40)).expect("valid input");
        assert_approx_eq(scores.precision, 0.5);
        assert_approx_eq(scores.recall, 0.5);
        assert_approx_eq(scores.f1, 0.5);
        assert!(scores.covering.is_some());

        let scores = evaluate(&truth, &[11], 5, None).expect("valid input");
        assert!(scores.covering.is_none());
        assert!(evaluate(&Annotations::new(), &[11], 5, None).is_err());
    }
}
