// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Document-level operations behind the `perfcp` binary.
//!
//! Everything here works on parsed JSON documents so the binary only handles
//! argument parsing and file I/O.

use perfcp_consensus::{
    CandidateSets, ClusterVote, ConsensusAggregator, ConsensusConfig, PairwiseStrategy,
    combine_pair,
};
use perfcp_core::{CpError, RevisionDatum, TimeSeriesRecord};
use perfcp_detect::{
    ChangePointEvent, Classification, INFINITE_STATISTIC_SENTINEL, RegressionDetection,
    WindowedDetectorConfig, detect_grid,
};
use perfcp_eval::{Annotations, EvaluationScores, F1Metrics, evaluate, multi_annotator_f1};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Fail,
}

/// One emitted change point in its storable form.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EventOutput {
    /// Index into the unique-timestamp sequence of the input record.
    pub location: usize,
    pub timestamp: String,
    /// Infinite statistics are stored as [`INFINITE_STATISTIC_SENTINEL`].
    pub statistic: f64,
    pub classification: Classification,
    pub is_regression: bool,
    pub pct_change: f64,
    pub abs_delta: f64,
    pub prev_value: f64,
    pub new_value: f64,
    pub noise_profile: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectResultOutput {
    pub cplocations: Vec<usize>,
    pub events: Vec<EventOutput>,
    /// Locations marked as changes but below the alert threshold.
    pub suppressed: Vec<usize>,
    pub runtime_ms: Option<u64>,
    pub warnings: Vec<String>,
}

/// Outcome of one detector configuration.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectOutcome {
    pub status: RunStatus,
    pub parameters: WindowedDetectorConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DetectResultOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectOutcome {
    fn success(parameters: WindowedDetectorConfig, result: DetectResultOutput) -> Self {
        Self {
            status: RunStatus::Success,
            parameters,
            result: Some(result),
            error: None,
        }
    }

    fn failure(parameters: WindowedDetectorConfig, err: &CpError) -> Self {
        Self {
            status: RunStatus::Fail,
            parameters,
            result: None,
            error: Some(err.to_string()),
        }
    }
}

fn event_output(
    record: &TimeSeriesRecord,
    event: &ChangePointEvent<String>,
) -> Option<EventOutput> {
    let location = record.index_of(&event.key)?;
    Some(EventOutput {
        location,
        timestamp: event.key.clone(),
        statistic: event.storable_statistic(INFINITE_STATISTIC_SENTINEL),
        classification: event.classification,
        is_regression: event.is_regression(),
        pct_change: event.pct_change,
        abs_delta: event.abs_delta,
        prev_value: event.prev_value,
        new_value: event.new_value,
        noise_profile: event.noise_profile.map(|profile| profile.as_str().to_string()),
    })
}

fn detection_output(
    record: &TimeSeriesRecord,
    revisions: &[RevisionDatum<String>],
    detection: &RegressionDetection<String>,
) -> DetectResultOutput {
    let events: Vec<EventOutput> = detection
        .events
        .iter()
        .filter_map(|event| event_output(record, event))
        .collect();
    let suppressed = record.indices_of(
        detection
            .suppressed
            .iter()
            .filter_map(|&index| revisions.get(index))
            .map(|revision| revision.key.as_str()),
    );

    DetectResultOutput {
        cplocations: events.iter().map(|event| event.location).collect(),
        events,
        suppressed,
        runtime_ms: detection.diagnostics.runtime_ms,
        warnings: detection.diagnostics.warnings.clone(),
    }
}

/// Runs every configuration over one record.
///
/// A malformed record fails the whole call; a failing configuration is
/// reported as a `FAIL` entry and the remaining configurations still run.
pub fn run_detect(
    record: &TimeSeriesRecord,
    configs: &[WindowedDetectorConfig],
) -> Result<Vec<DetectOutcome>, CpError> {
    let revisions = record.revisions()?;

    Ok(detect_grid(&revisions, configs)
        .into_iter()
        .zip(configs)
        .map(|(outcome, config)| match outcome {
            Ok(detection) => DetectOutcome::success(
                config.clone(),
                detection_output(record, &revisions, &detection),
            ),
            Err(err) => DetectOutcome::failure(config.clone(), &err),
        })
        .collect())
}

/// How candidate sets are merged by [`run_vote`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteMode {
    Quorum,
    /// The named method's points are always kept; the rest vote around them.
    Veto { method: String },
    Pairwise {
        strategy: PairwiseStrategy,
        first: String,
        second: String,
    },
}

impl VoteMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Quorum => "quorum",
            Self::Veto { .. } => "veto",
            Self::Pairwise { .. } => "pairwise",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VoteOutput {
    pub mode: &'static str,
    pub cplocations: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<ClusterVote>,
}

fn method_points<'a>(sets: &'a CandidateSets, method: &str) -> Result<&'a [usize], CpError> {
    sets.get(method).map(Vec::as_slice).ok_or_else(|| {
        CpError::input_shape(format!("method '{method}' is not present in the candidate sets"))
    })
}

pub fn run_vote(
    sets: &CandidateSets,
    mode: &VoteMode,
    config: ConsensusConfig,
) -> Result<VoteOutput, CpError> {
    let (cplocations, clusters) = match mode {
        VoteMode::Quorum => {
            let result = ConsensusAggregator::new(config)?.aggregate(sets);
            (result.change_points, result.clusters)
        }
        VoteMode::Veto { method } => {
            let aggregator = ConsensusAggregator::new(config)?;
            let veto = method_points(sets, method)?.to_vec();
            let mut voters = sets.clone();
            voters.remove(method);
            let result = aggregator.aggregate_with_veto(&veto, &voters);
            (result.change_points, result.clusters)
        }
        VoteMode::Pairwise {
            strategy,
            first,
            second,
        } => {
            let first = method_points(sets, first)?;
            let second = method_points(sets, second)?;
            (
                combine_pair(first, second, *strategy, config.margin),
                Vec::new(),
            )
        }
    };

    Ok(VoteOutput {
        mode: mode.as_str(),
        cplocations,
        clusters,
    })
}

/// A prediction file: either a bare index list or any object carrying
/// `cplocations` (such as `perfcp vote` output).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PredictionDocument {
    Points(Vec<usize>),
    Located { cplocations: Vec<usize> },
}

impl PredictionDocument {
    pub fn into_points(self) -> Vec<usize> {
        match self {
            Self::Points(points) | Self::Located { cplocations: points } => points,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvalOutput {
    pub margin: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_obs: Option<usize>,
    pub scores: EvaluationScores,
    pub multi_annotator: F1Metrics,
}

pub fn run_eval(
    annotations: &Annotations,
    predicted: &[usize],
    margin: usize,
    n_obs: Option<usize>,
) -> Result<EvalOutput, CpError> {
    Ok(EvalOutput {
        margin,
        n_obs,
        scores: evaluate(annotations, predicted, margin, n_obs)?,
        multi_annotator: multi_annotator_f1(annotations, predicted, margin)?,
    })
}
