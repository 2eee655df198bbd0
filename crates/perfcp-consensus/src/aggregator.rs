// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use perfcp_core::{
    Cluster, ClusterPolicy, CpError, Representative, cluster_points, consolidate,
    normalize_indices,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

const DEFAULT_MIN_VOTES: usize = 3;
const DEFAULT_MARGIN: usize = 5;

/// Candidate change points keyed by method (or method/configuration) name.
pub type CandidateSets = BTreeMap<String, Vec<usize>>;

/// Configuration for [`ConsensusAggregator`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsensusConfig {
    /// Distinct methods that must agree for a cluster to be kept.
    pub min_votes: usize,
    pub margin: usize,
    /// Representative used by quorum voting.
    pub strategy: Representative,
    /// Representative used for clusters voted next to a veto method.
    pub veto_strategy: Representative,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_votes: DEFAULT_MIN_VOTES,
            margin: DEFAULT_MARGIN,
            strategy: Representative::Median,
            veto_strategy: Representative::Mean,
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> Result<(), CpError> {
        if self.min_votes == 0 {
            return Err(CpError::input_shape(
                "ConsensusConfig.min_votes must be >= 1; got 0",
            ));
        }
        Ok(())
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    Accepted,
    BelowQuorum,
    /// Enough votes, but the representative duplicates a veto point.
    CoveredByVeto,
}

/// How one global cluster was voted on.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterVote {
    pub members: Vec<usize>,
    /// Methods with at least one point within margin of a member, sorted.
    pub methods: Vec<String>,
    /// Those methods' points, ascending; duplicates across methods are kept.
    pub supporting_points: Vec<usize>,
    pub representative: usize,
    pub outcome: VoteOutcome,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsensusResult {
    /// Final sorted, deduplicated change points.
    pub change_points: Vec<usize>,
    pub clusters: Vec<ClusterVote>,
}

/// Merges candidate sets from independent detectors into one change-point list.
#[derive(Debug)]
pub struct ConsensusAggregator {
    config: ConsensusConfig,
}

impl ConsensusAggregator {
    pub fn new(config: ConsensusConfig) -> Result<Self, CpError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Quorum voting.
    ///
    /// Each method is first consolidated on its own so a method reporting a
    /// burst of nearby points still casts one vote. Consolidated points are
    /// pooled, clustered sequentially, and a cluster survives when at least
    /// `min_votes` distinct methods have a point within `margin` of it.
    /// Surviving representatives are clustered once more to merge residual
    /// near-duplicates.
    pub fn aggregate(&self, sets: &CandidateSets) -> ConsensusResult {
        let ConsensusConfig {
            min_votes,
            margin,
            strategy,
            ..
        } = self.config;

        let consolidated: BTreeMap<&str, Vec<usize>> = sets
            .iter()
            .map(|(method, points)| (method.as_str(), consolidate(points, margin, strategy)))
            .collect();
        let pooled = pool(consolidated.values().map(Vec::as_slice));
        if pooled.is_empty() {
            return ConsensusResult::default();
        }

        let mut clusters = Vec::new();
        let mut merged = Vec::new();
        for cluster in cluster_points(&pooled, margin, ClusterPolicy::Sequential) {
            let (methods, supporting_points) = tally(
                &cluster,
                consolidated
                    .iter()
                    .map(|(method, points)| (*method, points.as_slice())),
                margin,
            );
            let representative = strategy
                .of(&supporting_points)
                .unwrap_or_else(|| cluster.first());
            let outcome = if methods.len() >= min_votes {
                merged.push(representative);
                VoteOutcome::Accepted
            } else {
                VoteOutcome::BelowQuorum
            };
            clusters.push(ClusterVote {
                members: cluster.into_members(),
                methods,
                supporting_points,
                representative,
                outcome,
            });
        }

        // Residual near-duplicates always collapse to their median.
        let change_points =
            normalize_indices(&consolidate(&merged, margin, Representative::Median));
        debug!(
            methods = sets.len(),
            clusters = clusters.len(),
            accepted = change_points.len(),
            "quorum voting finished"
        );
        ConsensusResult {
            change_points,
            clusters,
        }
    }

    /// Veto voting.
    ///
    /// Every veto point is kept unconditionally. The other methods' raw points
    /// are clustered around running centroids; a cluster with at least
    /// `min_votes` distinct methods adds its representative unless that lies
    /// within `margin` of a veto point.
    pub fn aggregate_with_veto(&self, veto: &[usize], sets: &CandidateSets) -> ConsensusResult {
        let ConsensusConfig {
            min_votes,
            margin,
            veto_strategy,
            ..
        } = self.config;

        let mut merged: BTreeSet<usize> = veto.iter().copied().collect();
        let pooled = pool(sets.values().map(Vec::as_slice));

        let mut clusters = Vec::new();
        for cluster in cluster_points(&pooled, margin, ClusterPolicy::Centroid) {
            let (methods, supporting_points) = tally(
                &cluster,
                sets.iter()
                    .map(|(method, points)| (method.as_str(), points.as_slice())),
                margin,
            );
            let representative = veto_strategy
                .of(&supporting_points)
                .unwrap_or_else(|| cluster.first());
            let outcome = if methods.len() < min_votes {
                VoteOutcome::BelowQuorum
            } else if veto
                .iter()
                .any(|&point| point.abs_diff(representative) <= margin)
            {
                VoteOutcome::CoveredByVeto
            } else {
                merged.insert(representative);
                VoteOutcome::Accepted
            };
            clusters.push(ClusterVote {
                members: cluster.into_members(),
                methods,
                supporting_points,
                representative,
                outcome,
            });
        }

        debug!(
            veto_points = veto.len(),
            methods = sets.len(),
            clusters = clusters.len(),
            accepted = merged.len(),
            "veto voting finished"
        );
        ConsensusResult {
            change_points: merged.into_iter().collect(),
            clusters,
        }
    }
}

fn pool<'a>(sets: impl Iterator<Item = &'a [usize]>) -> Vec<usize> {
    let all: Vec<usize> = sets.flat_map(|points| points.iter().copied()).collect();
    normalize_indices(&all)
}

/// Methods voting for `cluster` and the points they vote with.
fn tally<'a>(
    cluster: &Cluster,
    sets: impl Iterator<Item = (&'a str, &'a [usize])>,
    margin: usize,
) -> (Vec<String>, Vec<usize>) {
    let mut methods = Vec::new();
    let mut supporting_points = Vec::new();
    for (method, points) in sets {
        let before = supporting_points.len();
        supporting_points.extend(
            points
                .iter()
                .copied()
                .filter(|&point| cluster.is_near(point, margin)),
        );
        if supporting_points.len() > before {
            methods.push(method.to_string());
        }
    }
    supporting_points.sort_unstable();
    (methods, supporting_points)
}

/// Quorum voting with median representatives.
pub fn aggregate(
    sets: &CandidateSets,
    min_votes: usize,
    margin: usize,
) -> Result<Vec<usize>, CpError> {
    let aggregator = ConsensusAggregator::new(ConsensusConfig {
        min_votes,
        margin,
        ..ConsensusConfig::default()
    })?;
    Ok(aggregator.aggregate(sets).change_points)
}

/// Veto voting with mean representatives.
pub fn aggregate_with_veto(
    veto: &[usize],
    sets: &CandidateSets,
    min_votes: usize,
    margin: usize,
) -> Result<Vec<usize>, CpError> {
    let aggregator = ConsensusAggregator::new(ConsensusConfig {
        min_votes,
        margin,
        ..ConsensusConfig::default()
    })?;
    Ok(aggregator.aggregate_with_veto(veto, sets).change_points)
}
