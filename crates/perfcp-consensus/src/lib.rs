// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Consensus voting over change points reported by independent detectors.

pub mod aggregator;
pub mod pairwise;

pub use aggregator::{
    CandidateSets, ClusterVote, ConsensusAggregator, ConsensusConfig, ConsensusResult,
    VoteOutcome, aggregate, aggregate_with_veto,
};
pub use pairwise::{PairwiseStrategy, combine_pair};
