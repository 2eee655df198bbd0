// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Shared building blocks for the perfcp workspace: revision batches, index
//! clustering, tolerance matching, and the external time-series record.

pub mod cluster;
pub mod diagnostics;
pub mod error;
pub mod matching;
pub mod revision;
pub mod time_series;

pub use cluster::{Cluster, ClusterPolicy, Representative, cluster_points, consolidate};
pub use diagnostics::{DIAGNOSTICS_SCHEMA_VERSION, Diagnostics};
pub use error::CpError;
pub use matching::nearest_matches;
pub use revision::{RevisionDatum, WindowStats, bucket_observations, validate_revision_order};
pub use time_series::{SeriesColumn, TimeColumn, TimeSeriesRecord};

/// Sorts and deduplicates a list of change-point indices.
pub fn normalize_indices(points: &[usize]) -> Vec<usize> {
    let mut out = points.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}
