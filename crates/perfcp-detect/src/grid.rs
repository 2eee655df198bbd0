// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::window::{RegressionDetection, WindowedDetectorConfig, WindowedRegressionDetector};
use perfcp_core::{CpError, RevisionDatum};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use tracing::warn;

fn run_one<K: Ord + Clone>(
    revisions: &[RevisionDatum<K>],
    position: usize,
    config: &WindowedDetectorConfig,
) -> Result<RegressionDetection<K>, CpError> {
    let outcome = WindowedRegressionDetector::new(config.clone())
        .and_then(|detector| detector.detect(revisions));
    if let Err(err) = &outcome {
        warn!(configuration = position, error = %err, "detector configuration failed");
    }
    outcome
}

/// Runs one detector per configuration over the same revisions.
///
/// Results come back in configuration order and a failing configuration only
/// affects its own slot. With the `rayon` feature configurations run in
/// parallel.
pub fn detect_grid<K>(
    revisions: &[RevisionDatum<K>],
    configs: &[WindowedDetectorConfig],
) -> Vec<Result<RegressionDetection<K>, CpError>>
where
    K: Ord + Clone + Send + Sync,
{
    #[cfg(feature = "rayon")]
    {
        configs
            .par_iter()
            .enumerate()
            .map(|(position, config)| run_one(revisions, position, config))
            .collect()
    }

    #[cfg(not(feature = "rayon"))]
    {
        configs
            .iter()
            .enumerate()
            .map(|(position, config)| run_one(revisions, position, config))
            .collect()
    }
}
