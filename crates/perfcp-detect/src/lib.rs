// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Windowed t-test detection of performance regressions over ordered
//! revision batches.

pub mod alert;
pub mod grid;
pub mod noise;
pub mod stats;
pub mod window;

pub use alert::{AlertChangeMode, AlertConfig, AlertProperties, Classification, Polarity};
pub use grid::detect_grid;
pub use noise::{NoiseProfile, NoiseProfileError, NoiseStats, deviance};
pub use stats::{Weighting, analyze, t_statistic};
pub use window::{
    ChangePointEvent, INFINITE_STATISTIC_SENTINEL, RegressionDetection, RevisionAnalysis,
    WindowedDetectorConfig, WindowedRegressionDetector, detect,
};
