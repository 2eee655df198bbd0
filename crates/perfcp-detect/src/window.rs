// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::alert::{AlertConfig, AlertProperties, Classification};
use crate::noise::{NoiseProfile, NoiseProfileError, deviance};
use crate::stats::{Weighting, analyze, t_statistic};
use perfcp_core::{CpError, Diagnostics, RevisionDatum, WindowStats, validate_revision_order};
use std::time::Instant;
use tracing::{debug, warn};

const DEFAULT_MIN_BACK_WINDOW: usize = 12;
const DEFAULT_MAX_BACK_WINDOW: usize = 24;
const DEFAULT_FORE_WINDOW: usize = 12;
const DEFAULT_THRESHOLD: f64 = 7.0;

/// Value substituted for an infinite statistic by
/// [`ChangePointEvent::storable_statistic`] callers that store events.
pub const INFINITE_STATISTIC_SENTINEL: f64 = 1000.0;

/// Configuration for [`WindowedRegressionDetector`].
///
/// Window sizes count measurements, not revisions.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct WindowedDetectorConfig {
    pub min_back_window: usize,
    pub max_back_window: usize,
    pub fore_window: usize,
    pub threshold: f64,
    pub alert: AlertConfig,
    pub noise_profiling: bool,
}

impl Default for WindowedDetectorConfig {
    fn default() -> Self {
        Self {
            min_back_window: DEFAULT_MIN_BACK_WINDOW,
            max_back_window: DEFAULT_MAX_BACK_WINDOW,
            fore_window: DEFAULT_FORE_WINDOW,
            threshold: DEFAULT_THRESHOLD,
            alert: AlertConfig::default(),
            noise_profiling: true,
        }
    }
}

impl WindowedDetectorConfig {
    pub fn validate(&self) -> Result<(), CpError> {
        if self.min_back_window > self.max_back_window {
            return Err(CpError::input_shape(format!(
                "WindowedDetectorConfig.min_back_window={} exceeds max_back_window={}",
                self.min_back_window, self.max_back_window
            )));
        }
        if self.fore_window == 0 {
            return Err(CpError::input_shape(
                "WindowedDetectorConfig.fore_window must be >= 1; got 0",
            ));
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(CpError::input_shape(format!(
                "WindowedDetectorConfig.threshold must be finite and > 0.0; got {}",
                self.threshold
            )));
        }
        self.alert.validate()
    }
}

/// Values derived for one revision during detection.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RevisionAnalysis {
    pub historical_stats: WindowStats,
    pub forward_stats: WindowStats,
    /// Absolute value of the linear-weighted statistic; may be `+inf`.
    pub statistic: f64,
    /// Measurements accumulated in the historical window.
    pub amount_prev: usize,
    /// Measurements accumulated in the forward window.
    pub amount_next: usize,
    pub is_change: bool,
}

/// One emitted change point.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ChangePointEvent<K> {
    /// Position in the revision sequence handed to the detector.
    pub index: usize,
    pub key: K,
    pub statistic: f64,
    pub classification: Classification,
    pub pct_change: f64,
    pub abs_delta: f64,
    pub prev_value: f64,
    pub new_value: f64,
    pub noise_profile: Option<NoiseProfile>,
}

impl<K> ChangePointEvent<K> {
    /// The statistic with an infinite value replaced by `cap`.
    pub fn storable_statistic(&self, cap: f64) -> f64 {
        if self.statistic.is_infinite() {
            cap
        } else {
            self.statistic
        }
    }

    pub fn is_regression(&self) -> bool {
        self.classification == Classification::Regression
    }
}

/// Full output of one detector run.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct RegressionDetection<K> {
    /// One entry per input revision, in input order.
    pub analyses: Vec<RevisionAnalysis>,
    pub events: Vec<ChangePointEvent<K>>,
    /// Indices marked as changes whose magnitude fell below the alert threshold.
    pub suppressed: Vec<usize>,
    pub diagnostics: Diagnostics,
}

impl<K> RegressionDetection<K> {
    pub fn change_indices(&self) -> Vec<usize> {
        self.events.iter().map(|event| event.index).collect()
    }
}

/// Sliding-window t-test detector over ordered revision batches.
#[derive(Debug)]
pub struct WindowedRegressionDetector {
    config: WindowedDetectorConfig,
}

impl WindowedRegressionDetector {
    pub fn new(config: WindowedDetectorConfig) -> Result<Self, CpError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &WindowedDetectorConfig {
        &self.config
    }

    pub fn detect<K: Ord + Clone>(
        &self,
        revisions: &[RevisionDatum<K>],
    ) -> Result<RegressionDetection<K>, CpError> {
        self.config.validate()?;
        validate_revision_order(revisions)?;

        let started_at = Instant::now();
        let mut analyses = compute_statistics(revisions, &self.config);
        mark_peaks(&mut analyses, &self.config);

        let mut diagnostics = Diagnostics::for_algorithm("windowed_t_test", revisions.len());
        diagnostics.notes.push(format!(
            "min_back_window={}, max_back_window={}, fore_window={}, threshold={}",
            self.config.min_back_window,
            self.config.max_back_window,
            self.config.fore_window,
            self.config.threshold
        ));
        #[cfg(feature = "serde")]
        {
            diagnostics.params_json = serde_json::to_value(&self.config).ok();
        }

        let mut events = Vec::new();
        let mut suppressed = Vec::new();
        for (index, analysis) in analyses.iter().enumerate() {
            if !analysis.is_change {
                continue;
            }
            let properties = AlertProperties::compute(
                analysis.historical_stats.avg,
                analysis.forward_stats.avg,
                self.config.alert.polarity,
            );
            if !self.config.alert.passes(&properties) {
                suppressed.push(index);
                continue;
            }

            let noise_profile = if self.config.noise_profiling {
                match profile_history(&revisions[..index]) {
                    Ok(profile) => Some(profile),
                    Err(err) => {
                        warn!(index, error = %err, "failed to obtain a noise profile");
                        diagnostics
                            .warnings
                            .push(format!("noise profile unavailable at revision {index}: {err}"));
                        None
                    }
                }
            } else {
                None
            };

            events.push(ChangePointEvent {
                index,
                key: revisions[index].key.clone(),
                statistic: analysis.statistic,
                classification: properties.classification,
                pct_change: properties.pct_change,
                abs_delta: properties.abs_delta,
                prev_value: properties.prev_value,
                new_value: properties.new_value,
                noise_profile,
            });
        }

        let marked = events.len() + suppressed.len();
        diagnostics.notes.push(format!(
            "marked_changes={marked}, emitted={}, suppressed_below_alert_threshold={}",
            events.len(),
            suppressed.len()
        ));
        diagnostics.runtime_ms =
            Some(u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX));
        debug!(
            revisions = revisions.len(),
            marked,
            emitted = events.len(),
            "windowed detection finished"
        );

        Ok(RegressionDetection {
            analyses,
            events,
            suppressed,
            diagnostics,
        })
    }
}

fn compute_statistics<K>(
    revisions: &[RevisionDatum<K>],
    config: &WindowedDetectorConfig,
) -> Vec<RevisionAnalysis> {
    let n = revisions.len();
    let mut analyses = vec![RevisionAnalysis::default(); n];
    // Revisions since the statistic last exceeded the threshold; caps how far
    // back the historical window may reach.
    let mut last_seen_regression = 0usize;

    for (i, analysis) in analyses.iter_mut().enumerate().skip(1) {
        let reach = last_seen_regression
            .max(config.min_back_window)
            .min(config.max_back_window);

        let mut historical: Vec<&[f64]> = Vec::new();
        let mut amount_prev = 0usize;
        let mut back = 1usize;
        while amount_prev < config.max_back_window && back <= i && back <= reach {
            let values = revisions[i - back].values();
            historical.push(values);
            amount_prev += values.len();
            back += 1;
        }

        let mut forward: Vec<&[f64]> = Vec::new();
        let mut amount_next = 0usize;
        let mut next = i;
        while amount_next < config.fore_window && next < n {
            let values = revisions[next].values();
            forward.push(values);
            amount_next += values.len();
            next += 1;
        }

        let statistic = t_statistic(&historical, &forward, Weighting::Linear).abs();
        *analysis = RevisionAnalysis {
            historical_stats: analyze(&historical, Weighting::Uniform),
            forward_stats: analyze(&forward, Weighting::Uniform),
            statistic,
            amount_prev,
            amount_next,
            is_change: false,
        };

        if statistic > config.threshold {
            last_seen_regression = 0;
        } else {
            last_seen_regression += 1;
        }
    }

    analyses
}

fn mark_peaks(analyses: &mut [RevisionAnalysis], config: &WindowedDetectorConfig) {
    for i in 1..analyses.len() {
        let current = analyses[i];
        if current.amount_prev < config.min_back_window || current.amount_next < config.fore_window
        {
            continue;
        }
        if current.statistic <= config.threshold {
            continue;
        }
        if analyses[i - 1].statistic > current.statistic {
            continue;
        }
        if let Some(next) = analyses.get(i + 1)
            && next.statistic > current.statistic
        {
            continue;
        }
        analyses[i].is_change = true;
    }
}

fn profile_history<K>(history: &[RevisionDatum<K>]) -> Result<NoiseProfile, NoiseProfileError> {
    let mut geomeans = Vec::with_capacity(history.len());
    for (index, revision) in history.iter().enumerate() {
        let geomean = revision.geometric_mean().ok_or(NoiseProfileError::NonPositive {
            index,
            value: revision.values().iter().copied().fold(f64::INFINITY, f64::min),
        })?;
        geomeans.push(geomean);
    }
    deviance(&geomeans).map(|(profile, _)| profile)
}

/// Runs the detector with default alert settings and returns the emitted
/// events.
pub fn detect<K: Ord + Clone>(
    revisions: &[RevisionDatum<K>],
    min_back_window: usize,
    max_back_window: usize,
    fore_window: usize,
    threshold: f64,
) -> Result<Vec<ChangePointEvent<K>>, CpError> {
    let detector = WindowedRegressionDetector::new(WindowedDetectorConfig {
        min_back_window,
        max_back_window,
        fore_window,
        threshold,
        ..WindowedDetectorConfig::default()
    })?;
    Ok(detector.detect(revisions)?.events)
}

#[cfg(test)]
mod tests {
    use super::{
        INFINITE_STATISTIC_SENTINEL, RevisionAnalysis, WindowedDetectorConfig,
        WindowedRegressionDetector, detect, mark_peaks,
    };
    use crate::alert::{AlertConfig, Classification, Polarity};
    use crate::noise::NoiseProfile;
    use perfcp_core::{CpError, RevisionDatum};

    fn single_value_revisions(values: &[f64]) -> Vec<RevisionDatum<usize>> {
        values
            .iter()
            .enumerate()
            .map(|(key, &value)| RevisionDatum::new(key, vec![value]).expect("finite value"))
            .collect()
    }

    fn step_series(n: usize, change_at: usize, before: f64, after: f64) -> Vec<f64> {
        (0..n)
            .map(|idx| if idx < change_at { before } else { after })
            .collect()
    }

    #[test]
    fn config_defaults_and_validation() {
        let config = WindowedDetectorConfig::default();
        assert_eq!(config.min_back_window, 12);
        assert_eq!(config.max_back_window, 24);
        assert_eq!(config.fore_window, 12);
        assert_eq!(config.threshold, 7.0);
        assert!(config.noise_profiling);
        config.validate().expect("defaults should validate");

        let err = WindowedRegressionDetector::new(WindowedDetectorConfig {
            min_back_window: 30,
            ..WindowedDetectorConfig::default()
        })
        .expect_err("min_back_window > max_back_window must fail");
        assert!(err.to_string().contains("min_back_window=30"));

        let err = WindowedRegressionDetector::new(WindowedDetectorConfig {
            fore_window: 0,
            ..WindowedDetectorConfig::default()
        })
        .expect_err("fore_window=0 must fail");
        assert!(matches!(err, CpError::InputShape(_)));

        for threshold in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(
                WindowedRegressionDetector::new(WindowedDetectorConfig {
                    threshold,
                    ..WindowedDetectorConfig::default()
                })
                .is_err(),
                "threshold={threshold} must be rejected"
            );
        }
    }

    fn full_window_analyses(
        statistics: &[f64],
        config: &WindowedDetectorConfig,
    ) -> Vec<RevisionAnalysis> {
        statistics
            .iter()
            .map(|&statistic| RevisionAnalysis {
                statistic,
                amount_prev: config.max_back_window,
                amount_next: config.fore_window,
                ..RevisionAnalysis::default()
            })
            .collect()
    }

    fn marked(analyses: &[RevisionAnalysis]) -> Vec<usize> {
        analyses
            .iter()
            .enumerate()
            .filter(|(_, analysis)| analysis.is_change)
            .map(|(idx, _)| idx)
            .collect()
    }

    #[test]
    fn tied_neighbouring_peaks_both_survive() {
        let config = WindowedDetectorConfig {
            threshold: 1.0,
            ..WindowedDetectorConfig::default()
        };
        let mut analyses = full_window_analyses(&[0.0, 3.0, 9.0, 9.0, 2.0], &config);
        mark_peaks(&mut analyses, &config);
        assert_eq!(marked(&analyses), vec![2, 3]);
    }

    #[test]
    fn peaks_need_threshold_and_full_windows() {
        let config = WindowedDetectorConfig {
            threshold: 5.0,
            ..WindowedDetectorConfig::default()
        };
        let mut analyses = full_window_analyses(&[0.0, 4.0, 2.0, 8.0, 1.0, 9.0, 3.0], &config);
        analyses[5].amount_next = config.fore_window - 1;
        mark_peaks(&mut analyses, &config);
        // index 1 is a local maximum below threshold, index 5 lacks a full forward window
        assert_eq!(marked(&analyses), vec![3]);
    }

    #[test]
    fn single_sharp_shift_is_detected_at_shift_index() {
        let revisions = single_value_revisions(&step_series(40, 20, 10.0, 20.0));
        let detector = WindowedRegressionDetector::new(WindowedDetectorConfig::default())
            .expect("default config is valid");
        let detection = detector.detect(&revisions).expect("detection should succeed");

        assert_eq!(detection.change_indices(), vec![20]);
        let event = &detection.events[0];
        assert_eq!(event.key, 20);
        assert!(event.statistic.is_infinite());
        assert_eq!(
            event.storable_statistic(INFINITE_STATISTIC_SENTINEL),
            INFINITE_STATISTIC_SENTINEL
        );
        assert_eq!(event.classification, Classification::Regression);
        assert!(event.is_regression());
        assert!((event.prev_value - 10.0).abs() < 1e-12);
        assert!((event.new_value - 20.0).abs() < 1e-12);
        assert!((event.pct_change - 100.0).abs() < 1e-9);
        assert!((event.abs_delta - 10.0).abs() < 1e-12);
        assert_eq!(event.noise_profile, Some(NoiseProfile::Ok));
        assert!(detection.suppressed.is_empty());
        assert_eq!(detection.analyses.len(), revisions.len());
        assert_eq!(detection.diagnostics.algorithm, "windowed_t_test");
        assert_eq!(detection.diagnostics.n, 40);
    }

    #[test]
    fn polarity_flips_classification() {
        let revisions = single_value_revisions(&step_series(40, 20, 10.0, 20.0));
        let detector = WindowedRegressionDetector::new(WindowedDetectorConfig {
            alert: AlertConfig {
                polarity: Polarity::HigherIsBetter,
                ..AlertConfig::default()
            },
            ..WindowedDetectorConfig::default()
        })
        .expect("valid config");
        let detection = detector.detect(&revisions).expect("detection should succeed");
        assert_eq!(detection.events[0].classification, Classification::Improvement);
    }

    #[test]
    fn short_series_yields_no_events() {
        let revisions = single_value_revisions(&step_series(23, 12, 1.0, 100.0));
        let events = detect(&revisions, 12, 24, 12, 7.0).expect("short series is not an error");
        assert!(events.is_empty());

        let events = detect::<usize>(&[], 12, 24, 12, 7.0).expect("empty series is not an error");
        assert!(events.is_empty());
    }

    #[test]
    fn boundary_revisions_are_never_eligible() {
        let revisions = single_value_revisions(&step_series(30, 5, 10.0, 20.0));
        let detection = WindowedRegressionDetector::new(WindowedDetectorConfig::default())
            .expect("valid config")
            .detect(&revisions)
            .expect("detection should succeed");
        assert!(detection.events.is_empty());
        assert!(detection.analyses[5].statistic.is_infinite());
        assert!(detection.analyses[5].amount_prev < 12);
    }

    #[test]
    fn repeated_measurements_count_towards_window_size() {
        // Four values per revision: 3 revisions fill the 12-value windows.
        let revisions: Vec<RevisionDatum<usize>> = (0..12)
            .map(|key| {
                let value = if key < 6 { 5.0 } else { 8.0 };
                RevisionDatum::new(key, vec![value; 4]).expect("finite values")
            })
            .collect();
        let detection = WindowedRegressionDetector::new(WindowedDetectorConfig::default())
            .expect("valid config")
            .detect(&revisions)
            .expect("detection should succeed");
        assert_eq!(detection.change_indices(), vec![6]);
        assert_eq!(detection.analyses[6].amount_next, 12);
        assert!(detection.analyses[6].amount_prev >= 12);
    }

    #[test]
    fn small_changes_are_suppressed_not_emitted() {
        let revisions = single_value_revisions(&step_series(40, 20, 100.0, 101.0));
        let detection = WindowedRegressionDetector::new(WindowedDetectorConfig::default())
            .expect("valid config")
            .detect(&revisions)
            .expect("detection should succeed");
        assert!(detection.events.is_empty());
        assert_eq!(detection.suppressed, vec![20]);
        assert!(detection.analyses[20].is_change);
    }

    #[test]
    fn noise_profile_failure_is_logged_and_ignored() {
        // A zero before the shift makes the geometric mean undefined.
        let mut values = step_series(40, 20, 10.0, 20.0);
        values[0] = 0.0;
        let detection = WindowedRegressionDetector::new(WindowedDetectorConfig::default())
            .expect("valid config")
            .detect(&single_value_revisions(&values))
            .expect("noise failures never abort detection");
        assert_eq!(detection.change_indices(), vec![20]);
        assert_eq!(detection.events[0].noise_profile, None);
        assert_eq!(detection.diagnostics.warnings.len(), 1);
    }

    #[test]
    fn unsorted_revisions_are_rejected() {
        let revisions = vec![
            RevisionDatum::new(2usize, vec![1.0]).expect("valid"),
            RevisionDatum::new(1usize, vec![1.0]).expect("valid"),
        ];
        let err = detect(&revisions, 12, 24, 12, 7.0).expect_err("unsorted keys must fail");
        assert!(matches!(err, CpError::InputShape(_)));
    }

    #[test]
    fn historical_window_shrinks_after_a_detection() {
        let revisions = single_value_revisions(&step_series(60, 30, 10.0, 20.0));
        let detection = WindowedRegressionDetector::new(WindowedDetectorConfig::default())
            .expect("valid config")
            .detect(&revisions)
            .expect("detection should succeed");
        // Without a recent detection the window reaches back max_back_window values.
        assert_eq!(detection.analyses[28].amount_prev, 24);
        // Right after a statistic above threshold it is capped at min_back_window revisions.
        assert!(detection.analyses[29].statistic > 7.0);
        assert_eq!(detection.analyses[30].amount_prev, 12);
    }
}
