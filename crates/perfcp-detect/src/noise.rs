// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use thiserror::Error;

const MIN_NOISE_POINTS: usize = 3;
const MAD_TO_SIGMA: f64 = 1.4826;
const OUTLIER_SIGMAS: f64 = 3.0;
const MAX_OUTLIER_FRACTION: f64 = 0.05;
const MAX_ABS_SKEWNESS: f64 = 1.0;

/// Coarse shape of the history preceding an event.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoiseProfile {
    Ok,
    Skewed,
    Outliers,
}

impl NoiseProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Skewed => "SKEWED",
            Self::Outliers => "OUTLIERS",
        }
    }
}

impl std::fmt::Display for NoiseProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary statistics backing a [`NoiseProfile`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoiseStats {
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
    /// `std_dev / mean`.
    pub coefficient_of_variation: f64,
    pub skewness: f64,
    pub outlier_fraction: f64,
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum NoiseProfileError {
    #[error("noise profile needs at least {MIN_NOISE_POINTS} points; got {0}")]
    TooFewPoints(usize),
    #[error("noise profile needs strictly positive finite values; data[{index}]={value}")]
    NonPositive { index: usize, value: f64 },
}

fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len().is_multiple_of(2) {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Profiles the noise of a strictly positive series.
///
/// Points further than three robust sigmas (scaled median absolute deviation)
/// from the median are outliers; more than 5% of them gives
/// [`NoiseProfile::Outliers`]. Otherwise a sample skewness beyond ±1 gives
/// [`NoiseProfile::Skewed`].
pub fn deviance(data: &[f64]) -> Result<(NoiseProfile, NoiseStats), NoiseProfileError> {
    if data.len() < MIN_NOISE_POINTS {
        return Err(NoiseProfileError::TooFewPoints(data.len()));
    }
    if let Some((index, &value)) = data
        .iter()
        .enumerate()
        .find(|(_, value)| !value.is_finite() || **value <= 0.0)
    {
        return Err(NoiseProfileError::NonPositive { index, value });
    }

    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let squared = data.iter().map(|value| (value - mean).powi(2)).sum::<f64>();
    let std_dev = (squared / (n - 1.0)).sqrt();
    let population_std = (squared / n).sqrt();
    let skewness = if population_std > 0.0 {
        let cubed = data.iter().map(|value| (value - mean).powi(3)).sum::<f64>();
        (cubed / n) / population_std.powi(3)
    } else {
        0.0
    };

    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let center = median(&sorted);
    let mut deviations: Vec<f64> = sorted.iter().map(|value| (value - center).abs()).collect();
    deviations.sort_by(f64::total_cmp);
    let cutoff = OUTLIER_SIGMAS * MAD_TO_SIGMA * median(&deviations);
    let outliers = deviations.iter().filter(|&&dev| dev > cutoff).count();
    let outlier_fraction = outliers as f64 / n;

    let profile = if outlier_fraction > MAX_OUTLIER_FRACTION {
        NoiseProfile::Outliers
    } else if skewness.abs() > MAX_ABS_SKEWNESS {
        NoiseProfile::Skewed
    } else {
        NoiseProfile::Ok
    };

    Ok((
        profile,
        NoiseStats {
            n: data.len(),
            mean,
            std_dev,
            coefficient_of_variation: std_dev / mean,
            skewness,
            outlier_fraction,
        },
    ))
}
