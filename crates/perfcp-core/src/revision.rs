// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::CpError;
use std::collections::BTreeMap;

/// All measurements recorded for one revision.
///
/// `values` is never empty and only holds finite numbers.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "UncheckedRevision<K>"))]
#[derive(Clone, Debug, PartialEq)]
pub struct RevisionDatum<K> {
    pub key: K,
    values: Vec<f64>,
}

/// Wire form of [`RevisionDatum`], validated through [`RevisionDatum::new`].
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct UncheckedRevision<K> {
    key: K,
    values: Vec<f64>,
}

#[cfg(feature = "serde")]
impl<K> TryFrom<UncheckedRevision<K>> for RevisionDatum<K> {
    type Error = CpError;

    fn try_from(unchecked: UncheckedRevision<K>) -> Result<Self, Self::Error> {
        Self::new(unchecked.key, unchecked.values)
    }
}

impl<K> RevisionDatum<K> {
    pub fn new(key: K, values: Vec<f64>) -> Result<Self, CpError> {
        if values.is_empty() {
            return Err(CpError::input_shape(
                "RevisionDatum.values must contain at least one measurement",
            ));
        }
        if let Some((idx, value)) = values
            .iter()
            .copied()
            .enumerate()
            .find(|(_, value)| !value.is_finite())
        {
            return Err(CpError::numerical_issue(format!(
                "RevisionDatum.values must be finite; values[{idx}]={value}"
            )));
        }
        Ok(Self { key, values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of measurements, which is what window sizes are counted in.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Geometric mean of the measurements, or `None` when any value is not
    /// strictly positive.
    pub fn geometric_mean(&self) -> Option<f64> {
        if self.values.iter().any(|&value| value <= 0.0) {
            return None;
        }
        let log_sum = self.values.iter().map(|value| value.ln()).sum::<f64>();
        Some((log_sum / self.values.len() as f64).exp())
    }
}

/// Summary of a window of revisions.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WindowStats {
    /// Weighted average over every value of the window.
    pub avg: f64,
    /// Number of values (not revisions) in the window.
    pub n: usize,
    /// Sample variance around `avg`.
    pub variance: f64,
}

/// Groups raw `(key, value)` observations into one [`RevisionDatum`] per
/// distinct key, ordered by key.
///
/// `NaN` marks a missing observation and is skipped; keys whose observations
/// are all missing produce no revision. Infinite values are rejected.
pub fn bucket_observations<K, I>(observations: I) -> Result<Vec<RevisionDatum<K>>, CpError>
where
    K: Ord,
    I: IntoIterator<Item = (K, f64)>,
{
    let mut grouped: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    for (position, (key, value)) in observations.into_iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        if value.is_infinite() {
            return Err(CpError::numerical_issue(format!(
                "observation {position} is infinite ({value})"
            )));
        }
        grouped.entry(key).or_default().push(value);
    }

    Ok(grouped
        .into_iter()
        .map(|(key, values)| RevisionDatum { key, values })
        .collect())
}

/// Confirms revision keys are strictly increasing.
pub fn validate_revision_order<K: Ord>(revisions: &[RevisionDatum<K>]) -> Result<(), CpError> {
    for idx in 1..revisions.len() {
        if revisions[idx - 1].key >= revisions[idx].key {
            return Err(CpError::input_shape(format!(
                "revisions must be sorted by strictly increasing key; revisions[{}] >= revisions[{idx}]",
                idx - 1
            )));
        }
    }
    Ok(())
}
