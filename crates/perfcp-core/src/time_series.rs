// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::CpError;
use crate::revision::{RevisionDatum, bucket_observations};

/// Timestamp column of a [`TimeSeriesRecord`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeColumn {
    /// One timestamp per observation, not necessarily unique.
    pub raw: Vec<String>,
}

/// One measurement column of a [`TimeSeriesRecord`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SeriesColumn {
    /// One value per observation; `None` marks a missing measurement.
    pub raw: Vec<Option<f64>>,
}

/// A univariate telemetry series as exchanged with dataset tooling.
///
/// Timestamps use the `%Y-%m-%d %H:%M:%S` layout, which sorts
/// chronologically as plain strings, so keys are compared lexicographically.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeSeriesRecord {
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: Option<String>,
    pub n_obs: usize,
    pub n_dim: usize,
    pub time: TimeColumn,
    pub series: Vec<SeriesColumn>,
}

impl TimeSeriesRecord {
    /// Builds a record from parallel timestamp and value columns.
    pub fn from_columns(
        timestamps: Vec<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, CpError> {
        let record = Self {
            name: None,
            n_obs: timestamps.len(),
            n_dim: 1,
            time: TimeColumn { raw: timestamps },
            series: vec![SeriesColumn { raw: values }],
        };
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> Result<(), CpError> {
        if self.n_dim != 1 {
            return Err(CpError::input_shape(format!(
                "only univariate series are supported; got n_dim={}",
                self.n_dim
            )));
        }
        if self.series.len() != self.n_dim {
            return Err(CpError::input_shape(format!(
                "series column count mismatch: got {}, expected n_dim={}",
                self.series.len(),
                self.n_dim
            )));
        }
        if self.time.raw.len() != self.n_obs {
            return Err(CpError::input_shape(format!(
                "time.raw length mismatch: got {}, expected n_obs={}",
                self.time.raw.len(),
                self.n_obs
            )));
        }
        let values_len = self.series[0].raw.len();
        if values_len != self.n_obs {
            return Err(CpError::input_shape(format!(
                "series[0].raw length mismatch: got {values_len}, expected n_obs={}",
                self.n_obs
            )));
        }
        Ok(())
    }

    /// Sorted, deduplicated timestamps; the index space change points refer to.
    pub fn unique_timestamps(&self) -> Vec<&str> {
        let mut unique: Vec<&str> = self.time.raw.iter().map(String::as_str).collect();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Groups observations sharing a timestamp into revisions, skipping
    /// missing values.
    pub fn revisions(&self) -> Result<Vec<RevisionDatum<String>>, CpError> {
        self.validate()?;
        let observations = self
            .time
            .raw
            .iter()
            .cloned()
            .zip(self.series[0].raw.iter().map(|value| value.unwrap_or(f64::NAN)));
        bucket_observations(observations)
    }

    /// Position of `timestamp` in [`Self::unique_timestamps`].
    pub fn index_of(&self, timestamp: &str) -> Option<usize> {
        self.unique_timestamps().binary_search(&timestamp).ok()
    }

    /// Maps revision keys to unique-timestamp indices, keeping only keys that
    /// occur in the record.
    pub fn indices_of<'k, I>(&self, keys: I) -> Vec<usize>
    where
        I: IntoIterator<Item = &'k str>,
    {
        let unique = self.unique_timestamps();
        keys.into_iter()
            .filter_map(|key| unique.binary_search(&key).ok())
            .collect()
    }
}
