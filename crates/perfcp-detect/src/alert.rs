// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use perfcp_core::CpError;

const DEFAULT_MIN_ALERT_CHANGE: f64 = 2.0;

/// Which direction of movement is a regression for a metric.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Polarity {
    /// Timings, memory: an increase is a regression.
    #[default]
    LowerIsBetter,
    /// Throughput, scores: a decrease is a regression.
    HigherIsBetter,
}

/// Magnitude an event must reach to be emitted.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlertChangeMode {
    #[default]
    Percentage,
    Absolute,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Classification {
    Regression,
    Improvement,
    #[default]
    NoChange,
}

/// Alert settings shared by every event of one detector run.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlertConfig {
    pub polarity: Polarity,
    pub change_mode: AlertChangeMode,
    /// Percent in [`AlertChangeMode::Percentage`], metric units otherwise.
    pub min_alert_change: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            polarity: Polarity::default(),
            change_mode: AlertChangeMode::default(),
            min_alert_change: DEFAULT_MIN_ALERT_CHANGE,
        }
    }
}

impl AlertConfig {
    pub fn validate(&self) -> Result<(), CpError> {
        if !self.min_alert_change.is_finite() || self.min_alert_change < 0.0 {
            return Err(CpError::input_shape(format!(
                "AlertConfig.min_alert_change must be finite and >= 0.0; got {}",
                self.min_alert_change
            )));
        }
        Ok(())
    }

    /// False when the change is too small to alert on.
    pub fn passes(&self, properties: &AlertProperties) -> bool {
        match self.change_mode {
            AlertChangeMode::Percentage => properties.pct_change >= self.min_alert_change,
            AlertChangeMode::Absolute => properties.abs_delta.abs() >= self.min_alert_change,
        }
    }
}

/// Magnitude and direction of a shift between two window averages.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlertProperties {
    pub pct_change: f64,
    pub abs_delta: f64,
    pub classification: Classification,
    pub prev_value: f64,
    pub new_value: f64,
}

impl AlertProperties {
    pub fn compute(prev_value: f64, new_value: f64, polarity: Polarity) -> Self {
        let abs_delta = new_value - prev_value;
        let pct_change = if prev_value != 0.0 {
            100.0 * abs_delta.abs() / prev_value
        } else {
            0.0
        };

        let classification = if abs_delta == 0.0 {
            Classification::NoChange
        } else {
            let increased = abs_delta > 0.0;
            match (polarity, increased) {
                (Polarity::LowerIsBetter, true) | (Polarity::HigherIsBetter, false) => {
                    Classification::Regression
                }
                _ => Classification::Improvement,
            }
        };

        Self {
            pct_change,
            abs_delta,
            classification,
            prev_value,
            new_value,
        }
    }
}
