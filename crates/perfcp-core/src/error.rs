// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use thiserror::Error;

/// Errors raised by detection, aggregation and evaluation entry points.
///
/// A series too short to produce any candidate is not an error; those calls
/// return an empty result instead.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CpError {
    /// Parameters or inputs are inconsistent with each other.
    #[error("invalid input shape: {0}")]
    InputShape(String),
    /// Values that cannot take part in the statistics (e.g. infinities).
    #[error("numerical issue: {0}")]
    NumericalIssue(String),
}

impl CpError {
    pub fn input_shape(message: impl Into<String>) -> Self {
        Self::InputShape(message.into())
    }

    pub fn numerical_issue(message: impl Into<String>) -> Self {
        Self::NumericalIssue(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::CpError;

    #[test]
    fn constructors_map_to_expected_variants() {
        assert_eq!(
            CpError::input_shape("bad window"),
            CpError::InputShape("bad window".to_string())
        );
        assert_eq!(
            CpError::numerical_issue("inf"),
            CpError::NumericalIssue("inf".to_string())
        );
    }

    #[test]
    fn display_includes_category_and_message() {
        let err = CpError::input_shape("min_back_window=30 exceeds max_back_window=24");
        assert_eq!(
            err.to_string(),
            "invalid input shape: min_back_window=30 exceeds max_back_window=24"
        );
        assert!(
            CpError::numerical_issue("value=inf")
                .to_string()
                .starts_with("numerical issue")
        );
    }
}
