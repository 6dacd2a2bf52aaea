//! Error types for the beatshift crate.

use std::fmt;

/// Errors that can occur during analysis or while running a vocoder session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeatshiftError {
    /// Malformed or empty input signal, or an invalid argument.
    InvalidInput(String),
    /// Too little material for a confident estimate.
    ///
    /// Analysis pipelines never surface this to callers; they log it and fall
    /// back to a low-confidence default instead.
    InsufficientData { needed: usize, found: usize },
    /// Non-finite values produced or received mid-stream.
    NumericAnomaly(String),
    /// Ratio, frame size or other configuration outside supported bounds.
    InvalidConfig(String),
}

impl fmt::Display for BeatshiftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeatshiftError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            BeatshiftError::InsufficientData { needed, found } => {
                write!(
                    f,
                    "insufficient data: {} required, {} found",
                    needed, found
                )
            }
            BeatshiftError::NumericAnomaly(msg) => write!(f, "numeric anomaly: {}", msg),
            BeatshiftError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for BeatshiftError {}

impl From<serde_json::Error> for BeatshiftError {
    fn from(err: serde_json::Error) -> Self {
        BeatshiftError::InvalidConfig(err.to_string())
    }
}
