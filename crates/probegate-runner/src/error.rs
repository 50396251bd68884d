//! Error types for the probe runner.

use thiserror::Error;

/// Validation failures for [`crate::RunnerConfig`].
#[derive(Debug, Error, PartialEq)]
pub enum RunnerConfigError {
    #[error("samples must be at least 1")]
    NoSamples,

    #[error("{0} must be at least 1")]
    ZeroThreshold(&'static str),

    #[error("{field} must be a positive, representable number of seconds, got {value}")]
    InvalidDuration { field: &'static str, value: f64 },
}
