//! Error types for probe target parsing and mutex configuration.

use thiserror::Error;

/// Result type alias for probe mutex setup operations.
pub type MutexResult<T> = Result<T, MutexError>;

/// Errors raised while turning caller input into mutex inputs.
///
/// The mutex operations themselves never fail; everything here is
/// caught before a target or config reaches the registry.
#[derive(Debug, Error)]
pub enum MutexError {
    #[error("probe url is empty")]
    EmptyUrl,

    #[error("probe url has no scheme: {0}")]
    MissingScheme(String),

    #[error("unsupported probe scheme `{0}` (expected http or https)")]
    UnsupportedScheme(String),

    #[error("probe url has no host: {0}")]
    MissingHost(String),

    #[error("probe url has an invalid host: {0}")]
    InvalidHost(String),

    #[error("probe url has an invalid port: {0}")]
    InvalidPort(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Validation failures for [`crate::MutexConfig`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("backoff sequence must not be empty")]
    EmptyBackoffSequence,

    #[error(
        "backoff sequence entry {index} must be a positive, representable number of seconds, got {value}"
    )]
    InvalidBackoff { index: usize, value: f64 },

    #[error("jitter_pct must be in [0, 1), got {0}")]
    InvalidJitter(f64),

    #[error("lock_timeout_secs must be a positive, representable number of seconds, got {0}")]
    InvalidLockTimeout(f64),
}
