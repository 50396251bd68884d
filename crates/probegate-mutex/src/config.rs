//! Typed mutex configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default escalating backoff, in seconds, indexed by attempt count.
pub const DEFAULT_BACKOFF_SEQUENCE_SECS: [f64; 3] = [2.0, 5.0, 10.0];

/// Default symmetric jitter fraction (±20%).
pub const DEFAULT_JITTER_PCT: f64 = 0.20;

/// Default age after which a held lock is considered abandoned.
pub const DEFAULT_LOCK_TIMEOUT_SECS: f64 = 60.0;

/// Backoff, jitter, and lock-expiry settings for a [`crate::ProbeMutex`].
///
/// Deserializes from the `[mutex]` table of the daemon config; every
/// field is optional there and falls back to the defaults above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutexConfig {
    pub backoff_sequence_secs: Vec<f64>,
    pub jitter_pct: f64,
    pub lock_timeout_secs: f64,
}

impl Default for MutexConfig {
    fn default() -> Self {
        Self {
            backoff_sequence_secs: DEFAULT_BACKOFF_SEQUENCE_SECS.to_vec(),
            jitter_pct: DEFAULT_JITTER_PCT,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
        }
    }
}

impl MutexConfig {
    /// Check every field is in range, returning the config unchanged.
    ///
    /// Every interval, including a backoff entry at the top of its jitter
    /// band, must fit in a [`Duration`].
    pub fn validate(self) -> Result<Self, ConfigError> {
        if !self.jitter_pct.is_finite() || !(0.0..1.0).contains(&self.jitter_pct) {
            return Err(ConfigError::InvalidJitter(self.jitter_pct));
        }
        if self.backoff_sequence_secs.is_empty() {
            return Err(ConfigError::EmptyBackoffSequence);
        }
        for (index, &value) in self.backoff_sequence_secs.iter().enumerate() {
            if !is_positive_duration(value * (1.0 + self.jitter_pct)) {
                return Err(ConfigError::InvalidBackoff { index, value });
            }
        }
        if !is_positive_duration(self.lock_timeout_secs) {
            return Err(ConfigError::InvalidLockTimeout(self.lock_timeout_secs));
        }
        Ok(self)
    }

    /// The backoff sequence as durations.
    pub fn backoff_sequence(&self) -> Vec<Duration> {
        self.backoff_sequence_secs
            .iter()
            .map(|&s| saturating_duration(s))
            .collect()
    }

    pub fn lock_timeout(&self) -> Duration {
        saturating_duration(self.lock_timeout_secs)
    }
}

/// True when `secs` is finite, above zero, and representable as a [`Duration`].
pub fn is_positive_duration(secs: f64) -> bool {
    secs > 0.0 && Duration::try_from_secs_f64(secs).is_ok()
}

/// Convert seconds to a [`Duration`], clamping negatives and NaN to zero
/// and anything too large to [`Duration::MAX`].
pub fn saturating_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}
