//! Synthetic probe runner.
//!
//! Runs one probe round against a target while holding that target's
//! probe lock. When the lock is busy the runner waits out the backoff the
//! mutex hands back and retries a bounded number of times (once by
//! default) before giving up and reporting the round as skipped.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use probegate_mutex::config::{is_positive_duration, saturating_duration};
use probegate_mutex::{ProbeMutex, ProbeTarget, TargetKey};

use crate::checker::{ProbeResult, Prober};
use crate::error::RunnerConfigError;

/// Probe round settings. Deserializes from the `[runner]` config table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// HTTP samples taken per round while holding the lock.
    pub samples: u32,
    /// Base delay between samples, jittered.
    pub sample_delay_secs: f64,
    /// Base delay between rounds, jittered.
    pub interval_secs: f64,
    /// Per-sample HTTP timeout.
    pub timeout_secs: f64,
    /// Failed rounds before a target is reported unreachable.
    pub unhealthy_threshold: u32,
    /// Successful rounds before an unreachable target is healthy again.
    pub healthy_threshold: u32,
    /// Retries after finding the target busy before skipping the round.
    pub contention_retries: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            samples: 3,
            sample_delay_secs: 1.0,
            interval_secs: 30.0,
            timeout_secs: 5.0,
            unhealthy_threshold: 3,
            healthy_threshold: 1,
            contention_retries: 1,
        }
    }
}

impl RunnerConfig {
    pub fn validate(self) -> Result<Self, RunnerConfigError> {
        if self.samples == 0 {
            return Err(RunnerConfigError::NoSamples);
        }
        for (field, value) in [
            ("unhealthy_threshold", self.unhealthy_threshold),
            ("healthy_threshold", self.healthy_threshold),
        ] {
            if value == 0 {
                return Err(RunnerConfigError::ZeroThreshold(field));
            }
        }
        if self.sample_delay_secs != 0.0 && !is_positive_duration(self.sample_delay_secs) {
            return Err(RunnerConfigError::InvalidDuration {
                field: "sample_delay_secs",
                value: self.sample_delay_secs,
            });
        }
        for (field, value) in [
            ("interval_secs", self.interval_secs),
            ("timeout_secs", self.timeout_secs),
        ] {
            if !is_positive_duration(value) {
                return Err(RunnerConfigError::InvalidDuration { field, value });
            }
        }
        Ok(self)
    }

    pub fn sample_delay(&self) -> Duration {
        saturating_duration(self.sample_delay_secs)
    }

    pub fn interval(&self) -> Duration {
        saturating_duration(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        saturating_duration(self.timeout_secs)
    }
}

/// Overall result of one probe round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    /// Every sample returned 2xx.
    Healthy,
    /// Some, but not all, samples returned 2xx.
    Degraded,
    /// No 2xx, and at least one non-2xx response.
    Unhealthy,
    /// No sample got a response.
    Failed,
    /// The target stayed busy; no samples were taken.
    Skipped,
}

impl ProbeOutcome {
    fn from_samples(samples: &[Sample]) -> Self {
        let healthy = samples
            .iter()
            .filter(|s| s.result == ProbeResult::Healthy)
            .count();
        if healthy == samples.len() && healthy > 0 {
            ProbeOutcome::Healthy
        } else if healthy > 0 {
            ProbeOutcome::Degraded
        } else if samples.iter().any(|s| s.result == ProbeResult::Unhealthy) {
            ProbeOutcome::Unhealthy
        } else {
            ProbeOutcome::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub result: ProbeResult,
    pub latency_ms: f64,
}

/// What happened during one round against one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub url: String,
    pub target_key: TargetKey,
    pub outcome: ProbeOutcome,
    pub samples: Vec<Sample>,
    /// Times the runner found the target busy this round.
    pub contended: u32,
    /// Unix seconds when the round finished.
    pub checked_at: u64,
}

/// Runs probe rounds under a shared [`ProbeMutex`].
pub struct ProbeRunner<P> {
    mutex: Arc<ProbeMutex>,
    prober: P,
    config: RunnerConfig,
}

impl<P: Prober> ProbeRunner<P> {
    pub fn new(mutex: Arc<ProbeMutex>, prober: P, config: RunnerConfig) -> Self {
        Self {
            mutex,
            prober,
            config,
        }
    }

    pub fn mutex(&self) -> &Arc<ProbeMutex> {
        &self.mutex
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run one probe round against `target`.
    pub async fn run_once(&self, target: &ProbeTarget) -> ProbeReport {
        let mut contended = 0;
        let guard = loop {
            match self.mutex.lock(target) {
                Ok(guard) => break guard,
                Err(busy) => {
                    contended += 1;
                    if contended > self.config.contention_retries {
                        info!(
                            url = %target,
                            contended,
                            "target still busy, skipping probe round"
                        );
                        return self.report(target, ProbeOutcome::Skipped, Vec::new(), contended);
                    }
                    debug!(
                        url = %target,
                        attempt = busy.attempt,
                        backoff_ms = busy.backoff.as_millis() as u64,
                        "target busy, backing off"
                    );
                    tokio::time::sleep(busy.backoff).await;
                }
            }
        };

        let mut samples = Vec::with_capacity(self.config.samples as usize);
        for i in 0..self.config.samples {
            if i > 0 {
                tokio::time::sleep(self.mutex.apply_jitter(self.config.sample_delay())).await;
            }
            let started = Instant::now();
            let result = self.prober.probe(target).await;
            samples.push(Sample {
                result,
                latency_ms: started.elapsed().as_secs_f64() * 1000.0,
            });
        }
        drop(guard);

        let outcome = ProbeOutcome::from_samples(&samples);
        if matches!(outcome, ProbeOutcome::Unhealthy | ProbeOutcome::Failed) {
            warn!(url = %target, ?outcome, "probe round failed");
        } else {
            debug!(url = %target, ?outcome, "probe round complete");
        }
        self.report(target, outcome, samples, contended)
    }

    /// Run one round against every target concurrently. Reports come
    /// back in input order.
    pub async fn run_round(self: &Arc<Self>, targets: &[ProbeTarget]) -> Vec<ProbeReport> {
        let mut set = JoinSet::new();
        for (index, target) in targets.iter().cloned().enumerate() {
            let runner = Arc::clone(self);
            set.spawn(async move { (index, runner.run_once(&target).await) });
        }

        let mut reports = Vec::with_capacity(targets.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(pair) => reports.push(pair),
                Err(e) => warn!(error = %e, "probe task did not complete"),
            }
        }
        reports.sort_by_key(|(index, _)| *index);
        reports.into_iter().map(|(_, report)| report).collect()
    }

    fn report(
        &self,
        target: &ProbeTarget,
        outcome: ProbeOutcome,
        samples: Vec<Sample>,
        contended: u32,
    ) -> ProbeReport {
        ProbeReport {
            url: target.url().to_string(),
            target_key: target.key().clone(),
            outcome,
            samples,
            contended,
            checked_at: epoch_secs(),
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
