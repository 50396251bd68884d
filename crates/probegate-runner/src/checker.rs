//! Probe execution and per-target health tracking.
//!
//! [`http_probe`] performs one plain-HTTP GET against a target.
//! [`TargetHealth`] folds a stream of probe rounds into a reachable /
//! unreachable verdict using a consecutive-failure threshold.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use probegate_mutex::{ProbeTarget, Scheme};

use crate::runner::ProbeOutcome;

/// Result of a single HTTP sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeResult {
    /// The endpoint returned 2xx.
    Healthy,
    /// The endpoint returned non-2xx.
    Unhealthy,
    /// The probe could not be executed (connection error, timeout).
    Failed,
}

/// Executes a single probe sample against a target.
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, target: &ProbeTarget) -> impl Future<Output = ProbeResult> + Send;
}

/// Production prober: plain HTTP/1.1 GET with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpProber {
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Prober for HttpProber {
    fn probe(&self, target: &ProbeTarget) -> impl Future<Output = ProbeResult> + Send {
        http_probe(target.clone(), self.timeout)
    }
}

/// Perform an HTTP GET probe against `target`.
///
/// Returns `Healthy` on 2xx, `Unhealthy` on any other status, and
/// `Failed` if the connection fails or the timeout elapses. `https`
/// targets are reported `Failed`; there is no TLS client here.
pub async fn http_probe(target: ProbeTarget, timeout: Duration) -> ProbeResult {
    if target.scheme() == Scheme::Https {
        debug!(url = %target, "https probes are not supported, reporting failed");
        return ProbeResult::Failed;
    }

    let address = target.address();
    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(&address).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, url = %target, "probe connection failed");
                return ProbeResult::Failed;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, url = %target, "probe handshake failed");
                return ProbeResult::Failed;
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let host = if target.port() == 80 {
            target.host().to_string()
        } else {
            address.clone()
        };
        let req = match http::Request::builder()
            .method("GET")
            .uri(target.path_and_query())
            .header("host", host)
            .header("user-agent", concat!("probegate/", env!("CARGO_PKG_VERSION")))
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, url = %target, "could not build probe request");
                return ProbeResult::Failed;
            }
        };

        match sender.send_request(req).await {
            Ok(resp) if resp.status().is_success() => ProbeResult::Healthy,
            Ok(resp) => {
                debug!(status = %resp.status(), url = %target, "probe non-2xx");
                ProbeResult::Unhealthy
            }
            Err(e) => {
                debug!(error = %e, url = %target, "probe request failed");
                ProbeResult::Failed
            }
        }
    })
    .await;

    match result {
        Ok(probe) => probe,
        Err(_) => {
            debug!(url = %target, "probe timed out");
            ProbeResult::Failed
        }
    }
}

/// Reachability verdict for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    /// No completed probe round yet.
    Unknown,
    Healthy,
    Unreachable,
}

/// Tracks consecutive round outcomes for a single target.
#[derive(Debug, Clone)]
pub struct TargetHealth {
    status: TargetStatus,
    consecutive_failures: u32,
    consecutive_successes: u32,
    /// Failed rounds before marking unreachable.
    unhealthy_threshold: u32,
    /// Successful rounds needed to recover.
    healthy_threshold: u32,
}

impl TargetHealth {
    pub fn new(unhealthy_threshold: u32) -> Self {
        Self::with_thresholds(unhealthy_threshold, 1)
    }

    pub fn with_thresholds(unhealthy_threshold: u32, healthy_threshold: u32) -> Self {
        Self {
            status: TargetStatus::Unknown,
            consecutive_failures: 0,
            consecutive_successes: 0,
            unhealthy_threshold: unhealthy_threshold.max(1),
            healthy_threshold: healthy_threshold.max(1),
        }
    }

    /// Record one round's outcome and return the new status.
    ///
    /// Skipped rounds (target busy) say nothing about the target and
    /// leave the counters alone.
    pub fn record(&mut self, outcome: ProbeOutcome) -> TargetStatus {
        match outcome {
            ProbeOutcome::Skipped => {}
            ProbeOutcome::Healthy | ProbeOutcome::Degraded => {
                self.consecutive_failures = 0;
                self.consecutive_successes += 1;
                if self.consecutive_successes >= self.healthy_threshold {
                    if self.status != TargetStatus::Healthy {
                        debug!(
                            successes = self.consecutive_successes,
                            "target recovered to healthy"
                        );
                    }
                    self.status = TargetStatus::Healthy;
                }
            }
            ProbeOutcome::Unhealthy | ProbeOutcome::Failed => {
                self.consecutive_successes = 0;
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.unhealthy_threshold {
                    if self.status != TargetStatus::Unreachable {
                        warn!(
                            failures = self.consecutive_failures,
                            threshold = self.unhealthy_threshold,
                            "target marked unreachable"
                        );
                    }
                    self.status = TargetStatus::Unreachable;
                }
            }
        }
        self.status
    }

    pub fn status(&self) -> TargetStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_starts_unknown() {
        let tracker = TargetHealth::new(3);
        assert_eq!(tracker.status(), TargetStatus::Unknown);
        assert_eq!(tracker.consecutive_failures(), 0);
    }

    #[test]
    fn tracker_becomes_healthy_on_first_success() {
        let mut tracker = TargetHealth::new(3);
        assert_eq!(tracker.record(ProbeOutcome::Healthy), TargetStatus::Healthy);
    }

    #[test]
    fn degraded_counts_as_reachable() {
        let mut tracker = TargetHealth::new(1);
        assert_eq!(tracker.record(ProbeOutcome::Degraded), TargetStatus::Healthy);
    }

    #[test]
    fn tracker_becomes_unreachable_at_threshold() {
        let mut tracker = TargetHealth::new(3);
        tracker.record(ProbeOutcome::Healthy);

        tracker.record(ProbeOutcome::Unhealthy);
        tracker.record(ProbeOutcome::Failed);
        assert_eq!(tracker.status(), TargetStatus::Healthy);
        assert_eq!(
            tracker.record(ProbeOutcome::Failed),
            TargetStatus::Unreachable
        );
    }

    #[test]
    fn skipped_rounds_do_not_count() {
        let mut tracker = TargetHealth::new(2);
        tracker.record(ProbeOutcome::Failed);
        for _ in 0..10 {
            tracker.record(ProbeOutcome::Skipped);
        }
        assert_eq!(tracker.consecutive_failures(), 1);
        assert_eq!(tracker.status(), TargetStatus::Unknown);
    }

    #[test]
    fn tracker_recovers_on_success() {
        let mut tracker = TargetHealth::new(2);
        tracker.record(ProbeOutcome::Failed);
        tracker.record(ProbeOutcome::Failed);
        assert_eq!(tracker.status(), TargetStatus::Unreachable);

        assert_eq!(tracker.record(ProbeOutcome::Healthy), TargetStatus::Healthy);
        assert_eq!(tracker.consecutive_failures(), 0);
    }

    #[test]
    fn custom_recovery_threshold() {
        let mut tracker = TargetHealth::with_thresholds(1, 2);
        tracker.record(ProbeOutcome::Failed);
        assert_eq!(tracker.record(ProbeOutcome::Healthy), TargetStatus::Unreachable);
        assert_eq!(tracker.record(ProbeOutcome::Healthy), TargetStatus::Healthy);
    }

    #[tokio::test]
    async fn http_probe_to_closed_port_returns_failed() {
        let target = ProbeTarget::parse("http://127.0.0.1:1/healthz").unwrap();
        let result = http_probe(target, Duration::from_millis(200)).await;
        assert_eq!(result, ProbeResult::Failed);
    }

    #[tokio::test]
    async fn https_probe_reports_failed() {
        let target = ProbeTarget::parse("https://127.0.0.1/healthz").unwrap();
        let result = HttpProber::new(Duration::from_millis(100)).probe(&target).await;
        assert_eq!(result, ProbeResult::Failed);
    }
}
