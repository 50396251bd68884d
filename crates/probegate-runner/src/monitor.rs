//! Synthetic monitor — background probe loops, one per target.
//!
//! Each loop sleeps a jittered interval, runs a probe round through the
//! shared [`ProbeRunner`], and folds the report into the [`HealthBoard`].
//! Stopping a loop aborts its task; a round in flight drops its probe
//! guard and releases the target's lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use probegate_mutex::{ProbeMutex, ProbeTarget, TargetKey};

use crate::checker::{Prober, TargetHealth, TargetStatus};
use crate::runner::{ProbeReport, ProbeRunner, RunnerConfig};

/// Health bookkeeping for one monitored target.
#[derive(Debug, Clone)]
struct TargetEntry {
    target: ProbeTarget,
    health: TargetHealth,
    last_report: Option<ProbeReport>,
}

/// Dashboard view of one monitored target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStatusView {
    pub url: String,
    pub target_key: TargetKey,
    pub status: TargetStatus,
    pub consecutive_failures: u32,
    /// Whether a probe currently holds the target's lock.
    pub locked: bool,
    /// The target's contention count in the mutex.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_report: Option<ProbeReport>,
}

/// Shared, cloneable record of every monitored target's health.
#[derive(Debug, Clone, Default)]
pub struct HealthBoard {
    entries: Arc<RwLock<BTreeMap<TargetKey, TargetEntry>>>,
}

impl HealthBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `target` with `config`'s thresholds. Existing
    /// history is kept.
    pub async fn register(&self, target: &ProbeTarget, config: &RunnerConfig) {
        let mut entries = self.entries.write().await;
        entries
            .entry(target.key().clone())
            .or_insert_with(|| TargetEntry {
                target: target.clone(),
                health: TargetHealth::with_thresholds(
                    config.unhealthy_threshold,
                    config.healthy_threshold,
                ),
                last_report: None,
            });
    }

    pub async fn unregister(&self, key: &TargetKey) {
        self.entries.write().await.remove(key);
    }

    /// Fold a round's report into the target's health. Returns the status
    /// before and after, or `None` if the target is not registered.
    pub async fn record(&self, report: ProbeReport) -> Option<(TargetStatus, TargetStatus)> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&report.target_key)?;
        let before = entry.health.status();
        let after = entry.health.record(report.outcome);
        entry.last_report = Some(report);
        Some((before, after))
    }

    pub async fn status(&self, key: &TargetKey) -> Option<TargetStatus> {
        self.entries
            .read()
            .await
            .get(key)
            .map(|entry| entry.health.status())
    }

    /// Per-target view, merged with the mutex's lock state.
    pub async fn snapshot(&self, mutex: &ProbeMutex) -> Vec<TargetStatusView> {
        let entries = self.entries.read().await;
        entries
            .values()
            .map(|entry| TargetStatusView {
                url: entry.target.url().to_string(),
                target_key: entry.target.key().clone(),
                status: entry.health.status(),
                consecutive_failures: entry.health.consecutive_failures(),
                locked: mutex.is_locked(&entry.target),
                attempts: mutex.attempts(&entry.target),
                last_report: entry.last_report.clone(),
            })
            .collect()
    }
}

struct MonitorSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Owns the background probe loops for all configured targets.
pub struct SyntheticMonitor<P> {
    runner: Arc<ProbeRunner<P>>,
    board: HealthBoard,
    monitors: Arc<RwLock<HashMap<TargetKey, MonitorSlot>>>,
}

impl<P: Prober> SyntheticMonitor<P> {
    pub fn new(runner: Arc<ProbeRunner<P>>) -> Self {
        Self {
            runner,
            board: HealthBoard::new(),
            monitors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn board(&self) -> &HealthBoard {
        &self.board
    }

    pub fn mutex(&self) -> &Arc<ProbeMutex> {
        self.runner.mutex()
    }

    /// Start probing `target`, replacing any loop already running for it.
    pub async fn start_target(&self, target: ProbeTarget) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.board
            .register(&target, self.runner.config())
            .await;

        let key = target.key().clone();
        let url = target.url().to_string();
        let runner = self.runner.clone();
        let board = self.board.clone();
        let handle = tokio::spawn(async move {
            run_probe_loop(target, runner, board, shutdown_rx).await;
        });

        let mut monitors = self.monitors.write().await;
        if let Some(old) = monitors.insert(
            key,
            MonitorSlot {
                handle,
                shutdown_tx,
            },
        ) {
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }

        info!(%url, "probe monitor started");
    }

    pub async fn stop_target(&self, target: &ProbeTarget) {
        let mut monitors = self.monitors.write().await;
        if let Some(slot) = monitors.remove(target.key()) {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            self.board.unregister(target.key()).await;
            info!(url = %target, "probe monitor stopped");
        }
    }

    /// Stop every loop (graceful shutdown).
    pub async fn stop_all(&self) {
        let mut monitors = self.monitors.write().await;
        for (key, slot) in monitors.drain() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            debug!(target_key = %key.short(), "probe monitor stopped");
        }
        info!("all probe monitors stopped");
    }

    pub async fn active_targets(&self) -> Vec<TargetKey> {
        let monitors = self.monitors.read().await;
        let mut keys: Vec<_> = monitors.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn is_monitoring(&self, target: &ProbeTarget) -> bool {
        self.monitors.read().await.contains_key(target.key())
    }
}

async fn run_probe_loop<P: Prober>(
    target: ProbeTarget,
    runner: Arc<ProbeRunner<P>>,
    board: HealthBoard,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = runner.config().interval();
    debug!(url = %target, ?interval, "probe loop starting");

    loop {
        let delay = runner.mutex().apply_jitter(interval);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                let report = runner.run_once(&target).await;
                let outcome = report.outcome;
                match board.record(report).await {
                    Some((before, after)) if before != after => match after {
                        TargetStatus::Unreachable => {
                            warn!(url = %target, ?outcome, "target unreachable");
                        }
                        _ => info!(url = %target, status = ?after, "target status changed"),
                    },
                    Some(_) => {}
                    None => debug!(url = %target, "target no longer registered"),
                }
            }
            _ = shutdown.changed() => {
                debug!(url = %target, "probe loop shutting down");
                break;
            }
        }
    }
}
