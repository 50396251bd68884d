//! Per-target probe mutex and backoff registry.
//!
//! The registry maps each [`TargetKey`] to a slot holding the current
//! lock (if any) and the target's contention counter. The outer map is
//! write-locked only the first time a key is seen; every check-and-set
//! after that happens under the slot's own mutex, so distinct targets
//! never serialize on each other.
//!
//! Expiry is checked lazily on acquire. There is no sweeper.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LockResult, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backoff;
use crate::config::MutexConfig;
use crate::error::ConfigError;
use crate::target::{ProbeTarget, TargetKey};

/// A held lock on one target.
#[derive(Debug, Clone, Copy)]
struct LockEntry {
    acquired_at: Instant,
    /// Distinguishes successive holders of the same target.
    generation: u64,
}

#[derive(Debug, Default)]
struct TargetSlot {
    holder: Option<LockEntry>,
    /// Contended acquires since the last successful one.
    attempt_count: u32,
}

impl TargetSlot {
    fn live_holder(&self, now: Instant, timeout: Duration) -> Option<&LockEntry> {
        self.holder
            .as_ref()
            .filter(|entry| now.saturating_duration_since(entry.acquired_at) < timeout)
    }
}

/// Outcome of [`ProbeMutex::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquireResult {
    /// Whether the caller now holds the target's lock.
    pub acquired: bool,
    /// How long to wait before retrying. Zero when acquired.
    pub backoff: Duration,
    /// The target's contention count that produced `backoff`. Zero when acquired.
    pub attempt: u32,
}

impl AcquireResult {
    fn acquired() -> Self {
        Self {
            acquired: true,
            backoff: Duration::ZERO,
            attempt: 0,
        }
    }

    pub fn backoff_secs(&self) -> f64 {
        self.backoff.as_secs_f64()
    }
}

/// Read-only view of the registry for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutexStatus {
    /// Locks currently held and not yet expired.
    pub held_locks: usize,
    pub locked_targets: Vec<TargetKey>,
    /// Contention count for every target the registry has seen.
    pub attempts: BTreeMap<TargetKey, u32>,
}

/// Guarantees at most one in-flight probe per target and hands out
/// jittered backoff to callers that lose the race.
#[derive(Debug)]
pub struct ProbeMutex {
    config: MutexConfig,
    backoff_sequence: Vec<Duration>,
    lock_timeout: Duration,
    slots: RwLock<HashMap<TargetKey, Arc<Mutex<TargetSlot>>>>,
    next_generation: AtomicU64,
}

impl Default for ProbeMutex {
    fn default() -> Self {
        Self::with_valid_config(MutexConfig::default())
    }
}

impl ProbeMutex {
    /// Create a mutex, validating `config` first.
    pub fn new(config: MutexConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_valid_config(config.validate()?))
    }

    fn with_valid_config(config: MutexConfig) -> Self {
        Self {
            backoff_sequence: config.backoff_sequence(),
            lock_timeout: config.lock_timeout(),
            config,
            slots: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &MutexConfig {
        &self.config
    }

    /// Try to take the lock for `target` without blocking.
    ///
    /// A missing or expired lock is taken and the target's contention
    /// count reset. A live lock bumps the count and returns a backoff
    /// computed from it.
    pub fn try_acquire(&self, target: &ProbeTarget) -> AcquireResult {
        self.acquire(target).0
    }

    /// Like [`try_acquire`](Self::try_acquire), but on success returns a
    /// guard that releases the lock when dropped, including on panic or
    /// when the owning future is cancelled.
    pub fn lock(&self, target: &ProbeTarget) -> Result<ProbeGuard<'_>, AcquireResult> {
        match self.acquire(target) {
            (_, Some(generation)) => Ok(ProbeGuard {
                mutex: self,
                key: target.key().clone(),
                generation,
            }),
            (contended, None) => Err(contended),
        }
    }

    /// Release the lock for `target`. Releasing an unlocked target is a no-op.
    pub fn release(&self, target: &ProbeTarget) {
        self.release_matching(target.key(), None);
    }

    /// Jittered backoff for the given contention count.
    pub fn compute_backoff(&self, attempt: u32) -> Duration {
        backoff::compute_backoff(&self.backoff_sequence, self.config.jitter_pct, attempt)
    }

    /// Jitter an arbitrary delay with the configured percentage.
    pub fn apply_jitter(&self, base: Duration) -> Duration {
        backoff::apply_jitter(base, self.config.jitter_pct)
    }

    /// Whether `target` is held by a live (non-expired) lock.
    pub fn is_locked(&self, target: &ProbeTarget) -> bool {
        let Some(slot) = self.existing_slot(target.key()) else {
            return false;
        };
        let slot = recover(slot.lock(), "target slot");
        slot.live_holder(Instant::now(), self.lock_timeout).is_some()
    }

    /// Current contention count for `target`.
    pub fn attempts(&self, target: &ProbeTarget) -> u32 {
        let Some(slot) = self.existing_slot(target.key()) else {
            return 0;
        };
        let slot = recover(slot.lock(), "target slot");
        slot.attempt_count
    }

    /// Snapshot held locks and contention counts.
    pub fn status(&self) -> MutexStatus {
        let now = Instant::now();
        let slots = recover(self.slots.read(), "registry");

        let mut locked_targets = Vec::new();
        let mut attempts = BTreeMap::new();
        for (key, slot) in slots.iter() {
            let slot = recover(slot.lock(), "target slot");
            if slot.live_holder(now, self.lock_timeout).is_some() {
                locked_targets.push(key.clone());
            }
            attempts.insert(key.clone(), slot.attempt_count);
        }
        locked_targets.sort();

        MutexStatus {
            held_locks: locked_targets.len(),
            locked_targets,
            attempts,
        }
    }

    /// Returns the result and, on success, the new holder's generation.
    fn acquire(&self, target: &ProbeTarget) -> (AcquireResult, Option<u64>) {
        let key = target.key();
        let slot = self.slot(key);
        let now = Instant::now();
        let mut slot = recover(slot.lock(), "target slot");

        if slot.live_holder(now, self.lock_timeout).is_some() {
            slot.attempt_count = slot.attempt_count.saturating_add(1);
            let attempt = slot.attempt_count;
            drop(slot);

            let backoff = self.compute_backoff(attempt);
            debug!(
                target_key = %key.short(),
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "probe lock contended"
            );
            return (
                AcquireResult {
                    acquired: false,
                    backoff,
                    attempt,
                },
                None,
            );
        }

        if let Some(stale) = slot.holder {
            warn!(
                target_key = %key.short(),
                held_for_ms = now.saturating_duration_since(stale.acquired_at).as_millis() as u64,
                "seizing expired probe lock"
            );
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        slot.holder = Some(LockEntry {
            acquired_at: now,
            generation,
        });
        slot.attempt_count = 0;
        debug!(target_key = %key.short(), url = %target, "probe lock acquired");

        (AcquireResult::acquired(), Some(generation))
    }

    /// Clear the holder of `key`. With `generation` set, only clear it if
    /// that generation still holds the lock.
    fn release_matching(&self, key: &TargetKey, generation: Option<u64>) {
        let Some(slot) = self.existing_slot(key) else {
            return;
        };
        let mut slot = recover(slot.lock(), "target slot");

        match (slot.holder, generation) {
            (Some(entry), Some(expected)) if entry.generation != expected => {
                debug!(
                    target_key = %key.short(),
                    "probe lock already taken over, skipping release"
                );
            }
            (Some(_), _) => {
                slot.holder = None;
                debug!(target_key = %key.short(), "probe lock released");
            }
            (None, _) => {}
        }
    }

    fn existing_slot(&self, key: &TargetKey) -> Option<Arc<Mutex<TargetSlot>>> {
        recover(self.slots.read(), "registry").get(key).cloned()
    }

    fn slot(&self, key: &TargetKey) -> Arc<Mutex<TargetSlot>> {
        if let Some(slot) = self.existing_slot(key) {
            return slot;
        }
        recover(self.slots.write(), "registry")
            .entry(key.clone())
            .or_default()
            .clone()
    }
}

/// Holds a target's probe lock; dropping it releases the lock.
#[derive(Debug)]
#[must_use = "dropping the guard releases the probe lock immediately"]
pub struct ProbeGuard<'a> {
    mutex: &'a ProbeMutex,
    key: TargetKey,
    generation: u64,
}

impl ProbeGuard<'_> {
    pub fn key(&self) -> &TargetKey {
        &self.key
    }

    /// Release explicitly. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.mutex.release_matching(&self.key, Some(self.generation));
    }
}

/// Take the inner guard out of a poisoned lock. A probe that panicked
/// while holding a slot must not wedge the target forever.
fn recover<G>(result: LockResult<G>, lock: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(lock, "recovering poisoned probe mutex lock");
        poisoned.into_inner()
    })
}
