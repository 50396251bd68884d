//! probegate-mutex — per-target probe de-duplication for synthetic monitoring.
//!
//! Prevents overlapping health/latency probes against the same URL and
//! spaces out retries with jittered, escalating backoff.
//!
//! # Architecture
//!
//! ```text
//! ProbeMutex
//!   ├── MutexConfig (backoff sequence, jitter %, lock timeout)
//!   └── registry: TargetKey → slot
//!       ├── LockEntry (acquired_at, generation), expires after lock timeout
//!       └── attempt_count (reset on every successful acquire)
//! ```
//!
//! # Per-target lifecycle
//!
//! ```text
//! UNLOCKED --try_acquire--> LOCKED            (attempt_count = 0)
//! LOCKED   --release------> UNLOCKED
//! LOCKED   --age >= timeout--> EXPIRED        (next try_acquire seizes it)
//! LOCKED   --try_acquire--> LOCKED            (attempt_count += 1, caller backs off)
//! ```
//!
//! The mutex never sleeps. Callers wait out the returned backoff
//! themselves, and must release what they acquire; [`ProbeGuard`] does
//! that on drop.

pub mod backoff;
pub mod config;
pub mod error;
pub mod registry;
pub mod target;

pub use backoff::{apply_jitter, compute_backoff};
pub use config::MutexConfig;
pub use error::{ConfigError, MutexError, MutexResult};
pub use registry::{AcquireResult, MutexStatus, ProbeGuard, ProbeMutex};
pub use target::{ProbeTarget, Scheme, TargetKey};
