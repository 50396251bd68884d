//! probegate-runner — synthetic probe runner built on `probegate-mutex`.
//!
//! # Architecture
//!
//! ```text
//! SyntheticMonitor
//!   ├── Per-target background task
//!   │   ├── ProbeRunner::run_once
//!   │   │   ├── ProbeMutex::lock (retry once after backoff, else Skipped)
//!   │   │   └── Prober::probe × samples, jittered delay between samples
//!   │   └── HealthBoard::record → TargetHealth (consecutive failures)
//!   └── Status API (axum): /healthz, /status, /status/mutex
//! ```
//!
//! A target is reported unreachable only after `unhealthy_threshold`
//! consecutive failed rounds. Rounds skipped because another probe held
//! the target do not count either way.

pub mod api;
pub mod checker;
pub mod error;
pub mod monitor;
pub mod runner;

pub use api::{StatusResponse, StatusState, build_router};
pub use checker::{HttpProber, ProbeResult, Prober, TargetHealth, TargetStatus, http_probe};
pub use error::RunnerConfigError;
pub use monitor::{HealthBoard, SyntheticMonitor, TargetStatusView};
pub use runner::{ProbeOutcome, ProbeReport, ProbeRunner, RunnerConfig, Sample};
