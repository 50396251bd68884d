//! Read-only status API.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | Liveness of the daemon itself |
//! | GET | `/status` | Mutex state plus per-target health |
//! | GET | `/status/mutex` | Mutex state only |

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use serde::Serialize;

use probegate_mutex::{MutexStatus, ProbeMutex};

use crate::monitor::{HealthBoard, TargetStatusView};

/// Shared state for status handlers.
#[derive(Clone)]
pub struct StatusState {
    pub mutex: Arc<ProbeMutex>,
    pub board: HealthBoard,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub mutex: MutexStatus,
    pub targets: Vec<TargetStatusView>,
}

pub fn build_router(state: StatusState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .route("/status/mutex", get(mutex_status))
        .with_state(state)
}

/// GET /healthz
async fn healthz() -> &'static str {
    "ok"
}

/// GET /status
async fn status(State(state): State<StatusState>) -> Json<StatusResponse> {
    let targets = state.board.snapshot(&state.mutex).await;
    Json(StatusResponse {
        mutex: state.mutex.status(),
        targets,
    })
}

/// GET /status/mutex
async fn mutex_status(State(state): State<StatusState>) -> Json<MutexStatus> {
    Json(state.mutex.status())
}
