//! Status API tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use probegate_mutex::{ProbeMutex, ProbeTarget};
use probegate_runner::*;
use tower::ServiceExt;

fn target(url: &str) -> ProbeTarget {
    ProbeTarget::parse(url).unwrap()
}

async fn get_json(router: axum::Router, uri: &str) -> serde_json::Value {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_returns_ok() {
    let state = StatusState {
        mutex: Arc::new(ProbeMutex::default()),
        board: HealthBoard::new(),
    };
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = build_router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn status_reports_locks_attempts_and_targets() {
    let mutex = Arc::new(ProbeMutex::default());
    let board = HealthBoard::new();
    let a = target("http://a/health");
    let b = target("http://b/health");
    board.register(&a, &RunnerConfig::default()).await;
    board.register(&b, &RunnerConfig::default()).await;

    assert!(mutex.try_acquire(&a).acquired);
    assert!(!mutex.try_acquire(&a).acquired);
    assert!(!mutex.try_acquire(&a).acquired);

    let router = build_router(StatusState {
        mutex: mutex.clone(),
        board,
    });

    let json = get_json(router.clone(), "/status").await;
    assert_eq!(json["mutex"]["held_locks"], 1);
    assert_eq!(json["mutex"]["locked_targets"][0], a.key().as_str());
    assert_eq!(json["mutex"]["attempts"][a.key().as_str()], 2);

    let targets = json["targets"].as_array().unwrap();
    assert_eq!(targets.len(), 2);
    let view_a = targets
        .iter()
        .find(|t| t["url"] == "http://a/health")
        .unwrap();
    assert_eq!(view_a["locked"], true);
    assert_eq!(view_a["attempts"], 2);
    assert_eq!(view_a["status"], "unknown");
    assert!(view_a.get("last_report").is_none());

    mutex.release(&a);
    let json = get_json(router, "/status/mutex").await;
    assert_eq!(json["held_locks"], 0);
    assert!(json["locked_targets"].as_array().unwrap().is_empty());
}
