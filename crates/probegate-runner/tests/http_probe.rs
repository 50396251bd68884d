//! HTTP probe tests against a local axum server.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use probegate_mutex::{ProbeMutex, ProbeTarget};
use probegate_runner::*;

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/broken",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn target(url: String) -> ProbeTarget {
    ProbeTarget::parse(&url).unwrap()
}

#[tokio::test]
async fn probe_2xx_is_healthy() {
    let base = spawn_server().await;
    let result = http_probe(target(format!("{base}/healthz")), Duration::from_secs(2)).await;
    assert_eq!(result, ProbeResult::Healthy);
}

#[tokio::test]
async fn probe_non_2xx_is_unhealthy() {
    let base = spawn_server().await;
    let result = http_probe(target(format!("{base}/broken")), Duration::from_secs(2)).await;
    assert_eq!(result, ProbeResult::Unhealthy);

    let missing = http_probe(target(format!("{base}/nope")), Duration::from_secs(2)).await;
    assert_eq!(missing, ProbeResult::Unhealthy);
}

#[tokio::test]
async fn probe_timeout_is_failed() {
    let base = spawn_server().await;
    let result = http_probe(target(format!("{base}/slow")), Duration::from_millis(100)).await;
    assert_eq!(result, ProbeResult::Failed);
}

#[tokio::test]
async fn runner_end_to_end_over_http() {
    let base = spawn_server().await;
    let config = RunnerConfig {
        samples: 2,
        sample_delay_secs: 0.01,
        timeout_secs: 2.0,
        ..Default::default()
    };
    let runner = Arc::new(ProbeRunner::new(
        Arc::new(ProbeMutex::default()),
        HttpProber::new(config.timeout()),
        config,
    ));

    let healthy = target(format!("{base}/healthz"));
    let broken = target(format!("{base}/broken"));
    let reports = runner.run_round(&[healthy.clone(), broken.clone()]).await;

    assert_eq!(reports[0].outcome, ProbeOutcome::Healthy);
    assert_eq!(reports[0].samples.len(), 2);
    assert_eq!(reports[1].outcome, ProbeOutcome::Unhealthy);
    assert!(!runner.mutex().is_locked(&healthy));
    assert!(!runner.mutex().is_locked(&broken));

    let json = serde_json::to_value(&reports[0]).unwrap();
    assert_eq!(json["outcome"], "healthy");
    assert_eq!(json["samples"][0]["result"], "healthy");
}
