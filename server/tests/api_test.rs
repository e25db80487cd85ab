//! HTTP surface tests, driven through the router without a socket.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use ferry_engine::{CycleOutcome, Phase, SchedulerStatus, StrategyKind};
use ferry_server::config::Config;
use ferry_server::{app, AppState};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceExt;

fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "SOURCE_DATABASE_URL" => Some("postgres://localhost/ferry".to_string()),
        _ => None,
    })
    .unwrap()
}

fn state(status: SchedulerStatus) -> (watch::Sender<SchedulerStatus>, AppState) {
    let (tx, rx) = watch::channel(status);
    let state = AppState {
        config: Arc::new(test_config()),
        status: rx,
    };
    (tx, state)
}

fn bootstrapping() -> SchedulerStatus {
    SchedulerStatus {
        phase: Phase::Bootstrapping,
        cycle: 0,
        watermark: 0,
        last_outcome: None,
    }
}

fn failed_outcome(cycle: u64) -> CycleOutcome {
    CycleOutcome {
        cycle,
        strategy: StrategyKind::Delta,
        processed: 2,
        success: false,
        error: Some("delta sync failed after 2 records: store write rejected: duplicate".into()),
        watermark: 40,
        duration_ms: 3,
    }
}

async fn get(state: AppState, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn root_banner() {
    let (_tx, state) = state(bootstrapping());

    let (status, body) = get(state, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"Ferry Sync Server");
}

#[tokio::test]
async fn health_reports_version() {
    let (_tx, state) = state(bootstrapping());

    let (status, body) = get(state, "/health").await;
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn health_fails_once_sync_halts() {
    let (tx, state) = state(bootstrapping());
    tx.send_replace(SchedulerStatus {
        phase: Phase::Stopped,
        cycle: 5,
        watermark: 40,
        last_outcome: Some(failed_outcome(5)),
    });

    let (status, body) = get(state, "/health").await;
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "Sync halted");
    assert!(json["details"].as_str().unwrap().contains("duplicate"));
}

#[tokio::test]
async fn transient_failure_keeps_health_green() {
    let (tx, state) = state(bootstrapping());
    tx.send_replace(SchedulerStatus {
        phase: Phase::SteadyState,
        cycle: 5,
        watermark: 40,
        last_outcome: Some(failed_outcome(5)),
    });

    let (status, _) = get(state, "/health").await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn status_reflects_latest_snapshot() {
    let (tx, state) = state(bootstrapping());
    tx.send_replace(SchedulerStatus {
        phase: Phase::SteadyState,
        cycle: 7,
        watermark: 1706745600000,
        last_outcome: Some(failed_outcome(7)),
    });

    let (status, body) = get(state, "/status").await;
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["phase"], "steady-state");
    assert_eq!(json["cycle"], 7);
    assert_eq!(json["watermark"], 1706745600000u64);
    assert_eq!(json["lastOutcome"]["strategy"], "delta");
    assert_eq!(json["lastOutcome"]["success"], false);
    assert_eq!(json["sourceTable"], "source_records");
    assert_eq!(json["targetTable"], "target_records");
    assert_eq!(json["policy"], "max-observed");
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let (_tx, state) = state(bootstrapping());

    let (status, _) = get(state, "/sync/push").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
