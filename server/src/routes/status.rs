//! Scheduler status endpoint.

use axum::{extract::State, routing::get, Json, Router};
use ferry_engine::{AdvancePolicy, SchedulerStatus};
use serde::Serialize;

use crate::AppState;

/// Current scheduler snapshot plus the pipeline it drives.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(flatten)]
    pub scheduler: SchedulerStatus,
    pub source_table: String,
    pub target_table: String,
    pub policy: AdvancePolicy,
}

/// Create status routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/status", get(status))
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let scheduler = state.status.borrow().clone();

    Json(StatusResponse {
        scheduler,
        source_table: state.config.source_table.clone(),
        target_table: state.config.target_table.clone(),
        policy: state.config.watermark_policy,
    })
}
