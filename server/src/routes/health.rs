//! Health check endpoint.

use axum::{extract::State, routing::get, Json, Router};
use ferry_engine::Phase;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::AppState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

/// Health check handler. Fails once the scheduler has halted on an error.
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let status = state.status.borrow().clone();

    if status.phase == Phase::Stopped {
        if let Some(outcome) = status.last_outcome.filter(|o| !o.success) {
            return Err(AppError::Halted(outcome.error.unwrap_or_default()));
        }
    }

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Root handler.
async fn root() -> &'static str {
    "Ferry Sync Server"
}
