//! Ferry Server - keeps a PostgreSQL target table converged with a source table.
//!
//! The binary runs the ferry-engine scheduler against two [`db::PgRecordStore`]s
//! and exposes its progress over HTTP.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;

use crate::config::Config;
use axum::Router;
use ferry_engine::error::SyncError;
use ferry_engine::{RecordStore, Scheduler, SchedulerStatus, Watermark};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Latest snapshot published by the scheduler
    pub status: watch::Receiver<SchedulerStatus>,
}

/// Build the HTTP application around `state`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}

/// Run `scheduler` on its own task.
///
/// A scheduler that halts on an error cancels `shutdown`, so the HTTP server
/// drains and the process exits with that error instead of serving 503s.
pub fn spawn_sync<S, T>(
    scheduler: Scheduler<S, T>,
    shutdown: CancellationToken,
) -> JoinHandle<Result<Watermark, SyncError>>
where
    S: RecordStore + 'static,
    T: RecordStore + 'static,
{
    tokio::spawn(async move {
        let result = scheduler.run().await;
        if let Err(err) = &result {
            tracing::error!(error = %err, "sync halted, shutting down");
            shutdown.cancel();
        }
        result
    })
}
