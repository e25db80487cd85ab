//! Ferry Server - source to target record replication over PostgreSQL.
//!
//! Bootstraps the target table with a paginated copy, then propagates
//! changes on an interval until Ctrl-C or until the sync halts.

use ferry_engine::{RetryConfig, Scheduler, SyncEngine, Watermark};
use ferry_server::config::Config;
use ferry_server::db::{self, PgRecordStore};
use ferry_server::error::AppError;
use ferry_server::{app, spawn_sync, AppState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ferry_server=debug,ferry_engine=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Ferry Server on {}:{}", config.host, config.port);
    if let Some(warning) = config.policy_warning() {
        tracing::warn!("{}", warning);
    }

    // Create database pools
    let source_pool = db::create_pool(&config.source_database_url).await?;
    let target_pool = if config.shares_database() {
        source_pool.clone()
    } else {
        db::create_pool(&config.target_database_url).await?
    };

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&source_pool).await?;
    if !config.shares_database() {
        db::run_migrations(&target_pool).await?;
    }

    let source = PgRecordStore::new(source_pool, config.source_table.clone());
    let target = PgRecordStore::new(target_pool, config.target_table.clone());
    source.ensure_table().await?;
    target.ensure_table().await?;

    // Build the sync pipeline
    let shutdown = CancellationToken::new();
    let engine = SyncEngine::new(source, target)
        .with_retry(RetryConfig::new(config.retry_max_attempts))
        .with_policy(config.watermark_policy)
        .with_cancellation(shutdown.clone());
    let scheduler = match config.resume_from {
        Some(ts) => {
            tracing::info!(watermark = ts, "resuming delta sync, bootstrap skipped");
            Scheduler::resume(engine, config.scheduler(), Watermark::at(ts))
        }
        None => Scheduler::new(engine, config.scheduler()),
    };

    let state = AppState {
        status: scheduler.subscribe(),
        config: Arc::new(config.clone()),
    };
    let sync_task = spawn_sync(scheduler, shutdown.clone());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    let signal = shutdown.clone();
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown requested"),
                _ = signal.cancelled() => {}
            }
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    match sync_task.await {
        Ok(Ok(watermark)) => {
            tracing::info!(%watermark, "Sync stopped; set RESUME_FROM={} to continue", watermark);
            Ok(())
        }
        Ok(Err(err)) => {
            tracing::error!(error = %err, "Sync halted");
            Err(err.into())
        }
        Err(join) => {
            tracing::error!(error = %join, "Sync task aborted");
            Err(AppError::Halted(join.to_string()))
        }
    }
}
