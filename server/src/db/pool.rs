//! Database connection pool management.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Type alias for the database pool.
pub type Pool = PgPool;

/// Connections per pool.
pub const MAX_CONNECTIONS: u32 = 5;

/// Create a connection pool for one side of the pipeline.
///
/// Acquiring a connection gives up after `acquire_timeout`; the failure then
/// surfaces as a transient store error and the cycle is retried.
pub async fn create_pool_with(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<Pool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await?;
    tracing::debug!(max_connections, "database pool ready");
    Ok(pool)
}

/// Create a pool with default sizing.
pub async fn create_pool(database_url: &str) -> Result<Pool, sqlx::Error> {
    create_pool_with(database_url, MAX_CONNECTIONS, Duration::from_secs(5)).await
}

/// Create the default record tables.
pub async fn run_migrations(pool: &Pool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
