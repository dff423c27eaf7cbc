//! Connection pool for the PostgreSQL store.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;

pub type DbPool = PgPool;

/// Connect a pool sized by `config`.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(config.connect_options()?)
        .await?;

    tracing::info!(
        target_db = %config.redacted_url(),
        pool_size = config.pool_size,
        "Connected to PostgreSQL"
    );

    Ok(pool)
}
