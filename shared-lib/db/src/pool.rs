//! Database connection pool management.

use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, MySqlPool, Transaction};
use std::time::Duration;

use crate::config::DbConfig;
use error::DatabaseError;

/// Type alias for MySQL connection pool.
pub type DbPool = MySqlPool;

/// Create a new database connection pool.
///
/// One connection is opened eagerly, so a bad URL fails here rather than
/// inside the first unit of work.
pub async fn create_pool(config: &DbConfig) -> Result<DbPool, DatabaseError> {
    tracing::info!(
        "Creating lunch voucher database pool: {}:{}/{}",
        config.host,
        config.port,
        config.database
    );

    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.connection_url())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create database pool: {}", e);
            DatabaseError::ConnectionFailed(e.to_string())
        })?;

    tracing::info!(
        max_connections = config.max_connections,
        "Database pool created successfully"
    );
    Ok(pool)
}

/// Open a transaction on the pool.
pub async fn begin(pool: &DbPool) -> Result<Transaction<'static, MySql>, DatabaseError> {
    pool.begin().await.map_err(|e| {
        tracing::error!("Failed to begin transaction: {}", e);
        DatabaseError::TransactionFailed(e.to_string())
    })
}

/// Check if the database connection is healthy.
pub async fn health_check(pool: &DbPool) -> Result<(), DatabaseError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| {
            tracing::warn!("Database health check failed: {}", e);
            DatabaseError::QueryFailed(e.to_string())
        })?;
    Ok(())
}
