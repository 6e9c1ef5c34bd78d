//! Common error types for the lunch voucher workspace.
//!
//! `AppError` is what callers of the service see; `DatabaseError` is raised
//! by the shared `db` crate and the MySQL store.

use thiserror::Error;

/// Application-level errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Export error: {0}")]
    Export(String),
}

impl AppError {
    /// Stable code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "CONFIGURATION_MISSING",
            AppError::Database(db) => db.code(),
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Export(_) => "EXPORT_FAILED",
        }
    }
}

/// Database-related errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}

impl DatabaseError {
    pub fn code(&self) -> &'static str {
        match self {
            DatabaseError::ConnectionFailed(_) => "DB_CONNECTION_FAILED",
            DatabaseError::QueryFailed(_) => "DB_QUERY_FAILED",
            DatabaseError::TransactionFailed(_) => "DB_TRANSACTION_FAILED",
        }
    }
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;
