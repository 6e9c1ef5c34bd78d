//! Database utilities and connection pooling for the lunch voucher service.
//!
//! This crate provides MySQL connection pool management using sqlx.

mod pool;
mod config;

pub use pool::{begin, create_pool, health_check, DbPool};
pub use config::DbConfig;

pub use sqlx::MySql;
