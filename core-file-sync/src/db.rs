//! # Database Connection Pool
//!
//! SQLite pool construction for the durable queue and metadata store.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_file_sync::db::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("file-sync.db")).await?;
//! ```
//!
//! For tests, [`create_test_pool`] returns an in-memory database.

use crate::error::{FileSyncError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Database configuration for the SQLite connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file path or `sqlite::memory:`
    pub database_url: String,
    /// Minimum number of connections in the pool
    pub min_connections: u32,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    /// Configuration for a database file at `path`.
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            database_url: format!("sqlite:{}", path.as_ref()),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    /// In-memory configuration.
    ///
    /// Pinned to a single connection: every pooled connection to
    /// `sqlite::memory:` opens its own private database.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    /// Set the maximum number of connections
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Create a configured SQLite connection pool.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(|e| FileSyncError::Database(e.to_string()))?
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(connect_options)
        .await
        .map_err(|e| FileSyncError::Database(e.to_string()))?;

    info!(
        database_url = %config.database_url,
        connections = pool.size(),
        "Database connection pool created"
    );

    Ok(pool)
}

/// Create an in-memory pool for tests.
pub async fn create_test_pool() -> Result<SqlitePool> {
    create_pool(DatabaseConfig::in_memory()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_pool() {
        let pool = create_test_pool().await.unwrap();

        let value: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(value, 1);
    }

    #[test]
    fn test_file_config_url() {
        let config = DatabaseConfig::new("sync.db").max_connections(2);
        assert_eq!(config.database_url, "sqlite:sync.db");
        assert_eq!(config.max_connections, 2);
    }
}
