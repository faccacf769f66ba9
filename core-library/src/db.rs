//! # Database Connection Pool
//!
//! SQLite connection pooling for the offline reading stores.
//!
//! - **WAL mode** for concurrent readers alongside the single writer
//! - **Foreign keys** enforced
//! - **Statement caching** on every pooled connection
//!
//! Schema creation is owned by the repositories: each repository's
//! `initialize` creates its own table and indexes, so a fresh pool becomes
//! usable by initializing the repositories that will run on it.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

use crate::error::Result;

/// Database configuration for the SQLite connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file path or `:memory:` for an in-memory database
    pub database_url: String,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,

    /// Prepared statement cache size per connection
    pub statement_cache_capacity: usize,
}

impl DatabaseConfig {
    /// Configuration for an on-disk database at the given path.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();
        Self {
            database_url: format!("sqlite:{}", path.display()),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            statement_cache_capacity: 100,
        }
    }

    /// Configuration for an in-memory database.
    ///
    /// Pinned to a single connection: each in-memory SQLite connection is
    /// its own database, so a larger pool would scatter the tables.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            statement_cache_capacity: 100,
        }
    }

    /// Set the maximum number of connections
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the acquire timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Create a connection pool from the given configuration.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    debug!(url = %config.database_url, "Opening SQLite pool");

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .statement_cache_capacity(config.statement_cache_capacity);

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(connect_options)
        .await?;

    info!(
        url = %config.database_url,
        max_connections = config.max_connections,
        "SQLite pool ready"
    );

    Ok(pool)
}

/// Create an in-memory pool for tests.
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}
