//! Connection pool creation.
//!
//! SQLite only. A command opens one pool, uses it, and closes it before the
//! process exits; nothing here is shared between commands.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, Result};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the pool points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    File(PathBuf),
    Memory,
}

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub location: DbLocation,
    /// Maximum connections in the pool
    pub max_connections: u32,
    /// Create the file when it does not exist
    pub create_if_missing: bool,
}

impl DbConfig {
    /// Create SQLite configuration for a database file.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            location: DbLocation::File(path.into()),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            create_if_missing: true,
        }
    }

    /// Create in-memory SQLite configuration (for testing).
    ///
    /// Every connection to `:memory:` is a separate database, so the pool is
    /// pinned to a single connection that never expires.
    pub fn sqlite_memory() -> Self {
        Self {
            location: DbLocation::Memory,
            max_connections: 1,
            create_if_missing: true,
        }
    }

    /// Fail to connect instead of creating a missing file.
    pub fn existing_only(mut self) -> Self {
        self.create_if_missing = false;
        self
    }

    /// Set maximum connections.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Path used in error messages.
    pub fn display_path(&self) -> PathBuf {
        match &self.location {
            DbLocation::File(path) => path.clone(),
            DbLocation::Memory => PathBuf::from(":memory:"),
        }
    }
}

/// Create a database pool from configuration.
///
/// File databases are created if missing unless the config says otherwise
/// (the parent directory must exist) and run in WAL mode with NORMAL sync.
pub async fn create_pool(config: &DbConfig) -> Result<SqlitePool> {
    let (options, pool_options) = match &config.location {
        DbLocation::File(path) => (
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(config.create_if_missing)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .busy_timeout(BUSY_TIMEOUT),
            SqlitePoolOptions::new().max_connections(config.max_connections),
        ),
        DbLocation::Memory => (
            SqliteConnectOptions::new().in_memory(true),
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
        ),
    };

    debug!(path = %config.display_path().display(), "Connecting to SQLite");
    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|source| DbError::Connection {
            path: config.display_path(),
            source,
        })?;

    info!(path = %config.display_path().display(), "Connected to SQLite database");
    Ok(pool)
}
