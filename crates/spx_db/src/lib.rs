//! SQLite persistence layer for the SPX pipeline.
//!
//! Two pieces share one connection pool:
//!
//! - [`SqliteKeyValueStore`]: generic string-keyed CRUD over one table
//!   (the `configuration` table by default).
//! - [`TableManager`]: status, safe initialization and confirmed forced
//!   re-initialization of the application tables.
//!
//! # Usage
//!
//! ```rust,ignore
//! use spx_db::{Database, KeyValueStore, Result};
//!
//! let db = Database::open("./data/spx-pipeline.db").await?;
//!
//! let status = db.table_manager().status().await?;
//! let store = db.key_value_store();
//! store.set("database.path", "./data/spx-pipeline.db").await?;
//!
//! db.close().await;
//! ```

mod error;
pub mod kv;
mod pool;
pub mod schema;
pub mod sql_guard;
pub mod tables;

pub use error::{DbError, Result};
pub use kv::{KeyValueStore, KvRecord, SqliteKeyValueStore, CONFIGURATION_TABLE};
pub use pool::{create_pool, DbConfig, DbLocation};
pub use schema::{application_tables, TableDef};
pub use tables::{ForceInitOutcome, SafeInitOutcome, StatusReport, TableInfo, TableManager};

use sqlx::sqlite::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// An open database handle scoped to one command.
///
/// Tables are not created on open; that is the job of [`TableManager`] and
/// of [`KeyValueStore::create_table`].
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    location: DbLocation,
}

impl Database {
    /// Open or create a database file at `path`.
    ///
    /// The parent directory is created if it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let config = DbConfig::sqlite(path);
        let pool = create_pool(&config).await?;

        info!(path = %path.display(), "Database opened");
        Ok(Self {
            pool,
            location: config.location,
        })
    }

    /// Open a database file only if it already exists.
    ///
    /// Returns `None` for a missing file and creates nothing on disk, so
    /// read-only commands can run against a path that was never written.
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.is_file() {
            debug!(path = %path.display(), "Database file does not exist");
            return Ok(None);
        }

        let config = DbConfig::sqlite(path).existing_only();
        let pool = create_pool(&config).await?;

        info!(path = %path.display(), "Database opened");
        Ok(Some(Self {
            pool,
            location: config.location,
        }))
    }

    /// Open a private in-memory database.
    pub async fn open_memory() -> Result<Self> {
        let config = DbConfig::sqlite_memory();
        let pool = create_pool(&config).await?;
        Ok(Self {
            pool,
            location: config.location,
        })
    }

    /// File path, or `None` for an in-memory database.
    pub fn path(&self) -> Option<PathBuf> {
        match &self.location {
            DbLocation::File(path) => Some(path.clone()),
            DbLocation::Memory => None,
        }
    }

    /// Get the underlying connection pool.
    ///
    /// Prefer the typed stores instead.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Key-value store over the `configuration` table.
    pub fn key_value_store(&self) -> SqliteKeyValueStore {
        SqliteKeyValueStore::new(self.pool.clone())
    }

    /// Lifecycle manager over the application tables.
    pub fn table_manager(&self) -> TableManager {
        TableManager::new(self.pool.clone())
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_database_and_parent() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("data").join("test.db");

        let db = Database::open(&db_path).await.unwrap();
        assert_eq!(db.path(), Some(db_path.clone()));
        db.table_manager().safe_init().await.unwrap();
        db.close().await;

        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_open_existing_leaves_missing_path_alone() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("typo").join("dir").join("x.db");

        assert!(Database::open_existing(&db_path).await.unwrap().is_none());
        assert!(!tmp.path().join("typo").exists());
    }

    #[tokio::test]
    async fn test_open_existing_reads_written_file() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("x.db");

        let db = Database::open(&db_path).await.unwrap();
        db.table_manager().safe_init().await.unwrap();
        db.key_value_store().set("k", "v").await.unwrap();
        db.close().await;

        let db = Database::open_existing(&db_path).await.unwrap().unwrap();
        assert_eq!(db.key_value_store().get("k").await.unwrap(), "v");
        db.close().await;
    }

    #[tokio::test]
    async fn test_open_does_not_create_tables() {
        let db = Database::open_memory().await.unwrap();
        let report = db.table_manager().status().await.unwrap();
        assert_eq!(report.existing, 0);
        assert!(db.path().is_none());
    }

    #[tokio::test]
    async fn test_store_and_manager_share_pool() {
        let db = Database::open_memory().await.unwrap();
        db.table_manager().safe_init().await.unwrap();
        db.key_value_store().set("k", "v").await.unwrap();

        let report = db.table_manager().status().await.unwrap();
        let config = report
            .tables
            .iter()
            .find(|t| t.name == CONFIGURATION_TABLE)
            .unwrap();
        assert_eq!(config.row_count, 1);
    }
}
