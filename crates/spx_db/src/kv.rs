//! Key-value persistence over a single SQL table.
//!
//! The store knows nothing about configuration semantics: keys and values are
//! opaque strings. Callers that need typed values layer that on top.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::debug;

use crate::error::{DbError, Result};
use crate::sql_guard::{quote_identifier, validate_identifier};

/// Table backing the configuration store.
pub const CONFIGURATION_TABLE: &str = "configuration";

/// One persisted row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KvRecord {
    pub key: String,
    pub value: String,
    /// `None` only for rows written by something that bypassed the default.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Generic string-keyed store.
///
/// `get` distinguishes a missing key ([`DbError::NotFound`]) from a failing
/// database ([`DbError::Persistence`]); only the former is ever swallowed, and
/// only by [`KeyValueStore::get_with_default`].
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Create the backing table if it does not exist.
    async fn create_table(&self) -> Result<()>;

    /// Value for `key`, or `NotFound`.
    async fn get(&self, key: &str) -> Result<String>;

    /// Insert or overwrite `key`, refreshing its timestamp.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write several pairs, one statement at a time, as a single transaction.
    async fn set_many(&self, pairs: &[(String, String)]) -> Result<()>;

    /// Every record ordered by key. Empty table yields an empty vec.
    async fn get_all(&self) -> Result<Vec<KvRecord>>;

    /// Remove `key`. Returns whether a row was deleted; absence is not an error.
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// `get`, substituting `default` on `NotFound` only.
    async fn get_with_default(&self, key: &str, default: &str) -> Result<String> {
        match self.get(key).await {
            Ok(value) => Ok(value),
            Err(DbError::NotFound { .. }) => Ok(default.to_string()),
            Err(err) => Err(err),
        }
    }
}

/// DDL for a key-value table named `table`.
///
/// The caller is responsible for having validated `table`.
pub fn create_table_sql(table: &str) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS {} (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )"#,
        quote_identifier(table)
    )
}

/// SQLite-backed key-value store.
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteKeyValueStore {
    /// Store over the `configuration` table.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            table: CONFIGURATION_TABLE.to_string(),
        }
    }

    /// Store over an arbitrary table. The name must pass the identifier guard.
    pub fn with_table(pool: SqlitePool, table: &str) -> Result<Self> {
        validate_identifier(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether the backing table has been created. No side effects.
    pub async fn table_exists(&self) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(&self.table)
                .fetch_optional(&self.pool)
                .await
                .map_err(DbError::persistence(format!("catalog lookup {}", self.table)))?;
        Ok(found.is_some())
    }

    fn upsert_sql(&self) -> String {
        format!(
            r#"
            INSERT INTO {} (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            quote_identifier(&self.table)
        )
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn create_table(&self) -> Result<()> {
        sqlx::query(&create_table_sql(&self.table))
            .execute(&self.pool)
            .await
            .map_err(DbError::persistence(format!("create table {}", self.table)))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<String> {
        let sql = format!(
            "SELECT value FROM {} WHERE key = ?",
            quote_identifier(&self.table)
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::persistence(format!("get {}", key)))?;

        match row {
            Some(row) => row
                .try_get::<String, _>("value")
                .map_err(DbError::persistence(format!("get {}", key))),
            None => Err(DbError::not_found(key)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(&self.upsert_sql())
            .bind(key)
            .bind(value)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(DbError::persistence(format!("set {}", key)))?;

        debug!(table = %self.table, key, "Stored value");
        Ok(())
    }

    async fn set_many(&self, pairs: &[(String, String)]) -> Result<()> {
        let sql = self.upsert_sql();
        let now = Utc::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(DbError::persistence("begin transaction"))?;

        for (key, value) in pairs {
            sqlx::query(&sql)
                .bind(key)
                .bind(value)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(DbError::persistence(format!("set {}", key)))?;
        }

        tx.commit()
            .await
            .map_err(DbError::persistence("commit transaction"))?;

        debug!(table = %self.table, count = pairs.len(), "Stored values");
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<KvRecord>> {
        let sql = format!(
            "SELECT key, value, updated_at FROM {} ORDER BY key",
            quote_identifier(&self.table)
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::persistence("get_all"))?;

        rows.iter()
            .map(|row| {
                Ok(KvRecord {
                    key: row.try_get("key")?,
                    value: row.try_get("value")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(DbError::persistence("get_all"))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE key = ?", quote_identifier(&self.table));
        let result = sqlx::query(&sql)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(DbError::persistence(format!("delete {}", key)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE key = ? LIMIT 1",
            quote_identifier(&self.table)
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::persistence(format!("exists {}", key)))?;

        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{create_pool, DbConfig};

    async fn store() -> SqliteKeyValueStore {
        let pool = create_pool(&DbConfig::sqlite_memory()).await.unwrap();
        let store = SqliteKeyValueStore::new(pool);
        store.create_table().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_table_exists_after_create() {
        let pool = create_pool(&DbConfig::sqlite_memory()).await.unwrap();
        let store = SqliteKeyValueStore::new(pool);
        assert!(!store.table_exists().await.unwrap());

        store.create_table().await.unwrap();
        assert!(store.table_exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_create_table_is_idempotent() {
        let store = store().await;
        store.create_table().await.unwrap();
        store.create_table().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = store().await;
        let err = store.get("database.path").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_set_then_get_and_overwrite() {
        let store = store().await;
        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), "1");

        store.set("a", "2").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), "2");
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_all_orders_by_key() {
        let store = store().await;
        store.set("processing.tempDir", "t").await.unwrap();
        store.set("database.path", "d").await.unwrap();
        store.set("dataSource.baseUrl", "u").await.unwrap();

        let keys: Vec<String> = store
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(
            keys,
            vec!["dataSource.baseUrl", "database.path", "processing.tempDir"]
        );
    }

    #[tokio::test]
    async fn test_set_records_timestamp() {
        let store = store().await;
        let before = Utc::now() - chrono::Duration::seconds(5);
        store.set("k", "v").await.unwrap();
        let record = store.get_all().await.unwrap().remove(0);
        let updated = record.updated_at.expect("timestamp present");
        assert!(updated >= before);
    }

    #[tokio::test]
    async fn test_delete_and_exists() {
        let store = store().await;
        store.set("k", "v").await.unwrap();
        assert!(store.exists("k").await.unwrap());

        assert!(store.delete("k").await.unwrap());
        assert!(!store.exists("k").await.unwrap());

        // Deleting again is fine
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_with_default_only_on_not_found() {
        let store = store().await;
        assert_eq!(store.get_with_default("k", "fallback").await.unwrap(), "fallback");
        store.set("k", "real").await.unwrap();
        assert_eq!(store.get_with_default("k", "fallback").await.unwrap(), "real");
    }

    #[tokio::test]
    async fn test_get_with_default_propagates_persistence_errors() {
        let pool = create_pool(&DbConfig::sqlite_memory()).await.unwrap();
        // Table never created: every query fails at the engine
        let store = SqliteKeyValueStore::new(pool);
        let err = store.get_with_default("k", "fallback").await.unwrap_err();
        assert!(matches!(err, DbError::Persistence { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_set_many_writes_all() {
        let store = store().await;
        store.set("a", "old").await.unwrap();
        let pairs = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
            ("c".to_string(), "3".to_string()),
        ];
        store.set_many(&pairs).await.unwrap();

        let records = store.get_all().await.unwrap();
        let values: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.key.as_str(), r.value.as_str()))
            .collect();
        assert_eq!(values, vec![("a", "1"), ("b", "2"), ("c", "3")]);
    }

    #[tokio::test]
    async fn test_with_table_rejects_bad_identifier() {
        let pool = create_pool(&DbConfig::sqlite_memory()).await.unwrap();
        let result = SqliteKeyValueStore::with_table(pool, "x; DROP TABLE configuration");
        assert!(matches!(result, Err(DbError::InvalidIdentifier(_))));
    }

    #[tokio::test]
    async fn test_custom_table() {
        let pool = create_pool(&DbConfig::sqlite_memory()).await.unwrap();
        let store = SqliteKeyValueStore::with_table(pool, "settings").unwrap();
        store.create_table().await.unwrap();
        store.set("k", "v").await.unwrap();
        assert_eq!(store.table(), "settings");
        assert_eq!(store.get("k").await.unwrap(), "v");
    }
}
