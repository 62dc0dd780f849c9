//! Configuration service: typed reads and validated writes over a
//! [`KeyValueStore`].

use spx_db::{KeyValueStore, KvRecord};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::schema::{defaults, validate_all, validate_field, ConfigKey, Configuration};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Reads merge persisted values over defaults; writes validate one field
/// before anything reaches the store.
pub struct ConfigService<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> ConfigService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create the backing table if needed. Safe to call on every command.
    pub async fn initialize(&self) -> Result<()> {
        self.store.create_table().await?;
        Ok(())
    }

    /// Effective configuration: defaults, overridden key by key by persisted
    /// values, validated as a whole.
    pub async fn get_full(&self) -> Result<Configuration> {
        let records = self.store.get_all().await?;
        if records.is_empty() {
            debug!("No persisted configuration, using defaults");
            return Ok(defaults());
        }

        let mut merged: BTreeMap<ConfigKey, String> = defaults().to_records().into_iter().collect();
        for record in records {
            match record.key.parse::<ConfigKey>() {
                Ok(key) => {
                    merged.insert(key, record.value);
                }
                Err(_) => warn!(key = %record.key, "Ignoring unknown configuration key"),
            }
        }

        Ok(validate_all(&merged)?)
    }

    /// Same contract as [`ConfigService::get_full`]; named for the CLI verb.
    pub async fn validate_full(&self) -> Result<Configuration> {
        self.get_full().await
    }

    /// Validate `raw` for `key` and persist it unchanged.
    pub async fn set_value(&self, key: &str, raw: &str) -> Result<ConfigKey> {
        let key: ConfigKey = key.parse()?;
        validate_field(key, raw)?;
        self.store.set(key.as_str(), raw).await?;
        info!(key = %key, value = raw, "Configuration updated");
        Ok(key)
    }

    /// Persisted value for `key`. A key that was never set is `NotFound`.
    pub async fn get_value(&self, key: &str) -> Result<String> {
        let key: ConfigKey = key.parse()?;
        Ok(self.store.get(key.as_str()).await?)
    }

    /// Remove the persisted value so the default applies again.
    pub async fn unset_value(&self, key: &str) -> Result<bool> {
        let key: ConfigKey = key.parse()?;
        let removed = self.store.delete(key.as_str()).await?;
        if removed {
            info!(key = %key, "Configuration value removed");
        }
        Ok(removed)
    }

    /// Raw persisted rows, ordered by key.
    pub async fn records(&self) -> Result<Vec<KvRecord>> {
        Ok(self.store.get_all().await?)
    }

    /// Write every default value.
    pub async fn reset(&self) -> Result<Configuration> {
        let config = defaults();
        let pairs: Vec<(String, String)> = config
            .to_records()
            .into_iter()
            .map(|(key, value)| (key.as_str().to_string(), value))
            .collect();
        self.store.set_many(&pairs).await?;
        info!("Configuration reset to defaults");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationRule;
    use async_trait::async_trait;
    use spx_db::{Database, DbError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    async fn service() -> ConfigService<spx_db::SqliteKeyValueStore> {
        let db = Database::open_memory().await.unwrap();
        let service = ConfigService::new(db.key_value_store());
        service.initialize().await.unwrap();
        service
    }

    /// In-memory store that counts every call.
    #[derive(Default)]
    struct CountingStore {
        rows: Mutex<BTreeMap<String, String>>,
        calls: AtomicUsize,
    }

    impl CountingStore {
        fn touch(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl KeyValueStore for CountingStore {
        async fn create_table(&self) -> spx_db::Result<()> {
            self.touch();
            Ok(())
        }

        async fn get(&self, key: &str) -> spx_db::Result<String> {
            self.touch();
            self.rows
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| DbError::not_found(key))
        }

        async fn set(&self, key: &str, value: &str) -> spx_db::Result<()> {
            self.touch();
            self.rows
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn set_many(&self, pairs: &[(String, String)]) -> spx_db::Result<()> {
            self.touch();
            let mut rows = self.rows.lock().unwrap();
            for (key, value) in pairs {
                rows.insert(key.clone(), value.clone());
            }
            Ok(())
        }

        async fn get_all(&self) -> spx_db::Result<Vec<KvRecord>> {
            self.touch();
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .map(|(key, value)| KvRecord {
                    key: key.clone(),
                    value: value.clone(),
                    updated_at: None,
                })
                .collect())
        }

        async fn delete(&self, key: &str) -> spx_db::Result<bool> {
            self.touch();
            Ok(self.rows.lock().unwrap().remove(key).is_some())
        }

        async fn exists(&self, key: &str) -> spx_db::Result<bool> {
            self.touch();
            Ok(self.rows.lock().unwrap().contains_key(key))
        }
    }

    #[tokio::test]
    async fn test_empty_store_yields_defaults() {
        let service = service().await;
        assert_eq!(service.get_full().await.unwrap(), defaults());
    }

    #[tokio::test]
    async fn test_set_then_get_full_merges_over_defaults() {
        let service = service().await;
        service
            .set_value("dataSource.maxConcurrentRequests", "8")
            .await
            .unwrap();

        let config = service.get_full().await.unwrap();
        assert_eq!(config.data_source.max_concurrent_requests, 8);
        assert_eq!(config.data_source.base_url, defaults().data_source.base_url);
        assert_eq!(config.processing, defaults().processing);
    }

    #[tokio::test]
    async fn test_set_value_stores_raw_string() {
        let service = service().await;
        service
            .set_value("dataSource.baseUrl", "https://data.example.com/v2")
            .await
            .unwrap();
        assert_eq!(
            service.get_value("dataSource.baseUrl").await.unwrap(),
            "https://data.example.com/v2"
        );
    }

    #[tokio::test]
    async fn test_invalid_value_is_not_persisted() {
        let service = service().await;
        service
            .set_value("dataSource.maxConcurrentRequests", "3")
            .await
            .unwrap();

        let err = service
            .set_value("dataSource.maxConcurrentRequests", "11")
            .await
            .unwrap_err();
        let validation = err.as_validation().unwrap();
        assert_eq!(validation.rule, ValidationRule::IntegerRange);

        assert_eq!(
            service
                .get_value("dataSource.maxConcurrentRequests")
                .await
                .unwrap(),
            "3"
        );
    }

    #[tokio::test]
    async fn test_invalid_value_names_its_key() {
        let invalid = |key: ConfigKey| match key {
            ConfigKey::DataSourceBaseUrl => "ftp://data.example.com",
            ConfigKey::DataSourceMaxConcurrentRequests => "0",
            ConfigKey::ProcessingStartDate => "2024-13-01",
            ConfigKey::ProcessingOutputDir => "",
            ConfigKey::ProcessingTempDir => "   ",
            ConfigKey::DatabasePath => "./data/spx.sqlite",
        };

        let service = service().await;
        for key in ConfigKey::ALL {
            let err = service
                .set_value(key.as_str(), invalid(key))
                .await
                .unwrap_err();
            let validation = err
                .as_validation()
                .unwrap_or_else(|| panic!("{key}: expected a validation error, got {err:?}"));
            assert_eq!(validation.field, key.as_str());
            assert_eq!(validation.value, invalid(key));
        }

        assert!(service.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_key_never_touches_store() {
        let service = ConfigService::new(CountingStore::default());

        let err = service.set_value("dataSource.apiKey", "x").await.unwrap_err();
        assert_eq!(err.as_validation().unwrap().rule, ValidationRule::UnknownKey);
        assert!(service.get_value("nope").await.is_err());
        assert!(service.unset_value("nope").await.is_err());

        assert_eq!(service.store().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_value_never_set_is_not_found() {
        let service = service().await;
        let err = service.get_value("processing.tempDir").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_invalid_persisted_value_fails_read() {
        let service = service().await;
        // Written behind the service's back
        service
            .store()
            .set("processing.startDate", "tomorrow")
            .await
            .unwrap();

        let err = service.get_full().await.unwrap_err();
        let validation = err.as_validation().unwrap();
        assert_eq!(validation.field, "processing.startDate");
        assert!(service.validate_full().await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_persisted_key_is_ignored() {
        let service = service().await;
        service.store().set("legacy.key", "whatever").await.unwrap();
        assert_eq!(service.get_full().await.unwrap(), defaults());
    }

    #[tokio::test]
    async fn test_reset_writes_all_defaults() {
        let service = service().await;
        service.set_value("processing.outputDir", "/srv/out").await.unwrap();

        let config = service.reset().await.unwrap();
        assert_eq!(config, defaults());

        let records = service.records().await.unwrap();
        assert_eq!(records.len(), ConfigKey::ALL.len());
        assert_eq!(service.get_full().await.unwrap(), defaults());
        assert_eq!(
            service.get_value("processing.outputDir").await.unwrap(),
            "./data/parquet"
        );
    }

    #[tokio::test]
    async fn test_unset_reverts_to_default() {
        let service = service().await;
        service.set_value("processing.tempDir", "/scratch").await.unwrap();
        assert_eq!(service.get_full().await.unwrap().processing.temp_dir, "/scratch");

        assert!(service.unset_value("processing.tempDir").await.unwrap());
        assert!(!service.unset_value("processing.tempDir").await.unwrap());
        assert_eq!(
            service.get_full().await.unwrap().processing.temp_dir,
            "./data/temp"
        );
    }

    #[tokio::test]
    async fn test_reset_through_fake_store_is_one_call() {
        let service = ConfigService::new(CountingStore::default());
        service.reset().await.unwrap();
        assert_eq!(service.store().calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.get_full().await.unwrap(), defaults());
    }
}
