//! Configuration keys, typed configuration and per-field validation.
//!
//! [`ConfigKey`] is the only place that knows how the six dotted keys map to
//! fields of [`Configuration`]. Everything here is pure and synchronous.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ValidationError, ValidationRule};

/// Date format used for `processing.startDate` on the wire and in storage.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub const MIN_CONCURRENT_REQUESTS: i64 = 1;
pub const MAX_CONCURRENT_REQUESTS: i64 = 10;

/// The six legal configuration keys, in field declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ConfigKey {
    #[serde(rename = "dataSource.baseUrl")]
    DataSourceBaseUrl,
    #[serde(rename = "dataSource.maxConcurrentRequests")]
    DataSourceMaxConcurrentRequests,
    #[serde(rename = "processing.startDate")]
    ProcessingStartDate,
    #[serde(rename = "processing.outputDir")]
    ProcessingOutputDir,
    #[serde(rename = "processing.tempDir")]
    ProcessingTempDir,
    #[serde(rename = "database.path")]
    DatabasePath,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 6] = [
        ConfigKey::DataSourceBaseUrl,
        ConfigKey::DataSourceMaxConcurrentRequests,
        ConfigKey::ProcessingStartDate,
        ConfigKey::ProcessingOutputDir,
        ConfigKey::ProcessingTempDir,
        ConfigKey::DatabasePath,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::DataSourceBaseUrl => "dataSource.baseUrl",
            ConfigKey::DataSourceMaxConcurrentRequests => "dataSource.maxConcurrentRequests",
            ConfigKey::ProcessingStartDate => "processing.startDate",
            ConfigKey::ProcessingOutputDir => "processing.outputDir",
            ConfigKey::ProcessingTempDir => "processing.tempDir",
            ConfigKey::DatabasePath => "database.path",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConfigKey::DataSourceBaseUrl => "HTTP(S) base URL of the market data service",
            ConfigKey::DataSourceMaxConcurrentRequests => "Parallel requests (1-10)",
            ConfigKey::ProcessingStartDate => "First trade date to acquire (YYYY-MM-DD)",
            ConfigKey::ProcessingOutputDir => "Directory for finished columnar files",
            ConfigKey::ProcessingTempDir => "Scratch directory for in-flight downloads",
            ConfigKey::DatabasePath => "SQLite database file (*.db)",
        }
    }

    fn unknown(raw: &str) -> ValidationError {
        let valid: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
        ValidationError::new(
            ValidationRule::UnknownKey,
            raw,
            raw,
            format!("unknown configuration key (valid keys: {})", valid.join(", ")),
        )
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Self::unknown(s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceConfig {
    pub base_url: String,
    pub max_concurrent_requests: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingConfig {
    pub start_date: NaiveDate,
    pub output_dir: String,
    pub temp_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub path: String,
}

/// Fully validated configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub data_source: DataSourceConfig,
    pub processing: ProcessingConfig,
    pub database: DatabaseConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        defaults()
    }
}

/// Default configuration. Built fresh on every call.
pub fn defaults() -> Configuration {
    Configuration {
        data_source: DataSourceConfig {
            base_url: "http://localhost:25510".to_string(),
            max_concurrent_requests: 4,
        },
        processing: ProcessingConfig {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            output_dir: "./data/parquet".to_string(),
            temp_dir: "./data/temp".to_string(),
        },
        database: DatabaseConfig {
            path: "./data/spx-pipeline.db".to_string(),
        },
    }
}

impl Configuration {
    /// Stored string form of one field.
    pub fn value_of(&self, key: ConfigKey) -> String {
        match key {
            ConfigKey::DataSourceBaseUrl => self.data_source.base_url.clone(),
            ConfigKey::DataSourceMaxConcurrentRequests => {
                self.data_source.max_concurrent_requests.to_string()
            }
            ConfigKey::ProcessingStartDate => {
                self.processing.start_date.format(DATE_FORMAT).to_string()
            }
            ConfigKey::ProcessingOutputDir => self.processing.output_dir.clone(),
            ConfigKey::ProcessingTempDir => self.processing.temp_dir.clone(),
            ConfigKey::DatabasePath => self.database.path.clone(),
        }
    }

    /// One `(key, value)` pair per field, in declaration order.
    pub fn to_records(&self) -> Vec<(ConfigKey, String)> {
        ConfigKey::ALL
            .iter()
            .map(|key| (*key, self.value_of(*key)))
            .collect()
    }

    pub fn from_records(records: &BTreeMap<ConfigKey, String>) -> Result<Self, ValidationError> {
        validate_all(records)
    }
}

/// A single validated field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Url(String),
    Integer(u32),
    Date(NaiveDate),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Url(url) => f.write_str(url),
            FieldValue::Integer(n) => write!(f, "{}", n),
            FieldValue::Date(date) => write!(f, "{}", date.format(DATE_FORMAT)),
            FieldValue::Text(text) => f.write_str(text),
        }
    }
}

/// Validate one raw value against the rule of its field.
pub fn validate_field(key: ConfigKey, raw: &str) -> Result<FieldValue, ValidationError> {
    match key {
        ConfigKey::DataSourceBaseUrl => parse_http_url(key, raw).map(FieldValue::Url),
        ConfigKey::DataSourceMaxConcurrentRequests => {
            parse_request_limit(key, raw).map(FieldValue::Integer)
        }
        ConfigKey::ProcessingStartDate => parse_date(key, raw).map(FieldValue::Date),
        ConfigKey::ProcessingOutputDir | ConfigKey::ProcessingTempDir => {
            parse_non_empty(key, raw).map(FieldValue::Text)
        }
        ConfigKey::DatabasePath => parse_database_path(key, raw).map(FieldValue::Text),
    }
}

/// Build a [`Configuration`] from a complete record set.
///
/// Returns the first failure in field declaration order. A missing key is a
/// failure of its own.
pub fn validate_all(records: &BTreeMap<ConfigKey, String>) -> Result<Configuration, ValidationError> {
    let raw = |key: ConfigKey| {
        records.get(&key).map(String::as_str).ok_or_else(|| {
            ValidationError::new(ValidationRule::Missing, key.as_str(), "", "required value is missing")
        })
    };

    let base_url = parse_http_url(
        ConfigKey::DataSourceBaseUrl,
        raw(ConfigKey::DataSourceBaseUrl)?,
    )?;
    let max_concurrent_requests = parse_request_limit(
        ConfigKey::DataSourceMaxConcurrentRequests,
        raw(ConfigKey::DataSourceMaxConcurrentRequests)?,
    )?;
    let start_date = parse_date(
        ConfigKey::ProcessingStartDate,
        raw(ConfigKey::ProcessingStartDate)?,
    )?;
    let output_dir = parse_non_empty(
        ConfigKey::ProcessingOutputDir,
        raw(ConfigKey::ProcessingOutputDir)?,
    )?;
    let temp_dir = parse_non_empty(
        ConfigKey::ProcessingTempDir,
        raw(ConfigKey::ProcessingTempDir)?,
    )?;
    let path = parse_database_path(ConfigKey::DatabasePath, raw(ConfigKey::DatabasePath)?)?;

    Ok(Configuration {
        data_source: DataSourceConfig {
            base_url,
            max_concurrent_requests,
        },
        processing: ProcessingConfig {
            start_date,
            output_dir,
            temp_dir,
        },
        database: DatabaseConfig { path },
    })
}

fn reject(rule: ValidationRule, key: ConfigKey, raw: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::new(rule, key.as_str(), raw, reason)
}

fn parse_http_url(key: ConfigKey, raw: &str) -> Result<String, ValidationError> {
    let url = url::Url::parse(raw)
        .map_err(|e| reject(ValidationRule::Url, key, raw, format!("not a valid URL: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(raw.to_string()),
        other => Err(reject(
            ValidationRule::Url,
            key,
            raw,
            format!("scheme '{}' is not supported, use http or https", other),
        )),
    }
}

fn parse_request_limit(key: ConfigKey, raw: &str) -> Result<u32, ValidationError> {
    let n: i64 = raw
        .trim()
        .parse()
        .map_err(|_| reject(ValidationRule::IntegerRange, key, raw, "must be an integer"))?;
    if !(MIN_CONCURRENT_REQUESTS..=MAX_CONCURRENT_REQUESTS).contains(&n) {
        return Err(reject(
            ValidationRule::IntegerRange,
            key,
            raw,
            format!(
                "must be between {} and {}",
                MIN_CONCURRENT_REQUESTS, MAX_CONCURRENT_REQUESTS
            ),
        ));
    }
    Ok(n as u32)
}

pub(crate) fn parse_date(key: ConfigKey, raw: &str) -> Result<NaiveDate, ValidationError> {
    // chrono accepts single-digit months and days; stored dates are always padded
    if raw.len() != 10 {
        return Err(reject(ValidationRule::Date, key, raw, "expected a date in YYYY-MM-DD format"));
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        reject(
            ValidationRule::Date,
            key,
            raw,
            format!("expected a date in YYYY-MM-DD format ({})", e),
        )
    })
}

fn parse_non_empty(key: ConfigKey, raw: &str) -> Result<String, ValidationError> {
    if raw.trim().is_empty() {
        return Err(reject(ValidationRule::NonEmpty, key, raw, "must not be empty"));
    }
    Ok(raw.to_string())
}

fn parse_database_path(key: ConfigKey, raw: &str) -> Result<String, ValidationError> {
    let path = parse_non_empty(key, raw)?;
    if !path.ends_with(".db") {
        return Err(reject(
            ValidationRule::DatabaseExtension,
            key,
            raw,
            "database file must end in .db",
        ));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_records() -> BTreeMap<ConfigKey, String> {
        defaults().to_records().into_iter().collect()
    }

    #[test]
    fn test_key_parse_and_display() {
        for key in ConfigKey::ALL {
            assert_eq!(key.as_str().parse::<ConfigKey>().unwrap(), key);
            assert_eq!(key.to_string(), key.as_str());
        }
    }

    #[test]
    fn test_unknown_key_names_the_key() {
        let err = "dataSource.timeout".parse::<ConfigKey>().unwrap_err();
        assert_eq!(err.rule, ValidationRule::UnknownKey);
        assert_eq!(err.field, "dataSource.timeout");
        assert!(err.reason.contains("database.path"));
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = validate_all(&default_records()).unwrap();
        assert_eq!(config, defaults());
        assert_eq!(config.data_source.base_url, "http://localhost:25510");
        assert_eq!(config.data_source.max_concurrent_requests, 4);
        assert_eq!(config.processing.start_date.to_string(), "2024-01-01");
    }

    #[test]
    fn test_defaults_are_fresh_values() {
        let mut first = defaults();
        first.processing.output_dir = "/elsewhere".to_string();
        assert_eq!(defaults().processing.output_dir, "./data/parquet");
    }

    #[test]
    fn test_url_field() {
        let key = ConfigKey::DataSourceBaseUrl;
        assert_eq!(
            validate_field(key, "https://api.example.com:8443/v2").unwrap(),
            FieldValue::Url("https://api.example.com:8443/v2".to_string())
        );
        assert_eq!(validate_field(key, "not a url").unwrap_err().rule, ValidationRule::Url);
        assert_eq!(
            validate_field(key, "ftp://example.com").unwrap_err().rule,
            ValidationRule::Url
        );
    }

    #[test]
    fn test_request_limit_bounds() {
        let key = ConfigKey::DataSourceMaxConcurrentRequests;
        assert_eq!(validate_field(key, "1").unwrap(), FieldValue::Integer(1));
        assert_eq!(validate_field(key, "10").unwrap(), FieldValue::Integer(10));
        for bad in ["0", "11", "-3", "4.5", "four", ""] {
            let err = validate_field(key, bad).unwrap_err();
            assert_eq!(err.rule, ValidationRule::IntegerRange, "value {:?}", bad);
            assert_eq!(err.field, key.as_str());
            assert_eq!(err.value, bad);
        }
    }

    #[test]
    fn test_date_field() {
        let key = ConfigKey::ProcessingStartDate;
        assert_eq!(
            validate_field(key, "2024-03-15").unwrap().to_string(),
            "2024-03-15"
        );
        for bad in ["2024-13-01", "2024-02-30", "2024-3-5", "yesterday", "15/03/2024"] {
            assert_eq!(validate_field(key, bad).unwrap_err().rule, ValidationRule::Date);
        }
    }

    #[test]
    fn test_directory_fields_non_empty() {
        for key in [ConfigKey::ProcessingOutputDir, ConfigKey::ProcessingTempDir] {
            assert!(validate_field(key, "./out").is_ok());
            assert_eq!(validate_field(key, "").unwrap_err().rule, ValidationRule::NonEmpty);
            assert_eq!(validate_field(key, "   ").unwrap_err().rule, ValidationRule::NonEmpty);
        }
    }

    #[test]
    fn test_database_path_field() {
        let key = ConfigKey::DatabasePath;
        assert!(validate_field(key, "./data/x.db").is_ok());
        assert_eq!(
            validate_field(key, "./data/x.sqlite").unwrap_err().rule,
            ValidationRule::DatabaseExtension
        );
        assert_eq!(validate_field(key, "").unwrap_err().rule, ValidationRule::NonEmpty);
    }

    #[test]
    fn test_validate_all_reports_first_failure_in_order() {
        let mut records = default_records();
        records.insert(ConfigKey::DatabasePath, "bad.txt".to_string());
        records.insert(ConfigKey::DataSourceMaxConcurrentRequests, "99".to_string());

        let err = validate_all(&records).unwrap_err();
        assert_eq!(err.field, "dataSource.maxConcurrentRequests");
    }

    #[test]
    fn test_validate_all_missing_key() {
        let mut records = default_records();
        records.remove(&ConfigKey::ProcessingTempDir);

        let err = validate_all(&records).unwrap_err();
        assert_eq!(err.rule, ValidationRule::Missing);
        assert_eq!(err.field, "processing.tempDir");
    }

    #[test]
    fn test_records_roundtrip() {
        let mut config = defaults();
        config.data_source.max_concurrent_requests = 7;
        config.processing.start_date = NaiveDate::from_ymd_opt(2023, 6, 30).unwrap();

        let records: BTreeMap<_, _> = config.to_records().into_iter().collect();
        assert_eq!(Configuration::from_records(&records).unwrap(), config);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(defaults()).unwrap();
        assert_eq!(json["dataSource"]["maxConcurrentRequests"], 4);
        assert_eq!(json["processing"]["startDate"], "2024-01-01");
        assert_eq!(json["database"]["path"], "./data/spx-pipeline.db");
    }
}
