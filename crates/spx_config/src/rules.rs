//! Cross-field and environment-dependent validation.
//!
//! These rules need more than a single value: the whole configuration, the
//! current date, the filesystem or the network. Side effects go through the
//! [`DirectoryCreator`] and [`ConnectivityProbe`] capabilities so tests can
//! substitute them.

use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDate, Weekday};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ValidationError, ValidationRule};
use crate::schema::{parse_date, ConfigKey, Configuration, DATE_FORMAT};

/// Earliest acceptable `processing.startDate`.
pub fn earliest_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default()
}

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Creates directories on behalf of validation.
pub trait DirectoryCreator: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// Real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsDirectoryCreator;

impl DirectoryCreator for FsDirectoryCreator {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }
}

/// Checks that a data source URL answers.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// `Err` carries a human-readable reason.
    async fn probe(&self, url: &str) -> Result<(), String>;
}

/// HEAD request with a timeout; any 2xx/3xx response counts as reachable.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn probe(&self, url: &str) -> Result<(), String> {
        let response = self
            .client
            .head(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("no response within {}s", self.timeout.as_secs())
                } else {
                    format!("request failed: {}", e)
                }
            })?;

        let status = response.status();
        if status.is_success() || status.is_redirection() {
            Ok(())
        } else {
            Err(format!("server answered with HTTP {}", status))
        }
    }
}

/// Which optional checks [`ConfigValidator::validate_comprehensive`] runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    pub check_connectivity: bool,
    pub auto_create_directories: bool,
    pub validate_business_days: bool,
}

impl ValidationOptions {
    /// Connectivity and business-day checks.
    pub fn strict() -> Self {
        Self {
            check_connectivity: true,
            validate_business_days: true,
            ..Self::default()
        }
    }
}

/// True for Monday through Friday. Holidays are not considered.
pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Resolve `path` against `base` and collapse `.`/`..` without touching the
/// filesystem.
pub fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let joined = base.join(path);
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Validator for rules that span fields or need the outside world.
pub struct ConfigValidator {
    today: NaiveDate,
    base_dir: PathBuf,
    directories: Box<dyn DirectoryCreator>,
    probe: Box<dyn ConnectivityProbe>,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    /// Local date, current working directory, real filesystem and HTTP.
    pub fn new() -> Self {
        Self {
            today: Local::now().date_naive(),
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            directories: Box::new(FsDirectoryCreator),
            probe: Box::new(HttpProbe::default()),
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn with_directory_creator(mut self, creator: impl DirectoryCreator + 'static) -> Self {
        self.directories = Box::new(creator);
        self
    }

    pub fn with_probe(mut self, probe: impl ConnectivityProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        resolve_path(&self.base_dir, path)
    }

    /// Rules that involve more than one field, or the current date.
    pub fn validate_cross_field_rules(
        &self,
        config: Configuration,
    ) -> Result<Configuration, ValidationError> {
        let output_dir = self.resolve(&config.processing.output_dir);
        let temp_dir = self.resolve(&config.processing.temp_dir);
        if output_dir == temp_dir {
            return Err(ValidationError::new(
                ValidationRule::DistinctDirectories,
                ConfigKey::ProcessingTempDir.as_str(),
                &config.processing.temp_dir,
                format!(
                    "output and temp directories both resolve to {}",
                    output_dir.display()
                ),
            ));
        }

        let db_path = self.resolve(&config.database.path);
        if db_path.parent() == Some(temp_dir.as_path()) {
            return Err(ValidationError::new(
                ValidationRule::DatabaseOutsideTemp,
                ConfigKey::DatabasePath.as_str(),
                &config.database.path,
                "database file must not live in the temp directory",
            ));
        }

        let start = config.processing.start_date;
        let start_raw = start.format(DATE_FORMAT).to_string();
        if start > self.today {
            return Err(ValidationError::new(
                ValidationRule::StartDateInFuture,
                ConfigKey::ProcessingStartDate.as_str(),
                start_raw,
                format!("start date is after today ({})", self.today.format(DATE_FORMAT)),
            ));
        }
        let earliest = earliest_start_date();
        if start < earliest {
            return Err(ValidationError::new(
                ValidationRule::StartDateTooEarly,
                ConfigKey::ProcessingStartDate.as_str(),
                start_raw,
                format!("start date is before {}", earliest.format(DATE_FORMAT)),
            ));
        }

        Ok(config)
    }

    /// Parse `date` and reject weekends.
    pub fn validate_business_day(&self, date: &str) -> Result<NaiveDate, ValidationError> {
        let field = ConfigKey::ProcessingStartDate;
        let parsed = parse_date(field, date)?;
        if !is_business_day(parsed) {
            return Err(ValidationError::new(
                ValidationRule::BusinessDay,
                field.as_str(),
                date,
                format!("{} is a {}, not a business day", date, parsed.weekday()),
            ));
        }
        Ok(parsed)
    }

    /// Check that `path` is (or can become) a directory. Returns the resolved path.
    pub fn validate_directory(
        &self,
        path: &str,
        auto_create: bool,
    ) -> Result<PathBuf, ValidationError> {
        let resolved = self.resolve(path);
        let reject = |reason: String| {
            ValidationError::new(ValidationRule::Directory, "directory", path, reason)
        };

        if resolved.exists() {
            if !resolved.is_dir() {
                return Err(reject(format!(
                    "{} exists but is not a directory",
                    resolved.display()
                )));
            }
            return Ok(resolved);
        }

        if !auto_create {
            return Err(reject(format!("{} does not exist", resolved.display())));
        }

        self.directories
            .create_dir_all(&resolved)
            .map_err(|e| reject(format!("cannot create {}: {}", resolved.display(), e)))?;
        info!(path = %resolved.display(), "Created directory");
        Ok(resolved)
    }

    /// Format check, then (when `check` is set) a reachability probe.
    /// Returns the validated URL.
    pub async fn validate_url_connectivity(
        &self,
        url: &str,
        check: bool,
    ) -> Result<String, ValidationError> {
        let field = ConfigKey::DataSourceBaseUrl;
        crate::schema::validate_field(field, url)?;
        if !check {
            return Ok(url.to_string());
        }

        debug!(url, "Probing data source");
        self.probe.probe(url).await.map_err(|reason| {
            ValidationError::new(
                ValidationRule::Connectivity,
                field.as_str(),
                url,
                format!("data source unreachable: {}", reason),
            )
        })?;
        Ok(url.to_string())
    }

    /// Run the enabled environment checks, then the cross-field rules.
    pub async fn validate_comprehensive(
        &self,
        config: Configuration,
        options: &ValidationOptions,
    ) -> Result<Configuration, ValidationError> {
        self.validate_url_connectivity(&config.data_source.base_url, options.check_connectivity)
            .await?;

        if options.auto_create_directories {
            self.validate_directory(&config.processing.output_dir, true)
                .map_err(|e| e.with_field(ConfigKey::ProcessingOutputDir.as_str()))?;
            self.validate_directory(&config.processing.temp_dir, true)
                .map_err(|e| e.with_field(ConfigKey::ProcessingTempDir.as_str()))?;

            let db_path = self.resolve(&config.database.path);
            if let Some(parent) = db_path.parent() {
                self.validate_directory(&parent.to_string_lossy(), true)
                    .map_err(|e| e.with_field(ConfigKey::DatabasePath.as_str()))?;
            }
        }

        if options.validate_business_days {
            let date = config.processing.start_date.format(DATE_FORMAT).to_string();
            self.validate_business_day(&date)?;
        }

        self.validate_cross_field_rules(config)
    }
}
