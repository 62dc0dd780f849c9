//! Error types for configuration validation and the configuration service.

use serde::Serialize;
use spx_db::DbError;
use std::fmt;
use thiserror::Error;

/// Which rule a value broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    /// Key is not one of the six configuration keys
    UnknownKey,
    /// Key absent from a candidate record set
    Missing,
    Url,
    IntegerRange,
    NonEmpty,
    Date,
    DatabaseExtension,
    /// Output and temp directories resolve to the same path
    DistinctDirectories,
    /// Database file lives directly in the temp directory
    DatabaseOutsideTemp,
    StartDateInFuture,
    StartDateTooEarly,
    BusinessDay,
    Directory,
    Connectivity,
}

impl ValidationRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationRule::UnknownKey => "unknown_key",
            ValidationRule::Missing => "missing",
            ValidationRule::Url => "url",
            ValidationRule::IntegerRange => "integer_range",
            ValidationRule::NonEmpty => "non_empty",
            ValidationRule::Date => "date",
            ValidationRule::DatabaseExtension => "database_extension",
            ValidationRule::DistinctDirectories => "distinct_directories",
            ValidationRule::DatabaseOutsideTemp => "database_outside_temp",
            ValidationRule::StartDateInFuture => "start_date_in_future",
            ValidationRule::StartDateTooEarly => "start_date_too_early",
            ValidationRule::BusinessDay => "business_day",
            ValidationRule::Directory => "directory",
            ValidationRule::Connectivity => "connectivity",
        }
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected value: the field it belongs to, the raw value and why.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("Invalid value for {field} = '{value}': {reason}")]
pub struct ValidationError {
    pub rule: ValidationRule,
    pub field: String,
    pub value: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(
        rule: ValidationRule,
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            rule,
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Re-attribute the error to `field` (used when a generic check runs on
    /// behalf of a specific key).
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }
}

/// Errors from the configuration service.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] DbError),
}

impl ConfigError {
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            ConfigError::Validation(err) => Some(err),
            ConfigError::Store(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::Store(err) if err.is_not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_field_value_and_reason() {
        let err = ValidationError::new(
            ValidationRule::IntegerRange,
            "dataSource.maxConcurrentRequests",
            "11",
            "must be between 1 and 10",
        );
        let msg = err.to_string();
        assert!(msg.contains("dataSource.maxConcurrentRequests"));
        assert!(msg.contains("'11'"));
        assert!(msg.contains("between 1 and 10"));
    }

    #[test]
    fn test_with_field() {
        let err = ValidationError::new(ValidationRule::Directory, "directory", "/x", "missing")
            .with_field("processing.outputDir");
        assert_eq!(err.field, "processing.outputDir");
        assert_eq!(err.rule, ValidationRule::Directory);
    }

    #[test]
    fn test_config_error_not_found() {
        let err = ConfigError::from(DbError::not_found("database.path"));
        assert!(err.is_not_found());
        assert!(err.as_validation().is_none());
    }
}
