//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use spx_config::{ConfigError, ConfigKey, ValidationError, ValidationRule};
use spx_db::DbError;
use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
    /// Machine-readable payload for `--json` output
    pub details: Option<serde_json::Value>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
            details: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions
            .extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    // === Common error constructors ===

    /// A value failed a validation rule
    pub fn invalid_value(err: &ValidationError) -> Self {
        if err.rule == ValidationRule::UnknownKey {
            return Self::new(format!("Unknown configuration key: {}", err.field))
                .with_context(err.reason.clone())
                .with_details(serde_json::json!(err))
                .with_suggestion("TRY: List valid keys and their defaults: spx config keys");
        }

        let base = Self::new(format!("Invalid value for {}: '{}'", err.field, err.value))
            .with_context(err.reason.clone())
            .with_details(serde_json::json!(err));

        match err.rule {
            ValidationRule::Missing => base.with_suggestion("TRY: Restore defaults: spx config reset"),
            ValidationRule::Directory => base.with_suggestions([
                "TRY: Create directories automatically: spx config validate --auto-create-dirs",
                "TRY: Check that the path is not an existing file",
            ]),
            ValidationRule::Connectivity => base.with_suggestions([
                "TRY: Check that the data service is running and reachable".to_string(),
                format!(
                    "TRY: Point to another server: spx config set {} <url>",
                    ConfigKey::DataSourceBaseUrl
                ),
                "TRY: Skip network checks by validating without --strict".to_string(),
            ]),
            ValidationRule::BusinessDay | ValidationRule::StartDateInFuture | ValidationRule::StartDateTooEarly => {
                base.with_suggestion(format!(
                    "TRY: Pick another date: spx config set {} YYYY-MM-DD",
                    ConfigKey::ProcessingStartDate
                ))
            }
            _ => base.with_suggestion(format!(
                "TRY: Set a new value: spx config set {} <value>",
                err.field
            )),
        }
    }

    /// The database file could not be opened
    pub fn database_unavailable(path: &Path, err: &DbError) -> Self {
        Self::new(format!("Cannot open database: {}", path.display()))
            .with_context(err.to_string())
            .with_suggestions([
                format!("TRY: Check permissions on the parent directory of {}", path.display()),
                "TRY: Point to another file: --database <path> or SPX_DATABASE=<path>".to_string(),
            ])
    }

    /// Force initialization attempted without the confirmation flag
    pub fn confirmation_required(tables: &[String], path: &Path) -> Self {
        Self::new("Force initialization requires confirmation")
            .with_context(format!(
                "This drops and recreates {} in {}, deleting all data",
                tables.join(", "),
                path.display()
            ))
            .with_details(serde_json::json!({ "tables": tables }))
            .with_suggestions([
                format!(
                    "TRY: Confirm the reset: spx database force-init --database {} --force-confirm",
                    path.display()
                ),
                "TRY: Create only missing tables: spx database init".to_string(),
            ])
    }

    /// Any other database failure
    pub fn database_error(err: &DbError, path: &Path) -> Self {
        match err {
            DbError::ConfirmationRequired { tables } => Self::confirmation_required(tables, path),
            DbError::NotFound { key } => Self::new(format!("Not found: {}", key)),
            other => Self::new("Database operation failed")
                .with_context(format!("{} ({})", other, path.display()))
                .with_suggestion("TRY: Inspect the database: spx database status"),
        }
    }

    pub fn from_config_error(err: &ConfigError, path: &Path) -> Self {
        match err {
            ConfigError::Validation(validation) => Self::invalid_value(validation),
            ConfigError::Store(db) => Self::database_error(db, path),
        }
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

/// JSON error object for `--json` mode.
pub fn json_error(err: &anyhow::Error) -> serde_json::Value {
    match err.downcast_ref::<HelpfulError>() {
        Some(helpful) => serde_json::json!({
            "status": "error",
            "error": {
                "message": helpful.message,
                "context": helpful.context,
                "suggestions": helpful.suggestions,
                "details": helpful.details,
            }
        }),
        None => serde_json::json!({
            "status": "error",
            "error": {
                "message": format!("{:#}", err),
            }
        }),
    }
}

pub fn print_json_error(err: &anyhow::Error) {
    let value = json_error(err);
    match serde_json::to_string_pretty(&value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}
