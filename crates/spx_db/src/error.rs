//! Error types for the database layer.

use std::path::PathBuf;
use thiserror::Error;

use crate::sql_guard::SqlGuardError;

/// Database operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// No row exists for the requested key
    #[error("Not found: no record for key '{key}'")]
    NotFound { key: String },

    /// The SQL engine rejected a statement
    #[error("Database error during {operation}: {source}")]
    Persistence {
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    /// The database file could not be opened
    #[error("Cannot open database at {}: {source}", .path.display())]
    Connection {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    /// Destructive initialization was requested without confirmation
    #[error(
        "Force initialization requires explicit confirmation; it would drop and recreate: {}",
        .tables.join(", ")
    )]
    ConfirmationRequired { tables: Vec<String> },

    /// A table name failed the identifier guard
    #[error("Invalid table name: {0}")]
    InvalidIdentifier(#[from] SqlGuardError),

    /// IO error (preparing the database directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Create a not found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Build a mapper that tags a sqlx failure with the attempted operation.
    pub fn persistence(operation: impl Into<String>) -> impl FnOnce(sqlx::Error) -> Self {
        let operation = operation.into();
        move |source| Self::Persistence { operation, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
