//! SQL identifier guard.
//!
//! Table names are interpolated into DDL and queries (SQLite cannot bind
//! identifiers), so every name passes through here first.

use std::error::Error;
use std::fmt;

const MAX_IDENTIFIER_LEN: usize = 64;
const RESERVED_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TABLE", "INDEX",
    "WHERE", "FROM", "ATTACH", "DETACH", "PRAGMA",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlGuardError {
    message: String,
}

impl SqlGuardError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for SqlGuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for SqlGuardError {}

/// Validate that `name` is a plain SQL identifier safe to splice into a statement.
pub fn validate_identifier(name: &str) -> Result<(), SqlGuardError> {
    if name.is_empty() {
        return Err(SqlGuardError::new("Identifier is empty"));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(SqlGuardError::new(format!(
            "Identifier '{}' exceeds {} characters",
            name, MAX_IDENTIFIER_LEN
        )));
    }

    let mut chars = name.chars();
    let first = chars.next().unwrap_or_default();
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(SqlGuardError::new(format!(
            "Identifier '{}' must start with a letter or underscore",
            name
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
    {
        return Err(SqlGuardError::new(format!(
            "Identifier '{}' contains forbidden character '{}'",
            name, bad
        )));
    }

    if name.to_ascii_lowercase().starts_with("sqlite_") {
        return Err(SqlGuardError::new(format!(
            "Identifier '{}' uses the reserved sqlite_ prefix",
            name
        )));
    }
    let upper = name.to_ascii_uppercase();
    if RESERVED_KEYWORDS.contains(&upper.as_str()) {
        return Err(SqlGuardError::new(format!(
            "Identifier '{}' is a reserved keyword",
            name
        )));
    }

    Ok(())
}

/// Double-quote an identifier that already passed [`validate_identifier`].
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name)
}
