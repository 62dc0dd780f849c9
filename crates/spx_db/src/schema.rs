//! Application table definitions.
//!
//! All CREATE TABLE statements for the tables the lifecycle manager owns live
//! here - single source of truth. Collaborators write to `processing_log` and
//! `error_log`; this crate only knows their names and DDL.

use crate::error::Result;
use crate::kv::{create_table_sql, CONFIGURATION_TABLE};
use crate::sql_guard::validate_identifier;

pub const PROCESSING_LOG_TABLE: &str = "processing_log";
pub const ERROR_LOG_TABLE: &str = "error_log";

/// A table known to the lifecycle manager: its name and the idempotent
/// statements that create it (table first, then indexes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    name: String,
    statements: Vec<String>,
}

impl TableDef {
    /// Define a table. The name must pass the identifier guard.
    pub fn new(name: &str, statements: Vec<String>) -> Result<Self> {
        validate_identifier(name)?;
        Ok(Self::fixed(name, statements))
    }

    fn fixed(name: &str, statements: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            statements,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

/// The application schema, in creation order.
pub fn application_tables() -> Vec<TableDef> {
    vec![
        TableDef::fixed(CONFIGURATION_TABLE, vec![create_table_sql(CONFIGURATION_TABLE)]),
        TableDef::fixed(
            PROCESSING_LOG_TABLE,
            vec![
                r#"CREATE TABLE IF NOT EXISTS processing_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    trade_date TEXT NOT NULL UNIQUE,
                    status TEXT NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
                    records_count INTEGER,
                    file_path TEXT,
                    checksum TEXT,
                    started_at DATETIME,
                    completed_at DATETIME,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
                )"#
                .to_string(),
                "CREATE INDEX IF NOT EXISTS idx_processing_log_status ON processing_log(status)"
                    .to_string(),
            ],
        ),
        TableDef::fixed(
            ERROR_LOG_TABLE,
            vec![
                r#"CREATE TABLE IF NOT EXISTS error_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    trade_date TEXT,
                    error_type TEXT NOT NULL,
                    message TEXT NOT NULL,
                    details TEXT,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
                )"#
                .to_string(),
                "CREATE INDEX IF NOT EXISTS idx_error_log_trade_date ON error_log(trade_date)"
                    .to_string(),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_tables_order() {
        let names: Vec<String> = application_tables()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names, vec!["configuration", "processing_log", "error_log"]);
    }

    #[test]
    fn test_every_statement_is_idempotent() {
        for table in application_tables() {
            assert!(!table.statements().is_empty());
            for stmt in table.statements() {
                assert!(stmt.contains("IF NOT EXISTS"), "{}: {}", table.name(), stmt);
            }
        }
    }

    #[test]
    fn test_table_def_validates_name() {
        assert!(TableDef::new("bad name", vec![]).is_err());
        assert!(TableDef::new("gap_report", vec![]).is_ok());
    }
}
