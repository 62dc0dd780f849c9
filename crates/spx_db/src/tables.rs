//! Table lifecycle: status, safe initialization, forced re-initialization.
//!
//! Safe init never touches anything once any known table holds rows; force
//! init drops and recreates every known table and refuses to run without an
//! explicit confirmation flag.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};
use tracing::{info, warn};

use crate::error::{DbError, Result};
use crate::schema::{application_tables, TableDef};
use crate::sql_guard::quote_identifier;

/// Point-in-time snapshot of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub exists: bool,
    pub row_count: u64,
}

/// Aggregate view used by `database status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub tables: Vec<TableInfo>,
    pub existing: usize,
    pub missing: usize,
    pub total_rows: u64,
}

impl StatusReport {
    /// Report for a database file that does not exist: every application
    /// table is missing.
    pub fn absent() -> Self {
        Self::from_tables(
            application_tables()
                .iter()
                .map(|t| TableInfo {
                    name: t.name().to_string(),
                    exists: false,
                    row_count: 0,
                })
                .collect(),
        )
    }

    fn from_tables(tables: Vec<TableInfo>) -> Self {
        let existing = tables.iter().filter(|t| t.exists).count();
        let total_rows = tables.iter().map(|t| t.row_count).sum();
        Self {
            missing: tables.len() - existing,
            existing,
            total_rows,
            tables,
        }
    }
}

/// Result of a safe initialization.
///
/// When `skipped` is non-empty, `created` is empty: populated tables block the
/// whole operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SafeInitOutcome {
    pub created: Vec<String>,
    pub skipped: Vec<String>,
}

impl SafeInitOutcome {
    pub fn was_skipped(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Result of a forced re-initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForceInitOutcome {
    pub dropped: Vec<String>,
    pub created: Vec<String>,
}

/// Owns the set of application tables and their lifecycle.
pub struct TableManager {
    pool: SqlitePool,
    tables: Vec<TableDef>,
}

impl TableManager {
    /// Manager over the application schema.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_tables(pool, application_tables())
    }

    pub fn with_tables(pool: SqlitePool, tables: Vec<TableDef>) -> Self {
        Self { pool, tables }
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name().to_string()).collect()
    }

    /// Existence and row count of every known table. No side effects.
    pub async fn check(&self) -> Result<Vec<TableInfo>> {
        let mut infos = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            let exists = self.table_exists(table.name()).await?;
            let row_count = if exists {
                self.row_count(table.name()).await?
            } else {
                0
            };
            infos.push(TableInfo {
                name: table.name().to_string(),
                exists,
                row_count,
            });
        }
        Ok(infos)
    }

    pub async fn status(&self) -> Result<StatusReport> {
        Ok(StatusReport::from_tables(self.check().await?))
    }

    /// Create missing tables unless any existing table holds data.
    pub async fn safe_init(&self) -> Result<SafeInitOutcome> {
        let infos = self.check().await?;

        let populated: Vec<String> = infos
            .iter()
            .filter(|t| t.exists && t.row_count > 0)
            .map(|t| t.name.clone())
            .collect();
        if !populated.is_empty() {
            warn!(
                tables = %populated.join(", "),
                "Tables contain data, skipping initialization"
            );
            return Ok(SafeInitOutcome {
                created: Vec::new(),
                skipped: populated,
            });
        }

        let missing: Vec<&TableDef> = self
            .tables
            .iter()
            .zip(&infos)
            .filter(|(_, info)| !info.exists)
            .map(|(def, _)| def)
            .collect();
        if missing.is_empty() {
            info!("All tables already exist");
            return Ok(SafeInitOutcome::default());
        }

        let mut tx = self.begin().await?;
        for def in &missing {
            create_table(&mut tx, def).await?;
        }
        commit(tx).await?;

        let created: Vec<String> = missing.iter().map(|d| d.name().to_string()).collect();
        info!(tables = %created.join(", "), "Created tables");
        Ok(SafeInitOutcome {
            created,
            skipped: Vec::new(),
        })
    }

    /// Drop every existing known table and recreate all of them.
    ///
    /// Without `confirmed`, fails with [`DbError::ConfirmationRequired`] before
    /// reading or writing anything.
    pub async fn force_init(&self, confirmed: bool) -> Result<ForceInitOutcome> {
        if !confirmed {
            return Err(DbError::ConfirmationRequired {
                tables: self.table_names(),
            });
        }

        let infos = self.check().await?;
        let dropped: Vec<String> = infos
            .iter()
            .filter(|t| t.exists)
            .map(|t| t.name.clone())
            .collect();

        let mut tx = self.begin().await?;
        for name in dropped.iter().rev() {
            let sql = format!("DROP TABLE IF EXISTS {}", quote_identifier(name));
            sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .map_err(DbError::persistence(format!("drop table {}", name)))?;
        }
        for def in &self.tables {
            create_table(&mut tx, def).await?;
        }
        commit(tx).await?;

        let created = self.table_names();
        warn!(
            dropped = %dropped.join(", "),
            created = %created.join(", "),
            "Force-initialized database"
        );
        Ok(ForceInitOutcome { dropped, created })
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::persistence(format!("catalog lookup {}", name)))?;
        Ok(row.is_some())
    }

    async fn row_count(&self, name: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(name));
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::persistence(format!("count {}", name)))?;
        Ok(count.max(0) as u64)
    }

    async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(DbError::persistence("begin transaction"))
    }
}

async fn create_table(tx: &mut Transaction<'static, Sqlite>, def: &TableDef) -> Result<()> {
    for stmt in def.statements() {
        sqlx::query(stmt)
            .execute(&mut **tx)
            .await
            .map_err(DbError::persistence(format!("create table {}", def.name())))?;
    }
    Ok(())
}

async fn commit(tx: Transaction<'static, Sqlite>) -> Result<()> {
    tx.commit()
        .await
        .map_err(DbError::persistence("commit transaction"))
}
