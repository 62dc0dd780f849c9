//! Database command - table status and initialization
//!
//! `init` never destroys data. `force-init` drops every application table and
//! refuses to run without `--force-confirm`.

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_number, print_json, print_table_colored};
use crate::cli::{open_database, open_existing_database, runtime, DatabaseArg};
use clap::Subcommand;
use comfy_table::Color;
use spx_db::{Database, StatusReport};
use std::path::Path;
use tracing::info;

/// Subcommands for database management
#[derive(Subcommand, Debug, Clone)]
pub enum DatabaseAction {
    /// Show which tables exist and how many rows they hold
    Status {
        #[command(flatten)]
        database: DatabaseArg,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create missing tables; does nothing if any table holds data
    Init {
        #[command(flatten)]
        database: DatabaseArg,
    },
    /// Drop and recreate every table (DELETES ALL DATA)
    #[command(name = "force-init")]
    ForceInit {
        #[command(flatten)]
        database: DatabaseArg,
        /// Confirm that all data may be deleted
        #[arg(long)]
        force_confirm: bool,
    },
}

impl DatabaseAction {
    pub fn wants_json(&self) -> bool {
        match self {
            DatabaseAction::Status { json, .. } => *json,
            _ => false,
        }
    }
}

pub fn run(action: DatabaseAction) -> anyhow::Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        match action {
            DatabaseAction::Status { database, json } => run_status(&database.path, json).await,
            DatabaseAction::Init { database } => {
                let db = open_database(&database.path).await?;
                let result = run_init(&db, &database.path).await;
                db.close().await;
                result
            }
            DatabaseAction::ForceInit {
                database,
                force_confirm,
            } => run_force_init(&database.path, force_confirm).await,
        }
    })
}

async fn run_status(path: &Path, json: bool) -> anyhow::Result<()> {
    let report = match open_existing_database(path).await? {
        Some(db) => {
            let result = db
                .table_manager()
                .status()
                .await
                .map_err(|e| anyhow::Error::from(HelpfulError::database_error(&e, path)));
            db.close().await;
            result?
        }
        None => StatusReport::absent(),
    };

    if json {
        return print_json(&serde_json::json!({
            "database": path.display().to_string(),
            "status": report,
        }));
    }

    print_status(path, &report);
    Ok(())
}

fn print_status(path: &Path, report: &StatusReport) {
    println!("Database: {}", path.display());
    print_table_colored(
        &["TABLE", "EXISTS", "ROWS"],
        report
            .tables
            .iter()
            .map(|t| {
                let (exists, color) = if t.exists {
                    ("yes", Color::Green)
                } else {
                    ("no", Color::Red)
                };
                vec![
                    (t.name.clone(), None),
                    (exists.to_string(), Some(color)),
                    (format_number(t.row_count), None),
                ]
            })
            .collect(),
    );
    println!(
        "{} of {} tables present, {} rows total",
        report.existing,
        report.tables.len(),
        format_number(report.total_rows)
    );
}

async fn run_init(db: &Database, path: &Path) -> anyhow::Result<()> {
    let outcome = db
        .table_manager()
        .safe_init()
        .await
        .map_err(|e| anyhow::Error::from(HelpfulError::database_error(&e, path)))?;

    if outcome.was_skipped() {
        println!(
            "Tables contain data, skipping initialization: {}",
            outcome.skipped.join(", ")
        );
        println!("  TRY: Reset everything: spx database force-init --force-confirm");
    } else if outcome.created.is_empty() {
        println!("All tables already exist ({})", path.display());
    } else {
        println!("Created tables: {}", outcome.created.join(", "));
    }
    Ok(())
}

async fn run_force_init(path: &Path, confirmed: bool) -> anyhow::Result<()> {
    // Checked before opening so an unconfirmed run never creates the file
    if !confirmed {
        let tables = spx_db::application_tables()
            .iter()
            .map(|t| t.name().to_string())
            .collect::<Vec<_>>();
        return Err(HelpfulError::confirmation_required(&tables, path).into());
    }

    let db = open_database(path).await?;
    let result = db
        .table_manager()
        .force_init(true)
        .await
        .map_err(|e| anyhow::Error::from(HelpfulError::database_error(&e, path)));
    db.close().await;
    let outcome = result?;

    info!(path = %path.display(), "Database force-initialized");
    if !outcome.dropped.is_empty() {
        println!("Dropped tables: {}", outcome.dropped.join(", "));
    }
    println!("Created tables: {}", outcome.created.join(", "));
    Ok(())
}
