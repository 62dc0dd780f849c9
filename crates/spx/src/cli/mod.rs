//! CLI commands for the SPX pipeline.
//!
//! Each command opens the database for its own duration and closes it
//! before returning.

pub mod config;
pub mod database;
pub mod error;
pub mod output;

use spx_db::Database;
use std::path::{Path, PathBuf};

pub use error::HelpfulError;

pub const DEFAULT_DATABASE_PATH: &str = "./data/spx-pipeline.db";

/// `--database` flag shared by every command that touches the database.
#[derive(clap::Args, Debug, Clone)]
pub struct DatabaseArg {
    /// Path to the SQLite database file
    #[arg(long = "database", env = "SPX_DATABASE", default_value = DEFAULT_DATABASE_PATH)]
    pub path: PathBuf,
}

/// Open the database, translating failures into a helpful error.
pub(crate) async fn open_database(path: &Path) -> anyhow::Result<Database> {
    Database::open(path)
        .await
        .map_err(|err| HelpfulError::database_unavailable(path, &err).into())
}

/// Open the database only if the file exists. Creates nothing on disk.
pub(crate) async fn open_existing_database(path: &Path) -> anyhow::Result<Option<Database>> {
    Database::open_existing(path)
        .await
        .map_err(|err| HelpfulError::database_unavailable(path, &err).into())
}

/// Build the per-command runtime.
pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
