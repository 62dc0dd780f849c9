//! SPX pipeline command-line tool
//!
//! Manages the pipeline configuration and the lifecycle of its SQLite tables.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(
    name = "spx",
    version,
    about = "Configuration and database management for the SPX data pipeline"
)]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read, write and validate configuration
    Config {
        #[command(subcommand)]
        action: cli::config::ConfigAction,
    },
    /// Inspect and initialize database tables
    Database {
        #[command(subcommand)]
        action: cli::database::DatabaseAction,
    },
}

fn command_wants_json(command: &Commands) -> bool {
    match command {
        Commands::Config { action } => action.wants_json(),
        Commands::Database { action } => action.wants_json(),
    }
}

fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Config { action } => cli::config::run(action),
        Commands::Database { action } => cli::database::run(action),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = command_wants_json(&cli.command);

    if let Err(err) = spx_logging::init_logging(spx_logging::LogConfig {
        app_name: "spx",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else {
                eprintln!("{:?}", err);
            }
            ExitCode::from(1)
        }
    }
}
