//! Config command - read, write and validate pipeline configuration
//!
//! Values are stored as raw strings in the `configuration` table and
//! validated on every write and every full read.

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_timestamp, print_json, print_table, print_table_colored};
use crate::cli::{open_database, open_existing_database, runtime, DatabaseArg};
use clap::Subcommand;
use comfy_table::Color;
use serde::Serialize;
use spx_config::{
    defaults, ConfigKey, ConfigService, ConfigValidator, Configuration, ValidationOptions,
};
use spx_db::{Database, KvRecord, SqliteKeyValueStore};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Subcommands for configuration management
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Set a configuration value
    Set {
        /// Configuration key (e.g. dataSource.baseUrl)
        key: String,
        /// New value
        value: String,
        #[command(flatten)]
        database: DatabaseArg,
    },
    /// Show one value, or the full effective configuration
    Get {
        /// Configuration key; omit to show everything
        key: Option<String>,
        #[command(flatten)]
        database: DatabaseArg,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the stored configuration
    Validate {
        #[command(flatten)]
        database: DatabaseArg,
        /// Also check data source connectivity and that the start date is a business day
        #[arg(long)]
        strict: bool,
        /// Create missing output, temp and database directories
        #[arg(long)]
        auto_create_dirs: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Overwrite every value with its default
    Reset {
        #[command(flatten)]
        database: DatabaseArg,
    },
    /// Remove a stored value so the default applies
    Unset {
        /// Configuration key
        key: String,
        #[command(flatten)]
        database: DatabaseArg,
    },
    /// List valid keys with their defaults
    Keys {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl ConfigAction {
    pub fn wants_json(&self) -> bool {
        match self {
            ConfigAction::Get { json, .. } => *json,
            ConfigAction::Validate { json, .. } => *json,
            ConfigAction::Keys { json } => *json,
            _ => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct EntryView {
    key: &'static str,
    value: String,
    source: &'static str,
    updated_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct KeyView {
    key: &'static str,
    default: String,
    description: &'static str,
}

pub fn run(action: ConfigAction) -> anyhow::Result<()> {
    if let ConfigAction::Keys { json } = action {
        return run_keys(json);
    }

    let rt = runtime()?;
    rt.block_on(async {
        match action {
            ConfigAction::Set {
                key,
                value,
                database,
            } => with_service(&database.path, |svc| run_set(svc, &database.path, &key, &value)).await,
            ConfigAction::Get {
                key,
                database,
                json,
            } => {
                with_existing_service(&database.path, |svc| {
                    run_get(svc, &database.path, key.as_deref(), json)
                })
                .await
            }
            ConfigAction::Validate {
                database,
                strict,
                auto_create_dirs,
                json,
            } => {
                let options = ValidationOptions {
                    check_connectivity: strict,
                    validate_business_days: strict,
                    auto_create_directories: auto_create_dirs,
                };
                with_existing_service(&database.path, |svc| {
                    run_validate(svc, &database.path, options, json)
                })
                .await
            }
            ConfigAction::Reset { database } => {
                with_service(&database.path, |svc| run_reset(svc, &database.path)).await
            }
            ConfigAction::Unset { key, database } => {
                with_existing_service(&database.path, |svc| run_unset(svc, &database.path, &key))
                    .await
            }
            ConfigAction::Keys { .. } => Ok(()),
        }
    })
}

type Service = ConfigService<SqliteKeyValueStore>;

/// Open (creating if needed) the database, run `f` against an initialized
/// service, close.
async fn with_service<F, Fut>(path: &Path, f: F) -> anyhow::Result<()>
where
    F: FnOnce(Service) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    let db: Database = open_database(path).await?;
    let service = ConfigService::new(db.key_value_store());
    let result = match service.initialize().await {
        Ok(()) => f(service).await,
        Err(err) => Err(HelpfulError::from_config_error(&err, path).into()),
    };
    db.close().await;
    result
}

/// Run `f` against whatever is already stored, creating nothing on disk.
///
/// A missing file or a missing `configuration` table reads as an empty
/// store, so every value falls back to its default.
async fn with_existing_service<F, Fut>(path: &Path, f: F) -> anyhow::Result<()>
where
    F: FnOnce(Service) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    let stored = match open_existing_database(path).await? {
        Some(db) => match db.key_value_store().table_exists().await {
            Ok(true) => Some(db),
            Ok(false) => {
                db.close().await;
                None
            }
            Err(err) => {
                db.close().await;
                return Err(HelpfulError::database_error(&err, path).into());
            }
        },
        None => None,
    };

    let db = match stored {
        Some(db) => db,
        None => {
            debug!(path = %path.display(), "No stored configuration, reading defaults");
            empty_database(path).await?
        }
    };

    let result = f(ConfigService::new(db.key_value_store())).await;
    db.close().await;
    result
}

/// In-memory stand-in with an empty `configuration` table.
async fn empty_database(path: &Path) -> anyhow::Result<Database> {
    let db = Database::open_memory()
        .await
        .map_err(|err| anyhow::Error::from(HelpfulError::database_unavailable(path, &err)))?;
    let service = ConfigService::new(db.key_value_store());
    if let Err(err) = service.initialize().await {
        db.close().await;
        return Err(helpful(err, path));
    }
    Ok(db)
}

fn helpful(err: spx_config::ConfigError, path: &Path) -> anyhow::Error {
    HelpfulError::from_config_error(&err, path).into()
}

async fn run_set(svc: Service, path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let key = svc.set_value(key, value).await.map_err(|e| helpful(e, path))?;
    println!("Set {} = {}", key, value);
    Ok(())
}

async fn run_get(svc: Service, path: &Path, key: Option<&str>, json: bool) -> anyhow::Result<()> {
    match key {
        Some(key) => run_get_one(svc, path, key, json).await,
        None => run_get_all(svc, path, json).await,
    }
}

async fn run_get_one(svc: Service, path: &Path, raw_key: &str, json: bool) -> anyhow::Result<()> {
    let (key, value, source) = match svc.get_value(raw_key).await {
        Ok(value) => (parse_key(raw_key, path)?, value, "stored"),
        Err(err) if err.is_not_found() => {
            let key = parse_key(raw_key, path)?;
            debug!(key = %key, "Key not stored, reporting default");
            (key, defaults().value_of(key), "default")
        }
        Err(err) => return Err(helpful(err, path)),
    };

    if json {
        print_json(&serde_json::json!({
            "key": key.as_str(),
            "value": value,
            "source": source,
        }))
    } else {
        if source == "default" {
            println!("{} (default)", value);
        } else {
            println!("{}", value);
        }
        Ok(())
    }
}

fn parse_key(raw: &str, path: &Path) -> anyhow::Result<ConfigKey> {
    raw.parse::<ConfigKey>()
        .map_err(|e| helpful(spx_config::ConfigError::from(e), path))
}

async fn run_get_all(svc: Service, path: &Path, json: bool) -> anyhow::Result<()> {
    let config = svc.get_full().await.map_err(|e| helpful(e, path))?;
    let records = svc.records().await.map_err(|e| helpful(e, path))?;
    let entries = entries(&config, &records);

    if json {
        return print_json(&serde_json::json!({
            "database": path.display().to_string(),
            "configuration": config,
            "entries": entries,
        }));
    }

    println!("Configuration ({})", path.display());
    print_table_colored(
        &["KEY", "VALUE", "SOURCE", "UPDATED"],
        entries
            .into_iter()
            .map(|e| {
                let color = if e.source == "default" {
                    Some(Color::DarkGrey)
                } else {
                    None
                };
                vec![
                    (e.key.to_string(), None),
                    (e.value, None),
                    (e.source.to_string(), color),
                    (e.updated_at.unwrap_or_else(|| "-".to_string()), None),
                ]
            })
            .collect(),
    );
    Ok(())
}

fn entries(config: &Configuration, records: &[KvRecord]) -> Vec<EntryView> {
    let stored: BTreeMap<&str, &KvRecord> = records.iter().map(|r| (r.key.as_str(), r)).collect();
    ConfigKey::ALL
        .iter()
        .map(|key| {
            let record = stored.get(key.as_str());
            EntryView {
                key: key.as_str(),
                value: config.value_of(*key),
                source: if record.is_some() { "stored" } else { "default" },
                updated_at: record.map(|r| format_timestamp(r.updated_at)),
            }
        })
        .collect()
}

async fn run_validate(
    svc: Service,
    path: &Path,
    options: ValidationOptions,
    json: bool,
) -> anyhow::Result<()> {
    let config = svc.validate_full().await.map_err(|e| helpful(e, path))?;
    let config = ConfigValidator::new()
        .validate_comprehensive(config, &options)
        .await
        .map_err(|e| anyhow::Error::from(HelpfulError::invalid_value(&e)))?;

    if json {
        return print_json(&serde_json::json!({
            "status": "valid",
            "database": path.display().to_string(),
            "checks": {
                "connectivity": options.check_connectivity,
                "business_days": options.validate_business_days,
                "directories": options.auto_create_directories,
            },
            "configuration": config,
        }));
    }

    println!("Configuration is valid ({})", path.display());
    let mut checks = vec!["fields", "cross-field rules"];
    if options.check_connectivity {
        checks.push("connectivity");
    }
    if options.validate_business_days {
        checks.push("business day");
    }
    if options.auto_create_directories {
        checks.push("directories");
    }
    println!("Checks: {}", checks.join(", "));
    Ok(())
}

async fn run_reset(svc: Service, path: &Path) -> anyhow::Result<()> {
    let config = svc.reset().await.map_err(|e| helpful(e, path))?;
    println!("Configuration reset to defaults ({})", path.display());
    print_table(
        &["KEY", "VALUE"],
        config
            .to_records()
            .into_iter()
            .map(|(key, value)| vec![key.to_string(), value])
            .collect(),
    );
    Ok(())
}

async fn run_unset(svc: Service, path: &Path, raw_key: &str) -> anyhow::Result<()> {
    let removed = svc.unset_value(raw_key).await.map_err(|e| helpful(e, path))?;
    let key = parse_key(raw_key, path)?;
    let default = defaults().value_of(key);
    if removed {
        println!("Removed {} (default applies: {})", key, default);
    } else {
        println!("{} was not set (default: {})", key, default);
    }
    Ok(())
}

fn run_keys(json: bool) -> anyhow::Result<()> {
    let config = defaults();
    let keys: Vec<KeyView> = ConfigKey::ALL
        .iter()
        .map(|key| KeyView {
            key: key.as_str(),
            default: config.value_of(*key),
            description: key.description(),
        })
        .collect();

    if json {
        return print_json(&keys);
    }

    print_table(
        &["KEY", "DEFAULT", "DESCRIPTION"],
        keys.into_iter()
            .map(|k| vec![k.key.to_string(), k.default, k.description.to_string()])
            .collect(),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_entries_mark_stored_and_default() {
        let mut config = defaults();
        config.processing.temp_dir = "/scratch".to_string();
        let records = vec![KvRecord {
            key: "processing.tempDir".to_string(),
            value: "/scratch".to_string(),
            updated_at: Some(Utc::now()),
        }];

        let views = entries(&config, &records);
        assert_eq!(views.len(), 6);
        let temp = views.iter().find(|v| v.key == "processing.tempDir").unwrap();
        assert_eq!(temp.source, "stored");
        assert_eq!(temp.value, "/scratch");
        assert!(temp.updated_at.is_some());

        let url = views.iter().find(|v| v.key == "dataSource.baseUrl").unwrap();
        assert_eq!(url.source, "default");
        assert!(url.updated_at.is_none());
    }

    #[test]
    fn test_wants_json() {
        assert!(ConfigAction::Keys { json: true }.wants_json());
        assert!(!ConfigAction::Reset {
            database: DatabaseArg {
                path: "x.db".into()
            }
        }
        .wants_json());
    }
}
