//! Typed configuration for the SPX pipeline.
//!
//! - [`schema`]: the six keys, the typed [`Configuration`] and per-field rules.
//! - [`rules`]: cross-field, date, filesystem and connectivity checks.
//! - [`service`]: reads and writes through a [`spx_db::KeyValueStore`].
//!
//! ```rust,ignore
//! use spx_config::{ConfigService, ConfigValidator, ValidationOptions};
//!
//! let service = ConfigService::new(db.key_value_store());
//! service.initialize().await?;
//! service.set_value("dataSource.maxConcurrentRequests", "8").await?;
//!
//! let config = service.validate_full().await?;
//! ConfigValidator::new()
//!     .validate_comprehensive(config, &ValidationOptions::default())
//!     .await?;
//! ```

pub mod error;
pub mod rules;
pub mod schema;
pub mod service;

pub use error::{ConfigError, ValidationError, ValidationRule};
pub use rules::{
    is_business_day, ConfigValidator, ConnectivityProbe, DirectoryCreator, FsDirectoryCreator,
    HttpProbe, ValidationOptions,
};
pub use schema::{defaults, validate_all, validate_field, ConfigKey, Configuration, FieldValue};
pub use service::ConfigService;
