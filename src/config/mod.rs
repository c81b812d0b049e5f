//! Configuration management for MedBridge.
//!
//! # Overview
//!
//! MedBridge reads a TOML file (`medbridge.toml` by default) with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `MEDBRIDGE_*` environment overrides applied after parsing
//! - Default values for every optional setting
//! - Validation on load
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use medbridge::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("medbridge.toml")?;
//!
//! println!("Workers: {}", config.queue.concurrency);
//! println!("Attempt budget: {}", config.queue.max_attempts);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Name and log level
//! - [`QueueConfig`] - Worker pool, leases, retry backoff
//! - [`PostgreSQLConfig`] - PostgreSQL job store (when `store_backend = "postgresql"`)
//! - [`EncryptionConfig`] - Key references and key material
//! - [`MappingsConfig`] - Mapping file directory and built-in mappings
//! - [`AlertsConfig`] - Alert sink (log or webhook)
//! - [`AuditConfig`] - Lifecycle audit trail
//! - [`LoggingConfig`] - JSON file logging
//!
//! # Example Configuration
//!
//! ```toml
//! store_backend = "postgresql"
//!
//! [queue]
//! concurrency = 5
//! max_attempts = 3
//!
//! [postgresql]
//! connection_string = "${MEDBRIDGE_PG_URL}"
//!
//! [encryption.keys]
//! clinic-a = "${CLINIC_A_KEY}"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::{load_config, parse_config};
pub use schema::{
    AlertSinkKind, AlertsConfig, ApplicationConfig, AuditConfig, EncryptionConfig, Environment,
    LoggingConfig, MappingsConfig, MedbridgeConfig, PostgreSQLConfig, QueueConfig, StoreBackend,
};
pub use secret::{secret_string, SecretString, SecretValue};
