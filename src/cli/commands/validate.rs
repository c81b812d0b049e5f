//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the MedBridge configuration file.

use crate::adapters::memory::read_mapping_dir;
use crate::adapters::postgresql::client::redact_connection_string;
use crate::config::{load_config, StoreBackend};
use crate::core::encryption::check_key_length;
use clap::Args;
use secrecy::ExposeSecret;
use std::path::Path;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config runs validation
        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration is valid");
                c
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        let mut warnings = Vec::new();
        for (key_ref, key) in &config.encryption.keys {
            if let Err(e) = check_key_length(key.expose_secret().as_bytes()) {
                warnings.push(format!("encryption.keys.{key_ref}: {e}"));
            }
        }

        let directory_mappings = match &config.mappings.directory {
            Some(dir) => match read_mapping_dir(Path::new(dir)) {
                Ok(mappings) => mappings.len(),
                Err(e) => {
                    println!("❌ Invalid mappings directory");
                    println!("   Error: {e}");
                    return Ok(2);
                }
            },
            None => 0,
        };

        println!();
        println!("Configuration Summary:");
        println!("  Application: {}", config.application.name);
        println!("  Environment: {:?}", config.environment);
        println!("  Log Level: {}", config.application.log_level);
        match config.store_backend {
            StoreBackend::Memory => println!("  Store Backend: memory"),
            StoreBackend::PostgreSQL => {
                println!("  Store Backend: postgresql");
                if let Some(ref pg_config) = config.postgresql {
                    println!(
                        "  PostgreSQL Connection: {}",
                        redact_connection_string(pg_config.connection_string.expose_secret().as_ref())
                    );
                    println!("  Max Connections: {}", pg_config.max_connections);
                }
            }
        }
        println!("  Workers: {}", config.queue.concurrency);
        println!("  Max Attempts: {}", config.queue.max_attempts);
        println!(
            "  Backoff: {} ms base, {} ms cap",
            config.queue.backoff_base_ms, config.queue.backoff_cap_ms
        );
        println!("  Encryption Keys: {}", config.encryption.keys.len());
        println!(
            "  Mappings: {} built-in, {} from directory",
            if config.mappings.builtin { "with" } else { "without" },
            directory_mappings
        );
        println!("  Alert Sink: {:?}", config.alerts.sink);
        println!("  Audit Trail: {}", if config.audit.enabled { "enabled" } else { "disabled" });

        if !warnings.is_empty() {
            println!();
            for warning in &warnings {
                println!("⚠️  {warning}");
            }
        }
        println!();
        Ok(0)
    }
}
