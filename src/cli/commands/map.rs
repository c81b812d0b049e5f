//! Map command implementation
//!
//! Runs one record through the mapping engine and validators without
//! touching the job store. Useful for authoring mapping files.

use super::load_or_report;
use crate::adapters::database::{seed_mappings, MappingStore};
use crate::adapters::memory::InMemoryMappingStore;
use crate::core::mapping::MappingEngine;
use crate::core::validation::ValidatorRegistry;
use crate::core::worker::transform_record;
use crate::domain::ids::MappingId;
use chrono::Utc;
use clap::Args;
use serde_json::{Map, Value};
use std::fs;

/// Arguments for the map command
#[derive(Args, Debug)]
pub struct MapArgs {
    /// Mapping ID (built-in or from the mappings directory)
    #[arg(short, long)]
    pub mapping: String,

    /// JSON file holding the source record
    #[arg(short, long)]
    pub file: String,
}

impl MapArgs {
    /// Execute the map command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(mapping_id = %self.mapping, file = %self.file, "Mapping record");

        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };

        let mapping_id = match MappingId::new(&self.mapping) {
            Ok(id) => id,
            Err(e) => {
                println!("❌ Invalid mapping ID: {e}");
                return Ok(2);
            }
        };

        let store = InMemoryMappingStore::new();
        if let Err(e) = seed_mappings(&store, &config.mappings).await {
            println!("❌ Failed to load mappings");
            println!("   Error: {e}");
            return Ok(2);
        }
        let Some(mapping) = store.get(&mapping_id).await? else {
            println!("❌ Mapping not found: {mapping_id}");
            return Ok(3); // Not found exit code
        };

        let source = match read_source(&self.file) {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Invalid source file {}", self.file);
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let output = transform_record(
            &MappingEngine::default(),
            &ValidatorRegistry::with_builtins(),
            &source,
            &mapping,
            Utc::now(),
        )
        .output;

        if output.is_valid {
            println!("✅ Record is valid");
        } else {
            println!("⚠️  Record has {} problem(s)", output.errors.len());
        }
        for error in &output.errors {
            println!("   - {error}");
        }
        println!();
        println!("{}", serde_json::to_string_pretty(&output.transformed)?);
        Ok(0)
    }
}

fn read_source(path: &str) -> anyhow::Result<Map<String, Value>> {
    let content = fs::read_to_string(path)?;
    match serde_json::from_str(&content)? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("source record must be a JSON object"),
    }
}
