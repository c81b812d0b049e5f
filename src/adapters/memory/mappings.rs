//! In-memory mapping store and mapping file loading

use crate::adapters::database::traits::MappingStore;
use crate::core::mapping::{presets, MappingConfig};
use crate::domain::ids::MappingId;
use crate::domain::{MedbridgeError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryMappingStore {
    mappings: RwLock<HashMap<MappingId, MappingConfig>>,
}

impl InMemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with the built-in mappings
    pub fn with_builtins() -> Self {
        let mappings = presets::builtin_mappings()
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();
        Self {
            mappings: RwLock::new(mappings),
        }
    }
}

#[async_trait]
impl MappingStore for InMemoryMappingStore {
    async fn get(&self, mapping_id: &MappingId) -> Result<Option<MappingConfig>> {
        Ok(self.mappings.read().await.get(mapping_id).cloned())
    }

    async fn put(&self, config: MappingConfig) -> Result<()> {
        config.validate().map_err(MedbridgeError::Configuration)?;
        self.mappings.write().await.insert(config.id.clone(), config);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<MappingId>> {
        let mut ids: Vec<MappingId> = self.mappings.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Read every `*.json` mapping file in `dir`
///
/// Each file holds one `MappingConfig`. Files are read in name order.
///
/// # Errors
///
/// Returns a configuration error naming the file when a mapping cannot be
/// read, parsed, or fails structural validation.
pub fn read_mapping_dir(dir: &Path) -> Result<Vec<MappingConfig>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        MedbridgeError::Configuration(format!(
            "Failed to read mappings directory {}: {e}",
            dir.display()
        ))
    })?;

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    paths
        .iter()
        .map(|path| -> Result<MappingConfig> {
            let content = std::fs::read_to_string(path)?;
            let config: MappingConfig = serde_json::from_str(&content).map_err(|e| {
                MedbridgeError::Configuration(format!(
                    "Invalid mapping file {}: {e}",
                    path.display()
                ))
            })?;
            config.validate().map_err(MedbridgeError::Configuration)?;
            tracing::debug!(mapping_id = %config.id, path = %path.display(), "Loaded mapping");
            Ok(config)
        })
        .collect()
}
