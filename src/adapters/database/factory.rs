//! Store factory
//!
//! Builds the job, mapping and stats stores for the configured backend and
//! seeds the mapping store.

use crate::adapters::database::traits::{JobStore, MappingStore, StatsStore};
use crate::adapters::memory::{
    read_mapping_dir, InMemoryJobStore, InMemoryMappingStore, InMemoryStatsStore,
};
use crate::adapters::postgresql::adapter::PostgreSQLAdapter;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::config::schema::{MappingsConfig, MedbridgeConfig, StoreBackend};
use crate::core::mapping::presets;
use crate::domain::{MedbridgeError, Result};
use std::path::Path;
use std::sync::Arc;

/// The three stores the pipeline runs on
///
/// With PostgreSQL all three share one connection pool.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn JobStore + Send + Sync>,
    pub mappings: Arc<dyn MappingStore + Send + Sync>,
    pub stats: Arc<dyn StatsStore + Send + Sync>,
}

impl Stores {
    /// Fresh in-memory stores with no mappings loaded
    pub fn in_memory() -> Self {
        Self {
            jobs: Arc::new(InMemoryJobStore::new()),
            mappings: Arc::new(InMemoryMappingStore::new()),
            stats: Arc::new(InMemoryStatsStore::new()),
        }
    }
}

/// Create the stores selected by `store_backend`
///
/// Mappings are seeded from [`MappingsConfig`] before returning.
///
/// # Errors
///
/// Returns an error if the backend cannot be reached, the schema migration
/// fails, or a mapping file is invalid.
pub async fn create_stores(config: &MedbridgeConfig) -> Result<Stores> {
    let stores = match config.store_backend {
        StoreBackend::Memory => {
            tracing::info!("Creating in-memory stores");
            Stores::in_memory()
        }
        StoreBackend::PostgreSQL => {
            let pg_config = config.postgresql.as_ref().ok_or_else(|| {
                MedbridgeError::Configuration(
                    "store_backend is postgresql but [postgresql] is missing".to_string(),
                )
            })?;

            tracing::info!("Creating PostgreSQL stores");
            let client = Arc::new(PostgreSQLClient::new(pg_config.clone()).await?);
            if pg_config.run_migrations {
                client.run_migrations().await?;
            }
            let adapter = Arc::new(PostgreSQLAdapter::new_with_arc(client));

            Stores {
                jobs: adapter.clone(),
                mappings: adapter.clone(),
                stats: adapter,
            }
        }
    };

    let seeded = seed_mappings(stores.mappings.as_ref(), &config.mappings).await?;
    tracing::info!(mappings = seeded, "Mapping store seeded");

    Ok(stores)
}

/// Load built-in and directory mappings into `store`
///
/// Built-ins go first so a directory mapping with the same ID replaces them.
/// Returns the number of mappings written.
pub async fn seed_mappings(
    store: &(dyn MappingStore + Send + Sync),
    config: &MappingsConfig,
) -> Result<usize> {
    let mut written = 0;

    if config.builtin {
        for mapping in presets::builtin_mappings() {
            store.put(mapping).await?;
            written += 1;
        }
    }

    if let Some(dir) = &config.directory {
        for mapping in read_mapping_dir(Path::new(dir))? {
            tracing::debug!(mapping_id = %mapping.id, "Registering mapping from directory");
            store.put(mapping).await?;
            written += 1;
        }
    }

    Ok(written)
}
