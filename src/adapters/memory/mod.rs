//! In-process store implementations
//!
//! Used for tests and single-process deployments (`store_backend = "memory"`).
//! State is lost when the process exits.

pub mod jobs;
pub mod mappings;
pub mod stats;

pub use jobs::InMemoryJobStore;
pub use mappings::{read_mapping_dir, InMemoryMappingStore};
pub use stats::InMemoryStatsStore;
