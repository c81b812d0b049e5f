//! Store abstraction layer
//!
//! Trait-based abstraction over the job, mapping and stats stores, so the
//! broker and workers run unchanged on the in-memory or PostgreSQL backend.

pub mod factory;
pub mod traits;

pub use factory::{create_stores, seed_mappings, Stores};
pub use traits::{DailyStats, InsertOutcome, JobStore, MappingStore, QueueStats, StatsStore};
