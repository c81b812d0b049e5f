//! Storage integrations for MedBridge.
//!
//! - [`database`] - Store traits and the backend factory
//! - [`memory`] - In-process stores for tests and single-node runs
//! - [`postgresql`] - PostgreSQL stores
//!
//! # Design Pattern
//!
//! Adapters isolate external dependencies behind traits. Everything above
//! this layer holds `Arc<dyn JobStore + Send + Sync>` (and friends), which
//! keeps the broker testable against the in-memory backend:
//!
//! ```rust
//! use medbridge::adapters::database::Stores;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stores = Stores::in_memory();
//! stores.jobs.test_connection().await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod memory;
pub mod postgresql;
