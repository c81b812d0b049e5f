//! Core pipeline logic for MedBridge.
//!
//! # Modules
//!
//! - [`mapping`] - Rule-driven field mapping and the transform registry
//! - [`validation`] - Resource validators keyed by resource kind
//! - [`encryption`] - Payload encryption and key resolution
//! - [`queue`] - Broker state machine, leasing and retry policy
//! - [`worker`] - Pipeline runs and the worker pool
//! - [`status`] - Read-only status queries
//! - [`services`] - Shared service handles
//!
//! # Job Lifecycle
//!
//! 1. **Submit**: The broker stores a `waiting` job keyed by message ID
//! 2. **Lease**: An idle worker takes the next visible job (`active`)
//! 3. **Run**: Resolve key, load mapping, encrypt source, map, validate
//! 4. **Report**: `completed`, or `waiting` with backoff, or `dead`
//! 5. **Side channels**: Alert, daily stats and audit entries
//!
//! # Example
//!
//! ```rust,no_run
//! use medbridge::config::load_config;
//! use medbridge::core::services::PipelineServices;
//! use medbridge::core::worker::WorkerPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("medbridge.toml")?;
//! let services = PipelineServices::from_config(&config).await?;
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let pool = WorkerPool::new(services, &config.queue);
//! let summary = pool.run(shutdown_rx).await?;
//!
//! println!("Completed: {}", summary.completed);
//! # Ok(())
//! # }
//! ```

pub mod encryption;
pub mod mapping;
pub mod queue;
pub mod services;
pub mod status;
pub mod validation;
pub mod worker;
