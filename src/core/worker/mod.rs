//! Queue workers
//!
//! - [`pipeline`] - A single run of the mapping pipeline for one job
//! - [`pool`] - Concurrent workers, lease reaper and graceful shutdown

pub mod pipeline;
pub mod pool;

pub use pipeline::{execute, transform_record, JobRunner, RunOutcome, Transformed};
pub use pool::{PoolSummary, WorkerPool};
