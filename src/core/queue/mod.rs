//! Durable job queue
//!
//! - [`broker`] - Submission, leasing, completion and failure handling
//! - [`retry`] - Attempt budget and exponential backoff

pub mod broker;
pub mod retry;

pub use broker::{Broker, FailOutcome};
pub use retry::{backoff_delay_ms, RetryPolicy};
