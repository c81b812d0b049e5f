//! Logging and observability
//!
//! Structured logging through `tracing`, with a console layer and an optional
//! JSON file layer.
//!
//! # Example
//!
//! ```no_run
//! use medbridge::logging::init_logging;
//! use medbridge::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(message_id = "msg-1", "Job submitted");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log a job state transition
///
/// # Example
///
/// ```no_run
/// use medbridge::log_job_transition;
///
/// log_job_transition!("msg-1", "active", 1);
/// ```
#[macro_export]
macro_rules! log_job_transition {
    ($message_id:expr, $status:expr, $attempts:expr) => {
        tracing::info!(
            message_id = %$message_id,
            status = %$status,
            attempts = $attempts,
            "Job transition"
        );
    };
}

/// Log a retry being scheduled
///
/// # Example
///
/// ```no_run
/// use medbridge::log_retry_attempt;
///
/// log_retry_attempt!("msg-1", 2, 3, 4000u64, "Store error: timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($message_id:expr, $attempt:expr, $max_attempts:expr, $delay_ms:expr, $reason:expr) => {
        tracing::warn!(
            message_id = %$message_id,
            attempt = $attempt,
            max_attempts = $max_attempts,
            delay_ms = $delay_ms,
            reason = %$reason,
            "Retry scheduled"
        );
    };
}
