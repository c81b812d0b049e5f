//! Domain error types
//!
//! This module defines the error hierarchy for MedBridge. Errors are
//! domain-specific and never expose third-party types to callers.

use crate::domain::ids::{MappingId, MessageId};
use thiserror::Error;

/// Main MedBridge error type
///
/// This is the primary error type used throughout the pipeline.
/// It wraps specific error types and provides context for error handling.
#[derive(Debug, Error)]
pub enum MedbridgeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Encryption-related errors
    #[error("Encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    /// Job/mapping store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The job references a mapping that does not exist
    #[error("Mapping not found: {0}")]
    MappingNotFound(MappingId),

    /// The submission carried data the pipeline cannot process
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Queue/broker errors
    #[error("Queue error: {0}")]
    Queue(String),

    /// The worker no longer holds the lease on the job it is running
    #[error("Lease lost on job {0}")]
    LeaseLost(MessageId),

    /// A pipeline run exceeded its time budget
    #[error("Job processing timed out after {0}s")]
    Timeout(u64),

    /// Alert delivery errors
    #[error("Alert delivery error: {0}")]
    Alert(String),

    /// Audit trail errors
    #[error("Audit error: {0}")]
    Audit(String),

    /// Network/connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl MedbridgeError {
    /// Whether the error is expected to clear up on its own
    ///
    /// The broker retries every failure uniformly; this classification only
    /// feeds logs and alerts so operators can tell the two kinds apart.
    pub fn is_transient(&self) -> bool {
        match self {
            MedbridgeError::Configuration(_)
            | MedbridgeError::MappingNotFound(_)
            | MedbridgeError::InvalidInput(_)
            | MedbridgeError::Serialization(_) => false,
            MedbridgeError::Encryption(e) => !matches!(e, EncryptionError::KeyTooShort { .. }),
            MedbridgeError::Store(e) => !matches!(e, StoreError::Conflict(_)),
            _ => true,
        }
    }
}

/// Encryption-specific errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    /// Key material below the minimum length
    #[error("Encryption key too short: {actual} bytes, at least {minimum} required")]
    KeyTooShort { actual: usize, minimum: usize },

    /// The key reference could not be resolved
    #[error("Unknown encryption key reference: {0}")]
    UnknownKey(String),

    /// Authentication tag did not verify (wrong key or tampered data)
    #[error("Authentication failed: ciphertext or tag does not verify")]
    AuthenticationFailed,

    /// A bundle field is not valid encoded data
    #[error("Malformed encrypted payload: {0}")]
    MalformedPayload(String),

    /// Key derivation or cipher setup failed
    #[error("Cipher failure: {0}")]
    Cipher(String),
}

/// Store-specific errors
///
/// Raised by job, mapping, and stats stores. These errors don't expose
/// the underlying database driver types.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to reach the store
    #[error("Failed to connect to store: {0}")]
    ConnectionFailed(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(MessageId),

    /// A write raced with another writer
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Stored data could not be decoded
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

impl From<std::io::Error> for MedbridgeError {
    fn from(err: std::io::Error) -> Self {
        MedbridgeError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for MedbridgeError {
    fn from(err: serde_json::Error) -> Self {
        MedbridgeError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for MedbridgeError {
    fn from(err: toml::de::Error) -> Self {
        MedbridgeError::Configuration(format!("TOML parse error: {err}"))
    }
}
