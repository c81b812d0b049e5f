//! Domain models and types for MedBridge.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`MessageId`], [`ClientId`], [`MappingId`])
//! - **Job model** ([`Job`], [`JobStatus`], [`SubmitRequest`], [`JobOutput`])
//! - **Alerts** ([`Alert`], [`AlertCategory`], [`AlertSeverity`])
//! - **Error types** ([`MedbridgeError`], [`EncryptionError`], [`StoreError`])
//! - **Result type alias** ([`Result`])
//!
//! # Type Safety
//!
//! Identifiers use the newtype pattern so that a client ID can never be passed
//! where a message ID is expected:
//!
//! ```rust
//! use medbridge::domain::{ClientId, MessageId};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let message_id = MessageId::new("msg-0001")?;
//! let client_id = ClientId::new("clinic-42")?;
//!
//! // This won't compile - type safety prevents mixing IDs
//! // let wrong: MessageId = client_id;
//! # Ok(())
//! # }
//! ```

pub mod alert;
pub mod errors;
pub mod ids;
pub mod job;
pub mod result;

// Re-export commonly used types for convenience
pub use alert::{Alert, AlertCategory, AlertSeverity};
pub use errors::{EncryptionError, MedbridgeError, StoreError};
pub use ids::{ClientId, MappingId, MessageId};
pub use job::{
    DeadLetterEntry, ExternalStatus, Job, JobOutput, JobStatus, JobVersion, SubmitReceipt,
    SubmitRequest, DEFAULT_MAX_ATTEMPTS,
};
pub use result::Result;
