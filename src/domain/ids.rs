//! Domain identifier types with validation
//!
//! Newtype wrappers for pipeline identifiers. Each type rejects empty values
//! and keeps the different id kinds from being mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Message identifier newtype wrapper
///
/// The idempotency key of a job. Either supplied by the caller or generated
/// on first submission.
///
/// # Examples
///
/// ```
/// use medbridge::domain::ids::MessageId;
/// use std::str::FromStr;
///
/// let id = MessageId::from_str("msg-0001").unwrap();
/// assert_eq!(id.as_str(), "msg-0001");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId(String);

impl MessageId {
    /// Creates a new MessageId from a string
    ///
    /// # Returns
    ///
    /// Returns `Ok(MessageId)` if the ID is valid, `Err` otherwise
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Message ID cannot be empty".to_string());
        }
        if id.len() > 255 {
            return Err(format!(
                "Message ID must be at most 255 characters, got {}",
                id.len()
            ));
        }
        Ok(Self(id))
    }

    /// Generates a fresh random message ID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the message ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Client identifier newtype wrapper
///
/// Identifies the submitting system. Used for alert routing and per-client
/// daily counters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    /// Creates a new ClientId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Client ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Returns the client ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Mapping identifier newtype wrapper
///
/// Names a stored `MappingConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MappingId(String);

impl MappingId {
    /// Creates a new MappingId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Mapping ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Creates a MappingId from a compile-time constant
    pub(crate) fn from_static(id: &'static str) -> Self {
        Self(id.to_string())
    }

    /// Returns the mapping ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

macro_rules! impl_id_traits {
    ($($ty:ident),+) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $ty {
                type Err = String;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    Self::new(s)
                }
            }

            impl TryFrom<String> for $ty {
                type Error = String;

                fn try_from(value: String) -> Result<Self, Self::Error> {
                    Self::new(value)
                }
            }

            impl From<$ty> for String {
                fn from(id: $ty) -> Self {
                    id.0
                }
            }

            impl AsRef<str> for $ty {
                fn as_ref(&self) -> &str {
                    &self.0
                }
            }
        )+
    };
}

impl_id_traits!(MessageId, ClientId, MappingId);
