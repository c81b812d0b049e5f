//! Encryption of source payloads at rest
//!
//! The pipeline encrypts each job's original `sourceData` before mapping it.
//! [`EncryptionService`] is the contract; [`AesGcmEncryptionService`] is the
//! implementation used in production. Key material is looked up by reference
//! through a [`KeyProvider`].

pub mod gcm;
pub mod keys;

pub use gcm::AesGcmEncryptionService;
pub use keys::{ConfigKeyProvider, KeyProvider};

use crate::domain::EncryptionError;
use serde::{Deserialize, Serialize};

/// Minimum key material length in bytes
pub const MIN_KEY_LENGTH: usize = 32;

/// An authenticated-encryption bundle; every field is base64 text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
    pub salt: String,
}

/// Authenticated encryption of opaque byte payloads
pub trait EncryptionService: Send + Sync {
    /// Encrypt `plaintext` under `key`
    ///
    /// # Errors
    ///
    /// Fails with [`EncryptionError::KeyTooShort`] when `key` is shorter than
    /// [`MIN_KEY_LENGTH`].
    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<EncryptedPayload, EncryptionError>;

    /// Decrypt a bundle produced by [`EncryptionService::encrypt`]
    ///
    /// # Errors
    ///
    /// Fails with [`EncryptionError::AuthenticationFailed`] when the key is
    /// wrong or any part of the bundle was altered.
    fn decrypt(&self, payload: &EncryptedPayload, key: &[u8]) -> Result<Vec<u8>, EncryptionError>;
}

/// Reject key material below [`MIN_KEY_LENGTH`]
pub fn check_key_length(key: &[u8]) -> Result<(), EncryptionError> {
    if key.len() < MIN_KEY_LENGTH {
        return Err(EncryptionError::KeyTooShort {
            actual: key.len(),
            minimum: MIN_KEY_LENGTH,
        });
    }
    Ok(())
}
