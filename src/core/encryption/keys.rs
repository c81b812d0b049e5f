//! Key material lookup

use crate::config::{EncryptionConfig, SecretString};
use crate::domain::EncryptionError;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Resolves an `encryptionKeyRef` to key material
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn resolve(&self, key_ref: &str) -> Result<SecretString, EncryptionError>;
}

/// Key provider backed by the `[encryption.keys]` config table
#[derive(Clone, Default)]
pub struct ConfigKeyProvider {
    keys: BTreeMap<String, SecretString>,
}

impl ConfigKeyProvider {
    pub fn new(keys: BTreeMap<String, SecretString>) -> Self {
        Self { keys }
    }

    pub fn from_config(config: &EncryptionConfig) -> Self {
        Self::new(config.keys.clone())
    }

    pub fn insert(&mut self, key_ref: impl Into<String>, key: SecretString) {
        self.keys.insert(key_ref.into(), key);
    }

    pub fn key_refs(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ConfigKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigKeyProvider")
            .field("key_refs", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl KeyProvider for ConfigKeyProvider {
    async fn resolve(&self, key_ref: &str) -> Result<SecretString, EncryptionError> {
        self.keys
            .get(key_ref)
            .cloned()
            .ok_or_else(|| EncryptionError::UnknownKey(key_ref.to_string()))
    }
}
