//! AES-256-GCM with per-payload HKDF-SHA256 key derivation

use super::{check_key_length, EncryptedPayload, EncryptionService};
use crate::domain::EncryptionError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

pub const SALT_LENGTH: usize = 16;
pub const IV_LENGTH: usize = 12;
pub const TAG_LENGTH: usize = 16;

const HKDF_INFO: &[u8] = b"medbridge source payload v1";

/// AES-256-GCM encryption service
///
/// Each payload gets a fresh random salt and IV. The cipher key is derived
/// from the caller's key material and the salt, so the same key never
/// encrypts two payloads directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmEncryptionService;

impl AesGcmEncryptionService {
    pub fn new() -> Self {
        Self
    }

    fn cipher(key: &[u8], salt: &[u8]) -> Result<Aes256Gcm, EncryptionError> {
        let mut derived = [0u8; 32];
        Hkdf::<Sha256>::new(Some(salt), key)
            .expand(HKDF_INFO, &mut derived)
            .map_err(|e| EncryptionError::Cipher(e.to_string()))?;
        let cipher = Aes256Gcm::new_from_slice(&derived)
            .map_err(|e| EncryptionError::Cipher(e.to_string()));
        derived.zeroize();
        cipher
    }
}

impl EncryptionService for AesGcmEncryptionService {
    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<EncryptedPayload, EncryptionError> {
        check_key_length(key)?;

        let mut rng = rand::thread_rng();
        let mut salt = [0u8; SALT_LENGTH];
        let mut iv = [0u8; IV_LENGTH];
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut iv);

        let mut sealed = Self::cipher(key, &salt)?
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| EncryptionError::Cipher("encryption failed".to_string()))?;
        let tag = sealed.split_off(sealed.len() - TAG_LENGTH);

        Ok(EncryptedPayload {
            ciphertext: STANDARD.encode(&sealed),
            iv: STANDARD.encode(iv),
            auth_tag: STANDARD.encode(tag),
            salt: STANDARD.encode(salt),
        })
    }

    fn decrypt(&self, payload: &EncryptedPayload, key: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        check_key_length(key)?;

        let mut sealed = decode("ciphertext", &payload.ciphertext, None)?;
        let iv = decode("iv", &payload.iv, Some(IV_LENGTH))?;
        let tag = decode("authTag", &payload.auth_tag, Some(TAG_LENGTH))?;
        let salt = decode("salt", &payload.salt, Some(SALT_LENGTH))?;
        sealed.extend_from_slice(&tag);

        Self::cipher(key, &salt)?
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| EncryptionError::AuthenticationFailed)
    }
}

fn decode(field: &str, value: &str, expected_len: Option<usize>) -> Result<Vec<u8>, EncryptionError> {
    let bytes = STANDARD
        .decode(value)
        .map_err(|e| EncryptionError::MalformedPayload(format!("{field}: {e}")))?;
    match expected_len {
        Some(len) if bytes.len() != len => Err(EncryptionError::MalformedPayload(format!(
            "{field}: expected {len} bytes, got {}",
            bytes.len()
        ))),
        _ => Ok(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";
    const OTHER_KEY: &[u8] = b"fedcba9876543210fedcba9876543210";

    #[test]
    fn test_round_trip() {
        let service = AesGcmEncryptionService::new();
        let payload = service.encrypt(br#"{"id":"p1"}"#, KEY).unwrap();
        assert_eq!(service.decrypt(&payload, KEY).unwrap(), br#"{"id":"p1"}"#);
    }

    #[test]
    fn test_bundle_shape() {
        let payload = AesGcmEncryptionService::new().encrypt(b"hello", KEY).unwrap();
        assert_eq!(STANDARD.decode(&payload.iv).unwrap().len(), IV_LENGTH);
        assert_eq!(STANDARD.decode(&payload.salt).unwrap().len(), SALT_LENGTH);
        assert_eq!(STANDARD.decode(&payload.auth_tag).unwrap().len(), TAG_LENGTH);
        assert_eq!(STANDARD.decode(&payload.ciphertext).unwrap().len(), 5);
    }

    #[test]
    fn test_fresh_salt_and_iv_per_payload() {
        let service = AesGcmEncryptionService::new();
        let a = service.encrypt(b"same", KEY).unwrap();
        let b = service.encrypt(b"same", KEY).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let service = AesGcmEncryptionService::new();
        let payload = service.encrypt(b"secret record", KEY).unwrap();
        assert_eq!(
            service.decrypt(&payload, OTHER_KEY).unwrap_err(),
            EncryptionError::AuthenticationFailed
        );
    }

    #[test]
    fn test_tampered_tag_fails_authentication() {
        let service = AesGcmEncryptionService::new();
        let mut payload = service.encrypt(b"secret record", KEY).unwrap();
        let mut tag = STANDARD.decode(&payload.auth_tag).unwrap();
        tag[0] ^= 0xff;
        payload.auth_tag = STANDARD.encode(tag);
        assert_eq!(
            service.decrypt(&payload, KEY).unwrap_err(),
            EncryptionError::AuthenticationFailed
        );
    }

    #[test]
    fn test_short_key_rejected() {
        let err = AesGcmEncryptionService::new()
            .encrypt(b"x", b"too-short")
            .unwrap_err();
        assert!(matches!(err, EncryptionError::KeyTooShort { actual: 9, .. }));
    }

    #[test]
    fn test_malformed_payload() {
        let service = AesGcmEncryptionService::new();
        let mut payload = service.encrypt(b"x", KEY).unwrap();
        payload.iv = "not base64!".to_string();
        assert!(matches!(
            service.decrypt(&payload, KEY),
            Err(EncryptionError::MalformedPayload(_))
        ));
    }
}
