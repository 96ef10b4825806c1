//! Secrets AEAD (spec.md §1): `encrypt(plaintext) -> blob`,
//! `decrypt(blob) -> plaintext`. The cryptographic primitive itself is an
//! out-of-scope external collaborator per spec.md; this module is the thin
//! adapter the manager depends on.
//!
//! Grounded on `everruns-storage::encryption::EncryptionService`, trimmed
//! from its envelope/key-rotation design down to a single process-wide key
//! read once at startup (spec.md §5 "the encryption key is process-wide,
//! read once at startup, never mutated").

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

const NONCE_SIZE: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("secrets encryption key must decode to 32 bytes")]
    InvalidKeyLength,
    #[error("failed to decode secrets encryption key: {0}")]
    KeyDecode(#[from] base64::DecodeError),
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
    #[error("ciphertext blob is malformed")]
    MalformedBlob,
}

#[derive(Clone)]
pub struct SecretsCipher {
    cipher: Aes256Gcm,
}

impl SecretsCipher {
    /// `key` is URL-safe base64 of exactly 32 bytes (spec.md §6
    /// `SECRETS_ENCRYPTION_KEY`).
    pub fn new(key: &str) -> Result<Self, EncryptionError> {
        let raw = URL_SAFE_NO_PAD.decode(key.trim_end_matches('='))?;
        if raw.len() != 32 {
            return Err(EncryptionError::InvalidKeyLength);
        }
        let cipher = Aes256Gcm::new_from_slice(&raw).map_err(|_| EncryptionError::InvalidKeyLength)?;
        Ok(Self { cipher })
    }

    /// Returns a base64 blob: `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| EncryptionError::Encrypt)?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(blob))
    }

    pub fn decrypt(&self, blob: &str) -> Result<String, EncryptionError> {
        let raw = URL_SAFE_NO_PAD.decode(blob)?;
        if raw.len() < NONCE_SIZE {
            return Err(EncryptionError::MalformedBlob);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| EncryptionError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| EncryptionError::MalformedBlob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> String {
        URL_SAFE_NO_PAD.encode([7u8; 32])
    }

    #[test]
    fn round_trips_plaintext() {
        let cipher = SecretsCipher::new(&test_key()).unwrap();
        let blob = cipher.encrypt("top-secret-value").unwrap();
        assert_ne!(blob, "top-secret-value");
        assert_eq!(cipher.decrypt(&blob).unwrap(), "top-secret-value");
    }

    #[test]
    fn rejects_short_keys() {
        let short = URL_SAFE_NO_PAD.encode([1u8; 16]);
        assert!(matches!(
            SecretsCipher::new(&short),
            Err(EncryptionError::InvalidKeyLength)
        ));
    }

    #[test]
    fn tampered_blob_fails_to_decrypt() {
        let cipher = SecretsCipher::new(&test_key()).unwrap();
        let mut blob = URL_SAFE_NO_PAD.decode(cipher.encrypt("x").unwrap()).unwrap();
        *blob.last_mut().unwrap() ^= 0xFF;
        let tampered = URL_SAFE_NO_PAD.encode(blob);
        assert!(cipher.decrypt(&tampered).is_err());
    }
}
