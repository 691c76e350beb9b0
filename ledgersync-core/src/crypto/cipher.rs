//! AES-256-GCM encryption for sync snapshots.
//!
//! The wire format is `nonce(12) || ciphertext || auth_tag(16)`. When the
//! payload travels as a string (the remote store's `encryptedData` field) it
//! is base64 encoded with the standard alphabet.

use crate::crypto::{CryptoError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Symmetric key derived from the user's passphrase.
#[derive(Clone)]
pub struct SyncKey {
    key: [u8; 32],
}

impl SyncKey {
    /// Create a key from raw bytes
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes (use sparingly)
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl Drop for SyncKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for SyncKey {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Encrypt a payload.
///
/// Returns `nonce(12) || ciphertext || auth_tag(16)`; every call uses a
/// fresh random nonce.
pub fn encrypt(key: &SyncKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    if plaintext.is_empty() {
        return Err(CryptoError::EncryptionFailed(
            "Cannot encrypt empty payload".to_string(),
        ));
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let nonce_bytes: [u8; NONCE_LEN] = nonce.into();

    // aes-gcm appends the tag, so this is ciphertext || tag
    let ciphertext_with_tag = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(format!("Snapshot encryption failed: {}", e)))?;

    let mut result = Vec::with_capacity(NONCE_LEN + ciphertext_with_tag.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext_with_tag);

    Ok(result)
}

/// Decrypt a payload produced by [`encrypt`].
///
/// Fails with [`CryptoError::AuthenticationFailed`] on a wrong key or any
/// tampering; never returns unauthenticated bytes.
pub fn decrypt(key: &SyncKey, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_LEN + 1 + TAG_LEN {
        return Err(CryptoError::DecryptionFailed(
            "Encrypted payload too short".to_string(),
        ));
    }

    let nonce_bytes: [u8; NONCE_LEN] = blob[..NONCE_LEN]
        .try_into()
        .map_err(|_| CryptoError::InvalidNonce("Invalid nonce length".to_string()))?;
    let ciphertext_with_tag = &blob[NONCE_LEN..];

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Nonce::from(nonce_bytes);

    cipher
        .decrypt(&nonce, ciphertext_with_tag)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Encrypt and base64-encode for string transport.
pub fn encrypt_to_base64(key: &SyncKey, plaintext: &[u8]) -> Result<String> {
    encrypt(key, plaintext).map(|blob| STANDARD.encode(blob))
}

/// Decode base64 transport text and decrypt it.
pub fn decrypt_from_base64(key: &SyncKey, encoded: &str) -> Result<Vec<u8>> {
    let blob = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
    decrypt(key, &blob)
}

/// Hex SHA-256 of the plaintext payload.
pub fn integrity_hash(plaintext: &[u8]) -> String {
    hex::encode(Sha256::digest(plaintext))
}

/// Constant-time check of a plaintext against a stored integrity hash.
pub fn verify_integrity(plaintext: &[u8], expected: &str) -> bool {
    let actual = integrity_hash(plaintext);
    let expected = expected.trim().to_ascii_lowercase();
    actual.len() == expected.len() && bool::from(actual.as_bytes().ct_eq(expected.as_bytes()))
}
