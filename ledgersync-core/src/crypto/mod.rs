//! Cryptographic primitives for snapshot sync.
//!
//! This module provides:
//! - Argon2id key derivation from the user's passphrase
//! - Deterministic per-user salt derivation
//! - AES-256-GCM snapshot encryption/decryption
//! - SHA-256 integrity hashes over the plaintext payload

pub mod cipher;
pub mod kdf;

pub use cipher::{
    decrypt, decrypt_from_base64, encrypt, encrypt_to_base64, integrity_hash, verify_integrity,
    SyncKey,
};
pub use kdf::{derive_key, derive_salt, KdfParams};

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KdfFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid nonce: {0}")]
    InvalidNonce(String),

    #[error("Authentication failed - data may have been tampered with")]
    AuthenticationFailed,

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
