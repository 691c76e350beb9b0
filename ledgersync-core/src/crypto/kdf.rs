//! Argon2id key derivation for the sync passphrase.
//!
//! Every device must arrive at the same key without exchanging anything but
//! the passphrase, so the salt is derived from identity fields rather than
//! generated randomly.

use crate::crypto::cipher::SyncKey;
use crate::crypto::{CryptoError, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Domain separator mixed into every salt.
const SALT_CONTEXT: &[u8] = b"ledgersync-salt-v1";

/// Smallest memory cost accepted (OWASP minimum for Argon2id).
const MIN_MEM_COST_KIB: u32 = 19_456;

/// Parameters for Argon2id key derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    /// Memory cost in KiB (65,536 = 64 MB)
    pub mem_cost: u32,

    /// Time cost (number of iterations)
    pub time_cost: u32,

    /// Parallelism (number of lanes)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost: 65_536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Lighter parameters for constrained devices.
    pub fn interactive() -> Self {
        Self {
            mem_cost: MIN_MEM_COST_KIB,
            time_cost: 2,
            parallelism: 1,
        }
    }

    /// Verify that parameters are within acceptable ranges
    pub fn validate(&self) -> Result<()> {
        if self.mem_cost < MIN_MEM_COST_KIB {
            return Err(CryptoError::KdfFailed(format!(
                "Memory cost too low (minimum: {} KiB)",
                MIN_MEM_COST_KIB
            )));
        }
        if self.time_cost < 1 {
            return Err(CryptoError::KdfFailed(
                "Time cost too low (minimum: 1)".to_string(),
            ));
        }
        if self.parallelism < 1 {
            return Err(CryptoError::KdfFailed(
                "Parallelism too low (minimum: 1)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Derive the 32-byte salt for a user from identity fields only.
///
/// The email is trimmed and lowercased so that cosmetic differences between
/// devices do not produce different keys.
pub fn derive_salt(user_id: &str, user_email: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(SALT_CONTEXT);
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(user_email.trim().to_lowercase().as_bytes());
    hasher.finalize().into()
}

/// Derive the sync key from a passphrase and salt using Argon2id.
///
/// Deterministic: the same `(passphrase, salt, params)` always yields the
/// same key, which is what lets a second device decrypt the first one's
/// snapshot.
pub fn derive_key(passphrase: &[u8], salt: &[u8; 32], params: &KdfParams) -> Result<SyncKey> {
    params.validate()?;

    if passphrase.is_empty() {
        return Err(CryptoError::KdfFailed("Passphrase must not be empty".to_string()));
    }

    let params_obj = Params::new(params.mem_cost, params.time_cost, params.parallelism, Some(32))
        .map_err(|e| CryptoError::KdfFailed(format!("Invalid parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params_obj);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(passphrase, salt, &mut key)
        .map_err(|e| CryptoError::KdfFailed(format!("Hashing failed: {}", e)))?;

    Ok(SyncKey::from_bytes(key))
}
