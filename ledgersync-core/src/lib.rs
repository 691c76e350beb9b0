//! LedgerSync Core Library
//!
//! Multi-device synchronization for an offline-first personal-finance
//! client: every device holds a full local copy, pushes encrypted snapshots
//! to a shared blob store and merges what other devices pushed.
//!
//! Data flow: local mutation → debounce → snapshot → encrypt → remote `put`;
//! remote newer → `get` → decrypt → parse → merge → local import.

pub mod crypto;
pub mod device;
pub mod identity;
pub mod local;
pub mod merge;
pub mod platform;
pub mod remote;
pub mod settings;
pub mod snapshot;
pub mod sync;

pub use crypto::{CryptoError, KdfParams, SyncKey};
pub use device::{DeviceDescriptor, DeviceRegistry};
pub use identity::Identity;
pub use local::LocalStore;
pub use merge::{merge_snapshots, MergeOutcome, ProfileMergePolicy};
pub use remote::RemoteStore;
pub use settings::{SettingsStore, SyncSettings};
pub use snapshot::{LocalCollections, Snapshot, SnapshotError};
pub use sync::{SyncConfig, SyncOrchestrator, SyncOutcome, SyncScheduler, SyncStatus};

use thiserror::Error;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Failure of one sync attempt.
///
/// None of these are fatal to the local app; they abort the attempt and the
/// next scheduled trigger retries.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Authentication required: sign in before syncing")]
    AuthenticationRequired,

    #[error("Passphrase required to derive the sync key")]
    PassphraseRequired,

    #[error("Sync is not enabled")]
    NotEnabled,

    #[error("Sync was disabled before the operation completed; result discarded")]
    Cancelled,

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Integrity check failed: remote data does not match its hash")]
    IntegrityMismatch,

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Import failed: {0}")]
    Import(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<CryptoError> for SyncError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::KdfFailed(_) | CryptoError::EncryptionFailed(_) => {
                Self::Encryption(e.to_string())
            }
            CryptoError::DecryptionFailed(_)
            | CryptoError::InvalidNonce(_)
            | CryptoError::AuthenticationFailed
            | CryptoError::InvalidEncoding(_) => Self::Decryption(e.to_string()),
        }
    }
}

impl From<SnapshotError> for SyncError {
    fn from(e: SnapshotError) -> Self {
        match e {
            SnapshotError::Serialization(_) => Self::Encryption(e.to_string()),
            _ => Self::MalformedSnapshot(e.to_string()),
        }
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
