//! Remote Store Adapter: the contract of the opaque blob store.
//!
//! The store only ever sees ciphertext, hashes and device metadata. It keeps
//! one logical "latest" record per user and is last-write-wins at the blob
//! level; conflict resolution happens in the merge engine.

#[cfg(feature = "http")]
pub mod http;
pub mod memory;

#[cfg(feature = "http")]
pub use http::HttpRemoteStore;
pub use memory::InMemoryRemoteStore;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stored snapshot as returned by `get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub user_id: String,
    pub device_id: String,
    /// Base64 `nonce || ciphertext || tag`.
    pub encrypted_data: String,
    /// Hex SHA-256 of the plaintext.
    pub data_hash: String,
    /// Epoch millis assigned by the store on `put`.
    pub last_modified: i64,
}

/// Lightweight freshness answer from `get_latest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFreshness {
    pub last_modified: i64,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Written after every successful `put`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub device_id: String,
    pub protocol_version: u32,
    pub last_sync: i64,
}

/// A device known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_name: String,
    pub last_seen: i64,
}

/// Answer to a device revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveDeviceResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request/response access to the shared blob store.
///
/// Every method is a suspension point; failures surface as
/// [`SyncError::Transport`](crate::SyncError::Transport).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn put(
        &self,
        user_id: &str,
        device_id: &str,
        encrypted_data: &str,
        data_hash: &str,
    ) -> Result<()>;

    async fn get(&self, user_id: &str) -> Result<Option<RemoteRecord>>;

    async fn get_latest(&self, user_id: &str) -> Result<Option<RemoteFreshness>>;

    async fn update_metadata(&self, user_id: &str, metadata: &SyncMetadata) -> Result<()>;

    async fn register_device(&self, user_id: &str, device_id: &str, device_name: &str)
        -> Result<()>;

    async fn list_devices(&self, user_id: &str) -> Result<Vec<DeviceInfo>>;

    /// Revokes visibility of a device. Data it already pushed is untouched.
    async fn remove_device(&self, user_id: &str, device_id: &str) -> Result<RemoveDeviceResult>;
}
