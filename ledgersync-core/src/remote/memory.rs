//! In-process blob store.
//!
//! Behaves like the shared remote: last-write-wins per user, a per-device
//! record of each device's latest push, and a device registry. Useful for
//! tests and for several orchestrators sharing one process.

use crate::remote::{
    DeviceInfo, RemoteFreshness, RemoteRecord, RemoteStore, RemoveDeviceResult, SyncMetadata,
};
use crate::sync::clock::{Clock, SystemClock};
use crate::{Result, SyncError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct UserSpace {
    latest: Option<RemoteRecord>,
    by_device: HashMap<String, RemoteRecord>,
    metadata: Option<SyncMetadata>,
    devices: Vec<DeviceInfo>,
}

pub struct InMemoryRemoteStore {
    users: Mutex<HashMap<String, UserSpace>>,
    clock: Arc<dyn Clock>,
    offline: AtomicBool,
    puts: AtomicUsize,
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            clock,
            offline: AtomicBool::new(false),
            puts: AtomicUsize::new(0),
        }
    }

    /// Simulate lost connectivity: every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful `put` calls so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Latest record pushed by each device, in no particular order.
    pub async fn device_records(&self, user_id: &str) -> Vec<RemoteRecord> {
        let users = self.users.lock().await;
        users
            .get(user_id)
            .map(|space| space.by_device.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn metadata(&self, user_id: &str) -> Option<SyncMetadata> {
        let users = self.users.lock().await;
        users.get(user_id).and_then(|space| space.metadata.clone())
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(SyncError::Transport("remote store unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn put(
        &self,
        user_id: &str,
        device_id: &str,
        encrypted_data: &str,
        data_hash: &str,
    ) -> Result<()> {
        self.check_online()?;
        let mut users = self.users.lock().await;
        let space = users.entry(user_id.to_string()).or_default();

        // Strictly increasing so two pushes in the same millisecond stay ordered.
        let previous = space.latest.as_ref().map_or(i64::MIN, |r| r.last_modified);
        let last_modified = self.clock.now_millis().max(previous.saturating_add(1));

        let record = RemoteRecord {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            encrypted_data: encrypted_data.to_string(),
            data_hash: data_hash.to_string(),
            last_modified,
        };
        space.by_device.insert(device_id.to_string(), record.clone());
        space.latest = Some(record);

        if let Some(device) = space.devices.iter_mut().find(|d| d.device_id == device_id) {
            device.last_seen = last_modified;
        }

        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, user_id: &str) -> Result<Option<RemoteRecord>> {
        self.check_online()?;
        let users = self.users.lock().await;
        Ok(users.get(user_id).and_then(|space| space.latest.clone()))
    }

    async fn get_latest(&self, user_id: &str) -> Result<Option<RemoteFreshness>> {
        self.check_online()?;
        let users = self.users.lock().await;
        Ok(users
            .get(user_id)
            .and_then(|space| space.latest.as_ref())
            .map(|record| RemoteFreshness {
                last_modified: record.last_modified,
                device_id: Some(record.device_id.clone()),
            }))
    }

    async fn update_metadata(&self, user_id: &str, metadata: &SyncMetadata) -> Result<()> {
        self.check_online()?;
        let mut users = self.users.lock().await;
        users.entry(user_id.to_string()).or_default().metadata = Some(metadata.clone());
        Ok(())
    }

    async fn register_device(
        &self,
        user_id: &str,
        device_id: &str,
        device_name: &str,
    ) -> Result<()> {
        self.check_online()?;
        let now = self.clock.now_millis();
        let mut users = self.users.lock().await;
        let space = users.entry(user_id.to_string()).or_default();

        match space.devices.iter_mut().find(|d| d.device_id == device_id) {
            Some(device) => {
                device.device_name = device_name.to_string();
                device.last_seen = now;
            }
            None => space.devices.push(DeviceInfo {
                device_id: device_id.to_string(),
                device_name: device_name.to_string(),
                last_seen: now,
            }),
        }
        Ok(())
    }

    async fn list_devices(&self, user_id: &str) -> Result<Vec<DeviceInfo>> {
        self.check_online()?;
        let users = self.users.lock().await;
        Ok(users
            .get(user_id)
            .map(|space| space.devices.clone())
            .unwrap_or_default())
    }

    async fn remove_device(&self, user_id: &str, device_id: &str) -> Result<RemoveDeviceResult> {
        self.check_online()?;
        let mut users = self.users.lock().await;
        let Some(space) = users.get_mut(user_id) else {
            return Ok(RemoveDeviceResult {
                success: false,
                device_name: None,
                error: Some("Device not found".to_string()),
            });
        };

        match space.devices.iter().position(|d| d.device_id == device_id) {
            Some(position) => {
                let removed = space.devices.remove(position);
                Ok(RemoveDeviceResult {
                    success: true,
                    device_name: Some(removed.device_name),
                    error: None,
                })
            }
            None => Ok(RemoveDeviceResult {
                success: false,
                device_name: None,
                error: Some("Device not found".to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::clock::ManualClock;

    fn store_at(millis: i64) -> (Arc<ManualClock>, InMemoryRemoteStore) {
        let clock = Arc::new(ManualClock::new(millis));
        let store = InMemoryRemoteStore::with_clock(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn get_on_empty_store_returns_none() {
        let (_, store) = store_at(1_000);
        assert!(store.get("u1").await.unwrap().is_none());
        assert!(store.get_latest("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn latest_put_wins_at_blob_level() {
        let (clock, store) = store_at(1_000);
        store.put("u1", "d1", "AAA", "h1").await.unwrap();
        clock.advance(10);
        store.put("u1", "d2", "BBB", "h2").await.unwrap();

        let record = store.get("u1").await.unwrap().unwrap();
        assert_eq!(record.device_id, "d2");
        assert_eq!(record.encrypted_data, "BBB");
        assert_eq!(record.last_modified, 1_010);
        assert_eq!(store.device_records("u1").await.len(), 2);
        assert_eq!(store.put_count(), 2);
    }

    #[tokio::test]
    async fn same_millisecond_puts_stay_ordered() {
        let (_, store) = store_at(1_000);
        store.put("u1", "d1", "AAA", "h1").await.unwrap();
        store.put("u1", "d2", "BBB", "h2").await.unwrap();
        let latest = store.get_latest("u1").await.unwrap().unwrap();
        assert_eq!(latest.last_modified, 1_001);
    }

    #[tokio::test]
    async fn offline_store_fails_with_transport_error() {
        let (_, store) = store_at(1_000);
        store.set_offline(true);
        assert!(matches!(
            store.get("u1").await,
            Err(SyncError::Transport(_))
        ));
        store.set_offline(false);
        assert!(store.get("u1").await.is_ok());
    }

    #[tokio::test]
    async fn device_registry_roundtrip() {
        let (_, store) = store_at(1_000);
        store.register_device("u1", "d1", "Chrome on macOS").await.unwrap();
        store.register_device("u1", "d2", "Firefox on Linux").await.unwrap();
        store.register_device("u1", "d1", "Chrome on macOS").await.unwrap();
        assert_eq!(store.list_devices("u1").await.unwrap().len(), 2);

        store.put("u1", "d2", "AAA", "h").await.unwrap();
        let removed = store.remove_device("u1", "d2").await.unwrap();
        assert!(removed.success);
        assert_eq!(removed.device_name.as_deref(), Some("Firefox on Linux"));

        // Revocation keeps the device's pushed data.
        assert_eq!(store.get("u1").await.unwrap().unwrap().device_id, "d2");

        let missing = store.remove_device("u1", "d2").await.unwrap();
        assert!(!missing.success);
        assert_eq!(missing.error.as_deref(), Some("Device not found"));
    }
}
