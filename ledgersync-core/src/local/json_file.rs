//! Local collections persisted as one JSON document.

use crate::local::LocalStore;
use crate::snapshot::{split_snapshot, LocalCollections, Snapshot};
use crate::{Result, SyncError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const ABSENT: &str = "absent";

fn digest(raw: Option<&[u8]>) -> String {
    raw.map(|bytes| hex::encode(Sha256::digest(bytes)))
        .unwrap_or_else(|| ABSENT.to_string())
}

/// Local collections in a JSON file the app also writes.
///
/// An import is refused when the file changed after the last
/// [`LocalStore::collections`] read, since the merge was built from the
/// older contents.
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
    // Digest of the file as last read by `collections` or written by an import.
    seen: Mutex<Option<String>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            seen: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_raw(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No data file at {}, starting empty", self.path.display());
                Ok(None)
            }
            Err(e) => Err(SyncError::Storage(e.to_string())),
        }
    }

    fn decode(&self, raw: Option<&[u8]>) -> Result<LocalCollections> {
        match raw {
            Some(bytes) => serde_json::from_slice(bytes).map_err(|e| {
                SyncError::Storage(format!("Invalid data file {}: {}", self.path.display(), e))
            }),
            None => Ok(LocalCollections::default()),
        }
    }

    /// Write the whole document through a sibling temp file and rename.
    pub async fn write(&self, data: &LocalCollections) -> Result<()> {
        self.write_bytes(data).await.map(|_| ())
    }

    async fn write_bytes(&self, data: &LocalCollections) -> Result<Vec<u8>> {
        let bytes =
            serde_json::to_vec_pretty(data).map_err(|e| SyncError::Storage(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SyncError::Storage(e.to_string()))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(bytes)
    }
}

#[async_trait]
impl LocalStore for JsonFileStore {
    async fn collections(&self) -> Result<LocalCollections> {
        let raw = self.read_raw().await?;
        let data = self.decode(raw.as_deref())?;
        *self.seen.lock().await = Some(digest(raw.as_deref()));
        Ok(data)
    }

    async fn import_data(&self, snapshot: &Snapshot) -> bool {
        let _guard = self.write_lock.lock().await;

        let raw = match self.read_raw().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Import aborted, cannot read local data: {}", e);
                return false;
            }
        };
        if let Some(seen) = self.seen.lock().await.as_deref() {
            if seen != digest(raw.as_deref()) {
                warn!(
                    "Import refused: {} changed after it was read",
                    self.path.display()
                );
                return false;
            }
        }
        let current = match self.decode(raw.as_deref()) {
            Ok(current) => current,
            Err(e) => {
                warn!("Import aborted, cannot read local data: {}", e);
                return false;
            }
        };

        let merged = split_snapshot(snapshot.clone(), &current.categories);
        if merged == current {
            debug!("Import matches stored data, file left untouched");
            return true;
        }
        match self.write_bytes(&merged).await {
            Ok(bytes) => {
                *self.seen.lock().await = Some(digest(Some(&bytes)));
                true
            }
            Err(e) => {
                warn!("Import failed to persist: {}", e);
                false
            }
        }
    }
}
