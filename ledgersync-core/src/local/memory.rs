use crate::local::LocalStore;
use crate::snapshot::{split_snapshot, LocalCollections, Snapshot};
use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Collections held in memory.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    data: RwLock<LocalCollections>,
    reject_imports: AtomicBool,
    imports: AtomicUsize,
}

impl MemoryLocalStore {
    pub fn new(data: LocalCollections) -> Self {
        Self {
            data: RwLock::new(data),
            reject_imports: AtomicBool::new(false),
            imports: AtomicUsize::new(0),
        }
    }

    /// Make subsequent imports fail without touching the data.
    pub fn set_reject_imports(&self, reject: bool) {
        self.reject_imports.store(reject, Ordering::SeqCst);
    }

    /// Number of successful imports.
    pub fn import_count(&self) -> usize {
        self.imports.load(Ordering::SeqCst)
    }

    /// Apply a local edit, as the app would.
    pub async fn update(&self, edit: impl FnOnce(&mut LocalCollections)) {
        let mut data = self.data.write().await;
        edit(&mut data);
    }

    pub async fn snapshot_data(&self) -> LocalCollections {
        self.data.read().await.clone()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn collections(&self) -> Result<LocalCollections> {
        Ok(self.data.read().await.clone())
    }

    async fn import_data(&self, snapshot: &Snapshot) -> bool {
        if self.reject_imports.load(Ordering::SeqCst) {
            return false;
        }
        let mut data = self.data.write().await;
        *data = split_snapshot(snapshot.clone(), &data.categories);
        self.imports.fetch_add(1, Ordering::SeqCst);
        true
    }
}
