//! Local Store collaborator: the app's own copy of the entity collections.
//!
//! The engine reads the collections to build a snapshot and writes only
//! through [`LocalStore::import_data`].

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryLocalStore;

use crate::snapshot::{LocalCollections, Snapshot};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Current collections, built-in categories included.
    async fn collections(&self) -> Result<LocalCollections>;

    /// Replace the synced collections with `snapshot`.
    ///
    /// Returns `false` if the store rejected or failed to persist it; the
    /// previous local state must then remain intact.
    async fn import_data(&self, snapshot: &Snapshot) -> bool;
}
