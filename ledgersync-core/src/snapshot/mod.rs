//! Snapshot Codec: the bundle of synced collections and its JSON encoding.

pub mod codec;
pub mod models;

pub use codec::{build_snapshot, encode_snapshot, parse_snapshot, split_snapshot, LocalCollections};
pub use models::{
    Budget, Category, CreditAccount, DebtAccount, EntityKind, Goal, Snapshot, SyncEntity,
    TimeValue, Transaction, UserProfile,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Snapshot is missing required key '{0}'")]
    MissingKey(&'static str),

    #[error("Snapshot has an invalid shape: {0}")]
    InvalidShape(String),

    #[error("Snapshot serialization failed: {0}")]
    Serialization(String),
}
