//! Last-Write-Wins conflict resolution.

use crate::snapshot::SyncEntity;

/// Conflict resolution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Accept the remote entity (remote is newer).
    AcceptRemote,
    /// Keep the local entity (local is newer or equal).
    KeepLocal,
}

pub struct ConflictResolver;

impl ConflictResolver {
    /// Resolve a conflict between two resolved timestamps.
    ///
    /// Remote wins only when strictly newer; ties keep local.
    pub fn resolve(local_timestamp: i64, remote_timestamp: i64) -> Resolution {
        if remote_timestamp > local_timestamp {
            Resolution::AcceptRemote
        } else {
            Resolution::KeepLocal
        }
    }

    /// Resolve between two versions of the same entity.
    pub fn resolve_entity<T: SyncEntity>(local: &T, remote: &T) -> Resolution {
        Self::resolve(local.resolved_timestamp(), remote.resolved_timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Budget, TimeValue};
    use serde_json::Map;

    fn budget(last_modified: Option<i64>, created_at: Option<i64>) -> Budget {
        Budget {
            id: "b1".to_string(),
            category: "Groceries".to_string(),
            amount: Some(400.0),
            period: None,
            created_at: created_at.map(TimeValue::from),
            last_modified,
            extra: Map::new(),
        }
    }

    #[test]
    fn newer_remote_wins() {
        assert_eq!(ConflictResolver::resolve(1000, 2000), Resolution::AcceptRemote);
    }

    #[test]
    fn older_remote_loses() {
        assert_eq!(ConflictResolver::resolve(2000, 1000), Resolution::KeepLocal);
    }

    #[test]
    fn equal_timestamps_keep_local() {
        assert_eq!(ConflictResolver::resolve(1000, 1000), Resolution::KeepLocal);
    }

    #[test]
    fn entity_resolution_uses_fallback_timestamp() {
        let local = budget(None, Some(500));
        let remote = budget(None, Some(700));
        assert_eq!(
            ConflictResolver::resolve_entity(&local, &remote),
            Resolution::AcceptRemote
        );
    }

    #[test]
    fn missing_timestamps_never_replace_local() {
        let local = budget(None, None);
        let remote = budget(None, None);
        assert_eq!(
            ConflictResolver::resolve_entity(&local, &remote),
            Resolution::KeepLocal
        );
    }
}
