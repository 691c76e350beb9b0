//! Per-collection merge strategies.
//!
//! Entity collections merge by id with last-writer-wins; the profile merges
//! field by field; the emergency fund keeps the larger amount.

use crate::merge::conflict::{ConflictResolver, Resolution};
use crate::snapshot::{SyncEntity, UserProfile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How the user profile is reconciled when both sides have one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileMergePolicy {
    /// Every field present remotely overwrites the local value.
    #[default]
    RemoteWins,
    /// Remote fields overwrite local ones only when the remote profile is
    /// strictly newer; otherwise local fields take precedence.
    NewestWins,
}

/// Union two collections by id.
///
/// The result starts as the local collection in its original order. Remote
/// entities missing locally are appended in the order they are met; remote
/// entities that are strictly newer replace the local entry in place.
pub fn merge_by_id<T: SyncEntity>(
    local: &[T],
    remote: &[T],
    change_log: &mut Vec<String>,
) -> Vec<T> {
    let mut merged = local.to_vec();
    let mut positions: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(position, entity)| (entity.id().to_string(), position))
        .collect();

    for remote_entity in remote {
        match positions.get(remote_entity.id()) {
            Some(&position) => {
                if ConflictResolver::resolve_entity(&merged[position], remote_entity)
                    == Resolution::AcceptRemote
                {
                    merged[position] = remote_entity.clone();
                    change_log.push(format!(
                        "Updated {}: {}",
                        T::KIND.label(),
                        remote_entity.describe()
                    ));
                }
            }
            None => {
                positions.insert(remote_entity.id().to_string(), merged.len());
                merged.push(remote_entity.clone());
                change_log.push(format!(
                    "Added {}: {}",
                    T::KIND.label(),
                    remote_entity.describe()
                ));
            }
        }
    }

    merged
}

/// Shallow field-wise merge of the user profile.
///
/// `lastModified` of the result is the larger of the two inputs.
pub fn merge_fieldwise(
    local: Option<&UserProfile>,
    remote: Option<&UserProfile>,
    policy: ProfileMergePolicy,
    change_log: &mut Vec<String>,
) -> Option<UserProfile> {
    let (local, remote) = match (local, remote) {
        (None, None) => return None,
        (Some(local), None) => return Some(local.clone()),
        (None, Some(remote)) => {
            change_log.push("Added user profile from remote".to_string());
            return Some(remote.clone());
        }
        (Some(local), Some(remote)) => (local, remote),
    };

    let remote_takes_precedence = match policy {
        ProfileMergePolicy::RemoteWins => true,
        ProfileMergePolicy::NewestWins => remote.last_modified() > local.last_modified(),
    };

    let (base, overlay) = if remote_takes_precedence {
        (local, remote)
    } else {
        (remote, local)
    };

    let mut merged = base.clone();
    for (field, value) in &overlay.fields {
        merged.fields.insert(field.clone(), value.clone());
    }
    if local.fields.contains_key(UserProfile::LAST_MODIFIED)
        || remote.fields.contains_key(UserProfile::LAST_MODIFIED)
    {
        merged.set_last_modified(local.last_modified().max(remote.last_modified()));
    }

    let mut changed: Vec<&str> = merged
        .fields
        .iter()
        .filter(|(field, _)| field.as_str() != UserProfile::LAST_MODIFIED)
        .filter(|(field, value)| local.fields.get(field.as_str()) != Some(*value))
        .map(|(field, _)| field.as_str())
        .collect();
    if !changed.is_empty() {
        changed.sort_unstable();
        change_log.push(format!("Updated user profile: {}", changed.join(", ")));
    }

    Some(merged)
}

/// Money already set aside is never forgotten: the larger amount wins.
pub fn merge_emergency_fund(local: f64, remote: f64, change_log: &mut Vec<String>) -> f64 {
    if remote > local {
        change_log.push(format!(
            "Updated emergency fund from remote: {:.2} -> {:.2}",
            local, remote
        ));
        remote
    } else if local > remote {
        change_log.push(format!(
            "Kept local emergency fund: {:.2} (remote had {:.2})",
            local, remote
        ));
        local
    } else {
        local
    }
}
