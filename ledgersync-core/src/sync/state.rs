//! Observable orchestrator state and per-call results.

use crate::SyncError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Disabled,
    Idle,
    Pushing,
    Pulling,
    /// Last attempt failed. Cleared by the next trigger.
    Error,
}

impl SyncPhase {
    pub fn is_syncing(&self) -> bool {
        matches!(self, Self::Pushing | Self::Pulling)
    }
}

/// What the UI shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_enabled: bool,
    pub is_syncing: bool,
    pub phase: SyncPhase,
    pub last_sync_time: Option<i64>,
    pub error: Option<String>,
}

/// Result of one engine entry point. Never an `Err` past the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SyncOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            message: Some(message.into()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            message: None,
        }
    }

    pub(crate) fn busy() -> Self {
        Self::failed("Sync already in progress")
    }
}

impl From<SyncError> for SyncOutcome {
    fn from(e: SyncError) -> Self {
        Self::failed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_camel_case_without_nulls() {
        let json = serde_json::to_value(SyncOutcome::ok("No remote data to sync")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"success": true, "message": "No remote data to sync"})
        );
    }

    #[test]
    fn errors_become_failed_outcomes() {
        let outcome = SyncOutcome::from(SyncError::AuthenticationRequired);
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("Authentication required"));
    }

    #[test]
    fn only_push_and_pull_count_as_syncing() {
        assert!(SyncPhase::Pushing.is_syncing());
        assert!(SyncPhase::Pulling.is_syncing());
        assert!(!SyncPhase::Error.is_syncing());
        assert!(!SyncPhase::Idle.is_syncing());
    }
}
