//! Sync engine configuration, loadable from TOML.

use crate::crypto::KdfParams;
use crate::merge::ProfileMergePolicy;
use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period after an ordinary local edit.
    pub debounce_ms: u64,
    /// Quiet period once a burst of edits is detected.
    pub burst_debounce_ms: u64,
    pub burst_window_ms: u64,
    /// Changes inside `burst_window_ms` that count as a burst.
    pub burst_threshold: usize,

    pub poll_interval_secs: u64,
    pub backup_interval_secs: u64,
    /// Backup pass only runs if the last successful sync is older than this.
    pub backup_staleness_secs: u64,

    pub protocol_version: u32,
    /// Refuse decrypted data whose hash does not match.
    pub verify_integrity: bool,
    pub profile_policy: ProfileMergePolicy,

    pub remote_url: Option<String>,
    pub request_timeout_secs: u64,
    pub api_token: Option<String>,

    pub kdf: KdfParams,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            burst_debounce_ms: 3_000,
            burst_window_ms: 5_000,
            burst_threshold: 3,
            poll_interval_secs: 30,
            backup_interval_secs: 300,
            backup_staleness_secs: 240,
            protocol_version: 1,
            verify_integrity: true,
            profile_policy: ProfileMergePolicy::default(),
            remote_url: None,
            request_timeout_secs: 30,
            api_token: None,
            kdf: KdfParams::default(),
        }
    }
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.burst_debounce_ms < self.debounce_ms {
            return Err(SyncError::Config(
                "burst_debounce_ms must not be shorter than debounce_ms".to_string(),
            ));
        }
        if self.burst_threshold == 0 {
            return Err(SyncError::Config("burst_threshold must be at least 1".to_string()));
        }
        if self.poll_interval_secs == 0 || self.backup_interval_secs == 0 {
            return Err(SyncError::Config("timer intervals must be non-zero".to_string()));
        }
        self.kdf
            .validate()
            .map_err(|e| SyncError::Config(e.to_string()))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn burst_debounce(&self) -> Duration {
        Duration::from_millis(self.burst_debounce_ms)
    }

    pub fn burst_window(&self) -> Duration {
        Duration::from_millis(self.burst_window_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backup_staleness_millis(&self) -> i64 {
        i64::try_from(self.backup_staleness_secs.saturating_mul(1_000)).unwrap_or(i64::MAX)
    }
}
