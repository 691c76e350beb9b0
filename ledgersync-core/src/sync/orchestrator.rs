//! Sync Orchestrator: owns the enable/disable lifecycle and runs pushes and
//! pulls, at most one at a time.
//!
//! Push: snapshot → encode → hash → encrypt → `put` → `update_metadata` →
//! `lastSyncTime`. Pull: `get_latest` → `get` → decrypt → verify → parse →
//! merge → import → `lastSyncTime`. Any failure aborts the attempt; the next
//! trigger retries.

use crate::crypto::{
    decrypt_from_base64, derive_key, derive_salt, encrypt_to_base64, integrity_hash,
    verify_integrity, SyncKey,
};
use crate::device::{DeviceDescriptor, DeviceRegistry};
use crate::identity::Identity;
use crate::local::LocalStore;
use crate::merge::merge_snapshots;
use crate::remote::{DeviceInfo, RemoteStore, RemoveDeviceResult, SyncMetadata};
use crate::settings::{SettingsStore, SyncSettings};
use crate::snapshot::{build_snapshot, encode_snapshot, parse_snapshot};
use crate::sync::clock::{Clock, SystemClock};
use crate::sync::config::SyncConfig;
use crate::sync::scheduler::SyncTriggers;
use crate::sync::state::{SyncOutcome, SyncPhase, SyncStatus};
use crate::{Result, SyncError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

const NO_REMOTE_DATA: &str = "No remote data to sync";

struct CachedKey {
    fingerprint: [u8; 32],
    salt: [u8; 32],
    key: SyncKey,
}

struct RunState {
    phase: SyncPhase,
    last_error: Option<String>,
}

/// Clears the in-flight flag when an operation ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SyncOrchestrator {
    config: SyncConfig,
    remote: Arc<dyn RemoteStore>,
    local: Arc<dyn LocalStore>,
    settings: Arc<dyn SettingsStore>,
    devices: DeviceRegistry,
    clock: Arc<dyn Clock>,
    identity: RwLock<Identity>,
    run_state: Mutex<RunState>,
    key_cache: Mutex<Option<CachedKey>>,
    syncing: AtomicBool,
    // Bumped on disable and sign-out. Work started under an older value
    // must not touch persisted state or local data.
    generation: AtomicU64,
    settings_lock: std::sync::Mutex<()>,
}

impl SyncOrchestrator {
    pub fn new(
        config: SyncConfig,
        identity: Identity,
        remote: Arc<dyn RemoteStore>,
        local: Arc<dyn LocalStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let devices = DeviceRegistry::new(settings.clone(), remote.clone());
        Self {
            config,
            remote,
            local,
            settings,
            devices,
            clock: Arc::new(SystemClock),
            identity: RwLock::new(identity),
            run_state: Mutex::new(RunState {
                phase: SyncPhase::Idle,
                last_error: None,
            }),
            key_cache: Mutex::new(None),
            syncing: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            settings_lock: std::sync::Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Environment string used to name this device on first use.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.devices = DeviceRegistry::new(self.settings.clone(), self.remote.clone())
            .with_user_agent(user_agent);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn identity(&self) -> Identity {
        self.identity.read().await.clone()
    }

    /// Replace the signed-in identity. A different user or email drops the
    /// cached key, since the salt changes with it.
    pub async fn set_identity(&self, identity: Identity) {
        let mut current = self.identity.write().await;
        if current.user_id != identity.user_id || current.user_email != identity.user_email {
            *self.key_cache.lock().await = None;
        }
        *current = identity;
    }

    /// Sign-out: forget the identity, the key and every persisted value,
    /// device descriptor included.
    pub async fn sign_out(&self) -> Result<()> {
        self.with_settings_lock(|| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.settings.clear_all()
        })?;
        *self.key_cache.lock().await = None;
        *self.identity.write().await = Identity::default();
        self.reset_run_state().await;
        info!("Signed out, sync state cleared");
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.settings
            .load()
            .map(|settings| settings.sync_enabled)
            .unwrap_or(false)
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    pub fn last_sync_time(&self) -> Option<i64> {
        self.settings
            .load()
            .ok()
            .and_then(|settings| settings.last_sync_time)
    }

    pub async fn status(&self) -> SyncStatus {
        let settings = match self.settings.load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Cannot read sync settings: {}", e);
                SyncSettings::default()
            }
        };
        let run = self.run_state.lock().await;
        let is_syncing = self.is_syncing();
        let phase = if !is_syncing && !settings.sync_enabled {
            SyncPhase::Disabled
        } else {
            run.phase
        };

        SyncStatus {
            is_enabled: settings.sync_enabled,
            is_syncing,
            phase,
            last_sync_time: settings.last_sync_time,
            error: run.last_error.clone(),
        }
    }

    /// Register this device and push once; only a successful push flips
    /// the persisted enabled flag.
    pub async fn enable_sync(&self, passphrase: Option<&str>) -> SyncOutcome {
        let Some(_in_flight) = self.begin(SyncPhase::Pushing).await else {
            return SyncOutcome::busy();
        };
        let generation = self.generation.load(Ordering::SeqCst);
        let result = self.enable_inner(passphrase, generation).await;
        self.finish("enable", result).await
    }

    /// Clears persisted sync state immediately. An operation in flight is
    /// not awaited; its result is discarded when it lands.
    pub async fn disable_sync(&self) -> SyncOutcome {
        let result = self.with_settings_lock(|| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.settings.clear_sync_state()
        });
        *self.key_cache.lock().await = None;

        match result {
            Ok(()) => {
                self.reset_run_state().await;
                info!("Sync disabled");
                SyncOutcome::ok("Sync disabled")
            }
            Err(e) => {
                warn!("Failed to clear sync state: {}", e);
                e.into()
            }
        }
    }

    /// Push the local snapshot. Without a passphrase the cached key is used.
    pub async fn sync_to_remote(&self, passphrase: Option<&str>) -> SyncOutcome {
        let Some(_in_flight) = self.begin(SyncPhase::Pushing).await else {
            debug!("Push dropped: sync already in progress");
            return SyncOutcome::busy();
        };
        let generation = self.generation.load(Ordering::SeqCst);
        let result = self.push_inner(passphrase, generation).await;
        self.finish("push", result).await
    }

    /// Pull the remote snapshot and merge it into local data.
    pub async fn sync_from_remote(&self, passphrase: Option<&str>) -> SyncOutcome {
        let Some(_in_flight) = self.begin(SyncPhase::Pulling).await else {
            debug!("Pull dropped: sync already in progress");
            return SyncOutcome::busy();
        };
        let generation = self.generation.load(Ordering::SeqCst);
        let result = self.pull_inner(passphrase, generation).await;
        self.finish("pull", result).await
    }

    /// Derive and cache the key ahead of background syncs.
    pub async fn unlock(&self, passphrase: &str) -> Result<()> {
        let identity = self.current_identity().await?;
        self.resolve_key(&identity, Some(passphrase)).await.map(|_| ())
    }

    pub fn get_current_device(&self) -> Result<DeviceDescriptor> {
        self.devices.current_device()
    }

    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        let identity = self.identity().await;
        self.devices.list_devices(&identity).await
    }

    pub async fn remove_device(&self, device_id: &str) -> Result<RemoveDeviceResult> {
        let identity = self.identity().await;
        self.devices.remove_device(&identity, device_id).await
    }

    /// Push triggered by local edits. `None` when sync is off.
    pub async fn push_local_changes(&self) -> Option<SyncOutcome> {
        if !self.is_enabled() {
            debug!("Local change ignored: sync disabled");
            return None;
        }
        Some(self.sync_to_remote(None).await)
    }

    /// Pull only if the remote moved past our last successful sync.
    pub async fn pull_if_remote_newer(&self) -> Option<SyncOutcome> {
        if !self.is_enabled() || self.is_syncing() {
            return None;
        }
        match self.remote_is_newer().await {
            Ok(true) => Some(self.sync_from_remote(None).await),
            Ok(false) => None,
            Err(e) => {
                warn!("Freshness check failed: {}", e);
                None
            }
        }
    }

    /// Safety-net pass: pull then push, only if nothing synced recently.
    pub async fn backup_if_stale(&self) -> Option<SyncOutcome> {
        if !self.is_enabled() || self.is_syncing() {
            return None;
        }
        let now = self.clock.now_millis();
        let stale = match self.last_sync_time() {
            Some(last) => now.saturating_sub(last) > self.config.backup_staleness_millis(),
            None => true,
        };
        if !stale {
            return None;
        }

        info!("No recent sync, running backup pass");
        let pulled = self.sync_from_remote(None).await;
        if !pulled.success {
            return Some(pulled);
        }
        Some(self.sync_to_remote(None).await)
    }

    async fn enable_inner(&self, passphrase: Option<&str>, generation: u64) -> Result<String> {
        let identity = self.current_identity().await?;
        let device = self.devices.register_device(&identity).await?;
        info!("Enabling sync on {}", device.device_name);

        let pushed_at = self.push_snapshot(&identity, passphrase, &device).await?;
        self.commit(generation, |settings| {
            settings.sync_enabled = true;
            settings.last_sync_time = Some(pushed_at);
        })?;
        Ok("Sync enabled".to_string())
    }

    async fn push_inner(&self, passphrase: Option<&str>, generation: u64) -> Result<String> {
        self.require_enabled()?;
        let identity = self.current_identity().await?;
        let device = self.devices.current_device()?;

        let pushed_at = self.push_snapshot(&identity, passphrase, &device).await?;
        self.commit(generation, |settings| settings.last_sync_time = Some(pushed_at))?;
        Ok("Local data pushed".to_string())
    }

    async fn push_snapshot(
        &self,
        identity: &Identity,
        passphrase: Option<&str>,
        device: &DeviceDescriptor,
    ) -> Result<i64> {
        let key = self.resolve_key(identity, passphrase).await?;

        let collections = self.local.collections().await?;
        let snapshot = build_snapshot(&collections, self.clock.now_millis());
        let plaintext = Zeroizing::new(encode_snapshot(&snapshot)?);
        let data_hash = integrity_hash(&plaintext);
        let encrypted = encrypt_to_base64(&key, &plaintext)?;

        self.remote
            .put(&identity.user_id, &device.device_id, &encrypted, &data_hash)
            .await?;

        let now = self.clock.now_millis();
        let metadata = SyncMetadata {
            device_id: device.device_id.clone(),
            protocol_version: self.config.protocol_version,
            last_sync: now,
        };
        self.remote
            .update_metadata(&identity.user_id, &metadata)
            .await?;

        info!("Pushed snapshot with {} entities", snapshot.entity_count());
        Ok(now)
    }

    async fn pull_inner(&self, passphrase: Option<&str>, generation: u64) -> Result<String> {
        self.require_enabled()?;
        let identity = self.current_identity().await?;

        if self.remote.get_latest(&identity.user_id).await?.is_none() {
            info!("{}", NO_REMOTE_DATA);
            return Ok(NO_REMOTE_DATA.to_string());
        }
        let Some(record) = self.remote.get(&identity.user_id).await? else {
            info!("{}", NO_REMOTE_DATA);
            return Ok(NO_REMOTE_DATA.to_string());
        };

        let key = self.resolve_key(&identity, passphrase).await?;
        let plaintext = Zeroizing::new(decrypt_from_base64(&key, &record.encrypted_data)?);
        if self.config.verify_integrity && !verify_integrity(&plaintext, &record.data_hash) {
            return Err(SyncError::IntegrityMismatch);
        }
        let remote_snapshot = parse_snapshot(&plaintext)?;

        let local_snapshot =
            build_snapshot(&self.local.collections().await?, self.clock.now_millis());
        let merged = merge_snapshots(&local_snapshot, &remote_snapshot, self.config.profile_policy);
        let changes = merged.change_log.len();
        info!(
            "Merged snapshot from {}: {} remote entities, {} changes",
            record.device_id,
            remote_snapshot.entity_count(),
            changes
        );

        self.ensure_current(generation)?;
        if merged.snapshot.same_content(&local_snapshot) {
            debug!("Local data already matches the merge, import skipped");
        } else if !self.local.import_data(&merged.snapshot).await {
            return Err(SyncError::Import(
                "local store rejected the merged snapshot".to_string(),
            ));
        }

        let now = self.clock.now_millis();
        self.commit(generation, |settings| settings.last_sync_time = Some(now))?;

        Ok(if merged.has_changes() {
            format!("Merged {} changes from remote", changes)
        } else {
            "Already up to date".to_string()
        })
    }

    async fn remote_is_newer(&self) -> Result<bool> {
        let identity = self.current_identity().await?;
        let Some(latest) = self.remote.get_latest(&identity.user_id).await? else {
            return Ok(false);
        };
        Ok(match self.last_sync_time() {
            Some(last) => latest.last_modified > last,
            None => true,
        })
    }

    async fn current_identity(&self) -> Result<Identity> {
        let identity = self.identity.read().await;
        identity.require_authenticated().cloned()
    }

    async fn resolve_key(&self, identity: &Identity, passphrase: Option<&str>) -> Result<SyncKey> {
        let salt = derive_salt(&identity.user_id, &identity.user_email);

        let Some(passphrase) = passphrase else {
            return self
                .key_cache
                .lock()
                .await
                .as_ref()
                .filter(|cached| cached.salt == salt)
                .map(|cached| cached.key.clone())
                .ok_or(SyncError::PassphraseRequired);
        };

        let fingerprint = key_fingerprint(passphrase.as_bytes(), &salt);
        if let Some(cached) = self
            .key_cache
            .lock()
            .await
            .as_ref()
            .filter(|c| c.fingerprint == fingerprint)
        {
            return Ok(cached.key.clone());
        }

        // The cache stays unlocked while Argon2 runs.
        debug!("Deriving sync key");
        let generation = self.generation.load(Ordering::SeqCst);
        let secret = Zeroizing::new(passphrase.as_bytes().to_vec());
        let params = self.config.kdf.clone();
        let key = tokio::task::spawn_blocking(move || derive_key(&secret, &salt, &params))
            .await
            .map_err(|e| SyncError::Encryption(format!("Key derivation task failed: {}", e)))??;

        // A disable during derivation leaves the cache empty. Disable bumps
        // the generation before it clears the cache.
        let mut cache = self.key_cache.lock().await;
        if self.generation.load(Ordering::SeqCst) == generation {
            *cache = Some(CachedKey {
                fingerprint,
                salt,
                key: key.clone(),
            });
        }
        Ok(key)
    }

    fn require_enabled(&self) -> Result<()> {
        if self.settings.load()?.sync_enabled {
            Ok(())
        } else {
            Err(SyncError::NotEnabled)
        }
    }

    fn ensure_current(&self, generation: u64) -> Result<()> {
        if self.generation.load(Ordering::SeqCst) == generation {
            Ok(())
        } else {
            Err(SyncError::Cancelled)
        }
    }

    /// Apply `update` to persisted settings unless a disable intervened.
    fn commit(&self, generation: u64, update: impl FnOnce(&mut SyncSettings)) -> Result<()> {
        self.with_settings_lock(|| {
            self.ensure_current(generation)?;
            let mut settings = self.settings.load()?;
            update(&mut settings);
            self.settings.save(&settings)
        })
    }

    fn with_settings_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self
            .settings_lock
            .lock()
            .map_err(|_| SyncError::Storage("settings lock poisoned".to_string()))?;
        f()
    }

    async fn begin(&self, phase: SyncPhase) -> Option<InFlight<'_>> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let guard = InFlight(&self.syncing);
        let mut run = self.run_state.lock().await;
        run.phase = phase;
        run.last_error = None;
        Some(guard)
    }

    async fn finish(&self, operation: &str, result: Result<String>) -> SyncOutcome {
        let mut run = self.run_state.lock().await;
        match result {
            Ok(message) => {
                debug!("{} finished: {}", operation, message);
                run.phase = SyncPhase::Idle;
                run.last_error = None;
                SyncOutcome::ok(message)
            }
            Err(SyncError::Cancelled) => {
                info!("{} result discarded: sync was disabled", operation);
                run.phase = SyncPhase::Idle;
                run.last_error = None;
                SyncError::Cancelled.into()
            }
            Err(e) => {
                warn!("{} failed: {}", operation, e);
                run.phase = SyncPhase::Error;
                run.last_error = Some(e.to_string());
                e.into()
            }
        }
    }

    async fn reset_run_state(&self) {
        let mut run = self.run_state.lock().await;
        if !run.phase.is_syncing() {
            run.phase = SyncPhase::Idle;
        }
        run.last_error = None;
    }
}

fn key_fingerprint(passphrase: &[u8], salt: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"ledgersync-key-cache");
    hasher.update(salt);
    hasher.update(passphrase);
    hasher.finalize().into()
}

#[async_trait]
impl SyncTriggers for SyncOrchestrator {
    async fn on_local_change(&self) {
        if let Some(outcome) = self.push_local_changes().await {
            if !outcome.success {
                debug!("Debounced push did not complete: {:?}", outcome.error);
            }
        }
    }

    async fn on_poll_tick(&self) {
        self.pull_if_remote_newer().await;
    }

    async fn on_backup_tick(&self) {
        self.backup_if_stale().await;
    }
}
