//! Persisted sync state for one installation.
//!
//! Only four values are durable: the enabled flag, the last successful sync
//! time, and the device descriptor.

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    pub sync_enabled: bool,
    /// Epoch millis of the last successful push or pull.
    pub last_sync_time: Option<i64>,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
}

/// Durable home of [`SyncSettings`].
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<SyncSettings>;

    fn save(&self, settings: &SyncSettings) -> Result<()>;

    /// Disable: drop the enabled flag and last sync time, keep the device.
    fn clear_sync_state(&self) -> Result<()> {
        let mut settings = self.load()?;
        settings.sync_enabled = false;
        settings.last_sync_time = None;
        self.save(&settings)
    }

    /// Sign-out: forget everything, device descriptor included.
    fn clear_all(&self) -> Result<()> {
        self.save(&SyncSettings::default())
    }
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS sync_settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    sync_enabled INTEGER NOT NULL DEFAULT 0,
    last_sync_time INTEGER,
    device_id TEXT,
    device_name TEXT
)";

/// Single-row SQLite table.
pub struct SqliteSettingsStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteSettingsStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SyncError::Storage(e.to_string()))?;
            }
        }
        Self::from_connection(rusqlite::Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(rusqlite::Connection::open_in_memory()?)
    }

    fn from_connection(conn: rusqlite::Connection) -> Result<Self> {
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| SyncError::Storage("settings connection poisoned".to_string()))?;
        f(&conn)
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn load(&self) -> Result<SyncSettings> {
        self.with_conn(|conn| {
            let result = conn.query_row(
                "SELECT sync_enabled, last_sync_time, device_id, device_name
                 FROM sync_settings WHERE id = 1",
                [],
                |row| {
                    Ok(SyncSettings {
                        sync_enabled: row.get(0)?,
                        last_sync_time: row.get(1)?,
                        device_id: row.get(2)?,
                        device_name: row.get(3)?,
                    })
                },
            );

            match result {
                Ok(settings) => Ok(settings),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(SyncSettings::default()),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn save(&self, settings: &SyncSettings) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sync_settings (id, sync_enabled, last_sync_time, device_id, device_name)
                 VALUES (1, ?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    sync_enabled = excluded.sync_enabled,
                    last_sync_time = excluded.last_sync_time,
                    device_id = excluded.device_id,
                    device_name = excluded.device_name",
                rusqlite::params![
                    settings.sync_enabled,
                    settings.last_sync_time,
                    settings.device_id,
                    settings.device_name,
                ],
            )?;
            Ok(())
        })
    }
}

/// Non-durable store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    inner: Mutex<SyncSettings>,
}

impl MemorySettingsStore {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            inner: Mutex::new(settings),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<SyncSettings> {
        self.inner
            .lock()
            .map(|settings| settings.clone())
            .map_err(|_| SyncError::Storage("settings lock poisoned".to_string()))
    }

    fn save(&self, settings: &SyncSettings) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| SyncError::Storage("settings lock poisoned".to_string()))?;
        *inner = settings.clone();
        Ok(())
    }
}
