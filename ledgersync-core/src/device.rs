//! Device Registry Client: this installation's stable descriptor and thin
//! pass-throughs to the remote device registry.

use crate::identity::Identity;
use crate::platform;
use crate::remote::{DeviceInfo, RemoteStore, RemoveDeviceResult};
use crate::settings::SettingsStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Identity a device uses to tag its pushes and appear in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub device_id: String,
    pub device_name: String,
}

pub struct DeviceRegistry {
    settings: Arc<dyn SettingsStore>,
    remote: Arc<dyn RemoteStore>,
    user_agent: Option<String>,
}

impl DeviceRegistry {
    pub fn new(settings: Arc<dyn SettingsStore>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            settings,
            remote,
            user_agent: None,
        }
    }

    /// Environment string used to name the device the first time.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Generated once (time-ordered UUID), then persisted.
    pub fn get_or_create_device_id(&self) -> Result<String> {
        let mut settings = self.settings.load()?;
        if let Some(id) = settings.device_id.as_ref().filter(|id| !id.is_empty()) {
            return Ok(id.clone());
        }

        let id = format!("device-{}", Uuid::now_v7());
        settings.device_id = Some(id.clone());
        self.settings.save(&settings)?;
        info!("Created device id {}", id);
        Ok(id)
    }

    /// Derived once from the environment, then never recomputed.
    pub fn get_or_create_device_name(&self) -> Result<String> {
        let mut settings = self.settings.load()?;
        if let Some(name) = settings.device_name.as_ref().filter(|n| !n.is_empty()) {
            return Ok(name.clone());
        }

        let name = self
            .user_agent
            .as_deref()
            .and_then(device_name_from_user_agent)
            .unwrap_or_else(native_device_name);
        settings.device_name = Some(name.clone());
        self.settings.save(&settings)?;
        Ok(name)
    }

    pub fn current_device(&self) -> Result<DeviceDescriptor> {
        Ok(DeviceDescriptor {
            device_id: self.get_or_create_device_id()?,
            device_name: self.get_or_create_device_name()?,
        })
    }

    pub async fn register_device(&self, identity: &Identity) -> Result<DeviceDescriptor> {
        let identity = identity.require_authenticated()?;
        let device = self.current_device()?;
        self.remote
            .register_device(&identity.user_id, &device.device_id, &device.device_name)
            .await?;
        Ok(device)
    }

    pub async fn list_devices(&self, identity: &Identity) -> Result<Vec<DeviceInfo>> {
        let identity = identity.require_authenticated()?;
        self.remote.list_devices(&identity.user_id).await
    }

    /// Revokes the device in the registry; data it pushed stays merged.
    pub async fn remove_device(
        &self,
        identity: &Identity,
        device_id: &str,
    ) -> Result<RemoveDeviceResult> {
        let identity = identity.require_authenticated()?;
        let result = self.remote.remove_device(&identity.user_id, device_id).await?;
        if result.success {
            info!("Removed device {}", device_id);
        }
        Ok(result)
    }
}

fn native_device_name() -> String {
    format!("LedgerSync on {}", platform::os_display_name())
}

/// Turn a browser user-agent string into e.g. "Chrome on macOS".
///
/// Returns `None` when neither browser nor OS is recognized.
pub fn device_name_from_user_agent(user_agent: &str) -> Option<String> {
    let browser = detect_browser(user_agent);
    let os = detect_os(user_agent);
    if browser.is_none() && os.is_none() {
        return None;
    }
    Some(format!(
        "{} on {}",
        browser.unwrap_or("Browser"),
        os.unwrap_or("Unknown OS")
    ))
}

fn detect_browser(ua: &str) -> Option<&'static str> {
    // Order matters: Edge and Opera also advertise Chrome, Chrome advertises Safari.
    if ua.contains("Edg/") || ua.contains("Edge/") || ua.contains("EdgiOS") {
        Some("Edge")
    } else if ua.contains("OPR/") || ua.contains("Opera") {
        Some("Opera")
    } else if ua.contains("Firefox/") || ua.contains("FxiOS") {
        Some("Firefox")
    } else if ua.contains("Chrome/") || ua.contains("CriOS") {
        Some("Chrome")
    } else if ua.contains("Safari/") {
        Some("Safari")
    } else {
        None
    }
}

fn detect_os(ua: &str) -> Option<&'static str> {
    if ua.contains("Windows") {
        Some("Windows")
    } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod") {
        Some("iOS")
    } else if ua.contains("Mac OS X") || ua.contains("Macintosh") {
        Some("macOS")
    } else if ua.contains("Android") {
        Some("Android")
    } else if ua.contains("CrOS") {
        Some("ChromeOS")
    } else if ua.contains("Linux") {
        Some("Linux")
    } else {
        None
    }
}
