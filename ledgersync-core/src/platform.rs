//! Platform-specific paths and OS detection

use std::path::PathBuf;

const APP_DIR: &str = "LedgerSync";

/// Get the platform-specific data directory
///
/// Returns:
/// - Windows: %LOCALAPPDATA%\LedgerSync
/// - macOS: ~/Library/Application Support/LedgerSync
/// - Linux/Other: ~/.local/share/LedgerSync
pub fn get_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".data")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Get the platform-specific config directory
pub fn get_config_dir() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Default SQLite file for persisted sync settings
pub fn get_default_settings_path() -> PathBuf {
    get_data_dir().join("sync.db")
}

/// Default JSON file holding the local collections
pub fn get_default_data_path() -> PathBuf {
    get_data_dir().join("ledger.json")
}

/// Default TOML config file
pub fn get_default_config_path() -> PathBuf {
    get_config_dir().join("ledgersync.toml")
}

/// Ensure the data directory exists, creating it if necessary
pub fn ensure_data_dir() -> std::io::Result<PathBuf> {
    let dir = get_data_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Get current platform as a string
pub fn get_platform() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "ios") {
        "ios"
    } else if cfg!(target_os = "android") {
        "android"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unknown"
    }
}

/// OS family as shown in device names
pub fn os_display_name() -> &'static str {
    match get_platform() {
        "windows" => "Windows",
        "macos" => "macOS",
        "ios" => "iOS",
        "android" => "Android",
        "linux" => "Linux",
        _ => "Unknown OS",
    }
}
