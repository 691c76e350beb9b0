//! LedgerSync Daemon
//!
//! Keeps one device in sync in the background: pushes after local edits,
//! polls for other devices' changes and runs the backup pass.

use anyhow::{Context, Result};
use clap::Parser;
use ledgersync_core::local::JsonFileStore;
use ledgersync_core::remote::HttpRemoteStore;
use ledgersync_core::settings::SqliteSettingsStore;
use ledgersync_core::{platform, Identity, SyncConfig, SyncOrchestrator, SyncScheduler};
use rpassword::prompt_password;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const WATCH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "ledgersync-daemon", about = "LedgerSync background sync daemon")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Blob server base URL override
    #[arg(long)]
    remote_url: Option<String>,

    /// Local data file to watch and import into
    #[arg(long)]
    data: Option<PathBuf>,

    /// Sync settings database override
    #[arg(long)]
    settings_db: Option<PathBuf>,

    #[arg(long, env = "LEDGERSYNC_USER_ID")]
    user_id: String,

    #[arg(long, env = "LEDGERSYNC_EMAIL")]
    email: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    info!("Starting LedgerSync daemon v{}", VERSION);
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(platform::get_default_config_path);
    let mut config = if config_path.exists() {
        SyncConfig::load(&config_path)
            .with_context(|| format!("Loading {}", config_path.display()))?
    } else {
        info!("No config file found, using defaults");
        SyncConfig::default()
    };
    if let Some(url) = cli.remote_url.clone() {
        config.remote_url = Some(url);
    }

    let url = config
        .remote_url
        .clone()
        .context("No remote_url configured; set it in the config file or pass --remote-url")?;
    let remote = HttpRemoteStore::new(&url, config.request_timeout(), config.api_token.clone())?;

    platform::ensure_data_dir()?;
    let data_path = cli.data.clone().unwrap_or_else(platform::get_default_data_path);
    let settings_path = cli
        .settings_db
        .clone()
        .unwrap_or_else(platform::get_default_settings_path);
    let settings = SqliteSettingsStore::open(&settings_path)
        .with_context(|| format!("Opening {}", settings_path.display()))?;

    let orchestrator = Arc::new(SyncOrchestrator::new(
        config.clone(),
        Identity::signed_in(cli.user_id, cli.email),
        Arc::new(remote),
        Arc::new(JsonFileStore::new(data_path.clone())),
        Arc::new(settings),
    ));

    if !orchestrator.is_enabled() {
        error!("Sync is not enabled for this device. Enable it with: ledgersync enable");
        return Ok(());
    }

    let passphrase = Zeroizing::new(prompt_password("Sync passphrase: ")?);
    orchestrator
        .unlock(&passphrase)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to derive sync key: {}", e))?;
    drop(passphrase);

    let initial = orchestrator.sync_from_remote(None).await;
    if !initial.success {
        warn!("Initial pull failed: {}", initial.error.unwrap_or_default());
    }

    let scheduler = SyncScheduler::spawn(orchestrator.clone(), &config);
    info!("Watching {} for changes. Press Ctrl+C to exit.", data_path.display());

    let mut last_stamp = modified_at(&data_path).await;
    let mut watch = tokio::time::interval(WATCH_INTERVAL);
    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                info!("Received shutdown signal");
                break;
            }
            _ = watch.tick() => {
                let stamp = modified_at(&data_path).await;
                if stamp != last_stamp {
                    last_stamp = stamp;
                    scheduler.notify_local_change();
                }
            }
        }
    }

    scheduler.shutdown().await;
    Ok(())
}

async fn modified_at(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path)
        .await
        .and_then(|meta| meta.modified())
        .ok()
}
