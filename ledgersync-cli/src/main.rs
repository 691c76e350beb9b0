//! LedgerSync CLI
//!
//! One-shot sync commands against the configured blob server, plus an
//! offline merge preview.

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use ledgersync_core::local::JsonFileStore;
use ledgersync_core::remote::HttpRemoteStore;
use ledgersync_core::settings::{SettingsStore, SqliteSettingsStore};
use ledgersync_core::snapshot::{encode_snapshot, parse_snapshot};
use ledgersync_core::{
    merge_snapshots, platform, Identity, ProfileMergePolicy, SyncConfig, SyncOrchestrator,
    SyncOutcome,
};
use rpassword::prompt_password;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

const PASSPHRASE_ENV: &str = "LEDGERSYNC_PASSPHRASE";

#[derive(Parser)]
#[command(name = "ledgersync", version)]
#[command(about = "End-to-end encrypted sync for LedgerSync data", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Blob server base URL override
    #[arg(long, global = true)]
    remote_url: Option<String>,

    /// Local data file override
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Sync settings database override
    #[arg(long, global = true)]
    settings_db: Option<PathBuf>,

    /// Signed-in user id
    #[arg(long, env = "LEDGERSYNC_USER_ID", global = true)]
    user_id: Option<String>,

    /// Signed-in user email
    #[arg(long, env = "LEDGERSYNC_EMAIL", global = true)]
    email: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show persisted sync state
    Status,

    /// Register this device, push once, then turn sync on
    Enable,

    /// Turn sync off and clear sync state
    Disable,

    /// Push local data to the server
    Push,

    /// Pull and merge remote data
    Pull,

    /// Manage registered devices
    Devices {
        #[command(subcommand)]
        action: DeviceCommands,
    },

    /// Merge two snapshot files offline and print the change log
    Merge {
        /// Local snapshot JSON
        local: PathBuf,

        /// Remote snapshot JSON
        remote: PathBuf,

        /// Write the merged snapshot here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Profile merge policy override (remote-wins or newest-wins)
        #[arg(long)]
        profile_policy: Option<String>,
    },
}

#[derive(Subcommand)]
enum DeviceCommands {
    /// List devices registered for this user
    List,

    /// Revoke a device
    Remove {
        /// Device id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Status => {
            let settings = open_settings(&cli)?.load()?;
            println!("Sync enabled: {}", settings.sync_enabled);
            println!(
                "Last sync:    {}",
                settings
                    .last_sync_time
                    .map(format_millis)
                    .unwrap_or_else(|| "never".to_string())
            );
            println!(
                "Device:       {} ({})",
                settings.device_name.as_deref().unwrap_or("-"),
                settings.device_id.as_deref().unwrap_or("not registered")
            );
        }
        Commands::Enable => {
            let orchestrator = build_orchestrator(&cli, &config)?;
            let passphrase = read_passphrase()?;
            report(orchestrator.enable_sync(Some(passphrase.as_str())).await)?;
        }
        Commands::Disable => {
            let orchestrator = build_orchestrator(&cli, &config)?;
            report(orchestrator.disable_sync().await)?;
        }
        Commands::Push => {
            let orchestrator = build_orchestrator(&cli, &config)?;
            let passphrase = read_passphrase()?;
            report(orchestrator.sync_to_remote(Some(passphrase.as_str())).await)?;
        }
        Commands::Pull => {
            let orchestrator = build_orchestrator(&cli, &config)?;
            let passphrase = read_passphrase()?;
            report(orchestrator.sync_from_remote(Some(passphrase.as_str())).await)?;
        }
        Commands::Devices { action } => {
            let orchestrator = build_orchestrator(&cli, &config)?;
            match action {
                DeviceCommands::List => {
                    let current = orchestrator.get_current_device()?;
                    let devices = orchestrator.list_devices().await?;
                    if devices.is_empty() {
                        println!("No devices registered");
                    }
                    for device in devices {
                        let marker = if device.device_id == current.device_id {
                            "*"
                        } else {
                            " "
                        };
                        println!(
                            "{} {}  {}  last seen {}",
                            marker,
                            device.device_id,
                            device.device_name,
                            format_millis(device.last_seen)
                        );
                    }
                }
                DeviceCommands::Remove { id } => {
                    let result = orchestrator.remove_device(id).await?;
                    if !result.success {
                        bail!(
                            "Could not remove {}: {}",
                            id,
                            result.error.unwrap_or_else(|| "unknown error".to_string())
                        );
                    }
                    println!(
                        "Removed {}",
                        result.device_name.unwrap_or_else(|| id.clone())
                    );
                }
            }
        }
        Commands::Merge {
            local,
            remote,
            output,
            profile_policy,
        } => {
            let policy = match profile_policy.as_deref() {
                None => config.profile_policy,
                Some("remote-wins") => ProfileMergePolicy::RemoteWins,
                Some("newest-wins") => ProfileMergePolicy::NewestWins,
                Some(other) => bail!("Unknown profile policy '{}'", other),
            };
            merge_files(local, remote, output.as_deref(), policy)?;
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<SyncConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(platform::get_default_config_path);

    let mut config = if path.exists() {
        SyncConfig::load(&path).with_context(|| format!("Loading {}", path.display()))?
    } else {
        info!("No config file at {}, using defaults", path.display());
        SyncConfig::default()
    };

    if let Some(url) = &cli.remote_url {
        config.remote_url = Some(url.clone());
    }
    Ok(config)
}

fn open_settings(cli: &Cli) -> Result<SqliteSettingsStore> {
    let path = cli
        .settings_db
        .clone()
        .unwrap_or_else(platform::get_default_settings_path);
    SqliteSettingsStore::open(&path).with_context(|| format!("Opening {}", path.display()))
}

fn identity(cli: &Cli) -> Result<Identity> {
    match (&cli.user_id, &cli.email) {
        (Some(user_id), Some(email)) => Ok(Identity::signed_in(user_id, email)),
        _ => bail!("Sign in first: pass --user-id and --email (or LEDGERSYNC_USER_ID / LEDGERSYNC_EMAIL)"),
    }
}

fn build_orchestrator(cli: &Cli, config: &SyncConfig) -> Result<SyncOrchestrator> {
    let url = config
        .remote_url
        .as_deref()
        .context("No remote_url configured; set it in the config file or pass --remote-url")?;
    let remote = HttpRemoteStore::new(url, config.request_timeout(), config.api_token.clone())?;

    let data_path = cli
        .data
        .clone()
        .unwrap_or_else(platform::get_default_data_path);
    let local = JsonFileStore::new(data_path);

    Ok(SyncOrchestrator::new(
        config.clone(),
        identity(cli)?,
        Arc::new(remote),
        Arc::new(local),
        Arc::new(open_settings(cli)?),
    ))
}

fn read_passphrase() -> Result<Zeroizing<String>> {
    if let Ok(passphrase) = std::env::var(PASSPHRASE_ENV) {
        return Ok(Zeroizing::new(passphrase));
    }
    let passphrase = Zeroizing::new(prompt_password("Sync passphrase: ")?);
    if passphrase.is_empty() {
        bail!("Passphrase must not be empty");
    }
    Ok(passphrase)
}

fn report(outcome: SyncOutcome) -> Result<()> {
    if outcome.success {
        println!("{}", outcome.message.unwrap_or_else(|| "Done".to_string()));
        Ok(())
    } else {
        bail!(outcome.error.unwrap_or_else(|| "Sync failed".to_string()))
    }
}

fn merge_files(
    local: &Path,
    remote: &Path,
    output: Option<&Path>,
    policy: ProfileMergePolicy,
) -> Result<()> {
    let read = |path: &Path| -> Result<_> {
        let bytes = std::fs::read(path).with_context(|| format!("Reading {}", path.display()))?;
        parse_snapshot(&bytes).with_context(|| format!("Parsing {}", path.display()))
    };
    let merged = merge_snapshots(&read(local)?, &read(remote)?, policy);

    if merged.change_log.is_empty() {
        println!("No changes");
    }
    for line in &merged.change_log {
        println!("{}", line);
    }

    if let Some(output) = output {
        let bytes = encode_snapshot(&merged.snapshot)?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        std::fs::write(output, serde_json::to_vec_pretty(&value)?)
            .with_context(|| format!("Writing {}", output.display()))?;
        println!("Merged snapshot written to {}", output.display());
    }
    Ok(())
}

fn format_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}
