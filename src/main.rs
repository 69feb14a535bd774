//! device-sync - command line access to registry devices
//!
//! Works on a JSON registry snapshot: loads it, runs one adapter operation
//! and writes the snapshot back when the operation changed something.

use clap::{Parser, Subcommand};
use registry_device_sync::{
    config::default_config_path,
    logging::{init_logging, LogConfig},
    DeviceAdapter, DeviceSet, InMemoryRegistry, RefId, Result, SyncConfig, WriteOutcome,
    WriteProtocol,
};
use serde_json::json;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "device-sync")]
#[command(about = "Inspect and update devices of a home-automation registry snapshot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Registry snapshot file
    #[arg(
        long,
        global = true,
        env = "DEVICE_SYNC_REGISTRY",
        default_value = "registry.json"
    )]
    registry: PathBuf,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "DEVICE_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a device's attributes and value
    Show { ref_id: RefId },
    /// Write a value
    SetValue {
        ref_id: RefId,
        value: f64,
        /// direct, control or both
        #[arg(long, default_value = "control")]
        protocol: WriteProtocol,
    },
    /// Claim the device interface for the configured owner
    Claim {
        ref_id: RefId,
        /// Release instead of claim
        #[arg(long)]
        release: bool,
    },
    /// Re-read name and type from the registry
    Refresh {
        ref_id: RefId,
        /// Also clear error and attention
        #[arg(long)]
        reset_errors: bool,
    },
    /// Set the error text. An empty text clears it.
    SetError { ref_id: RefId, text: String },
    /// Create a new device owned by the configured owner
    Create { name: String },
    /// Claim interfaces of the listed devices, release the other owned ones,
    /// and replay pending values
    Reconcile {
        #[arg(long, value_delimiter = ',')]
        claim: Vec<RefId>,
    },
}

impl Cli {
    fn load_config(&self) -> Result<SyncConfig> {
        let path = self
            .config
            .clone()
            .or_else(|| default_config_path().filter(|p| p.exists()));
        match path {
            Some(path) => SyncConfig::load(&path),
            None => {
                let config = SyncConfig::from_env()?;
                config.validate()?;
                Ok(config)
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    let mut log_config = LogConfig::from_config(&config.logging).with_env_overrides();
    if cli.debug {
        log_config.level = Level::DEBUG;
    }
    if let Err(e) = init_logging(log_config) {
        eprintln!("Logging disabled: {e}");
    }

    let registry = Arc::new(InMemoryRegistry::load(&cli.registry).await?);
    info!(
        registry = %cli.registry.display(),
        owner = %config.owner,
        "device-sync v{}",
        env!("CARGO_PKG_VERSION")
    );

    let changed = run(&cli.command, registry.clone(), &config).await?;
    if changed {
        registry.save(&cli.registry).await?;
    }
    Ok(())
}

/// Run one command. Returns whether the snapshot should be saved.
async fn run(
    command: &Command,
    registry: Arc<InMemoryRegistry>,
    config: &SyncConfig,
) -> Result<bool> {
    match command {
        Command::Show { ref_id } => {
            let mut device = DeviceAdapter::load(registry, *ref_id, config).await?;
            let value = device.get_value().await?;
            let report = json!({
                "ref": device.ref_id(),
                "name": device.name(),
                "inert": device.is_inert(),
                "full_name": device.full_name().await?,
                "address": device.address().await?,
                "type": device.device_type().await?,
                "interface": device.interface().await?,
                "attention": device.attention().await?,
                "value": value,
                "display": device.display_string().await?,
                "last_change": device.last_change_text().await?,
                "power_fail_recovery": device.power_fail_recovery().await?,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(false)
        }
        Command::SetValue {
            ref_id,
            value,
            protocol,
        } => {
            let mut device = DeviceAdapter::load(registry.clone(), *ref_id, config).await?;
            let outcome = device.set_value(*value, *protocol).await;
            if outcome != WriteOutcome::Unchanged {
                registry.set_pending(*ref_id, device.pending_value()).await;
            }
            println!("{outcome:?}");
            Ok(true)
        }
        Command::Claim { ref_id, release } => {
            let mut device = DeviceAdapter::load(registry, *ref_id, config).await?;
            let claim = device.claim_for_owner(!release).await?;
            println!("{claim:?}");
            Ok(true)
        }
        Command::Refresh {
            ref_id,
            reset_errors,
        } => {
            let mut device = DeviceAdapter::load(registry, *ref_id, config).await?;
            device.refresh(true, *reset_errors).await?;
            println!("{}", device.describe().await?);
            Ok(true)
        }
        Command::SetError { ref_id, text } => {
            let mut device = DeviceAdapter::load(registry, *ref_id, config).await?;
            device.set_error(text.as_str()).await?;
            Ok(true)
        }
        Command::Create { name } => {
            let device = DeviceAdapter::create(registry, config, name).await?;
            println!("{device}");
            Ok(true)
        }
        Command::Reconcile { claim } => {
            let set = DeviceSet::new(registry.clone(), config.clone());
            for ref_id in registry.snapshot().await.devices.keys() {
                set.get_or_load(*ref_id).await?;
            }
            for (ref_id, value) in registry.pending_values().await {
                match set.get(ref_id).await {
                    Some(device) => device.lock().await.restore_pending(value),
                    None => registry.set_pending(ref_id, None).await,
                }
            }

            let wanted: BTreeSet<RefId> = claim.iter().copied().collect();
            let interfaces = set.sync_interfaces(&wanted).await;
            let replay = set.on_reconnect().await?;

            for ref_id in set.ref_ids().await {
                if let Some(device) = set.get(ref_id).await {
                    let pending = device.lock().await.pending_value();
                    registry.set_pending(ref_id, pending).await;
                }
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "interfaces": interfaces,
                    "replay": replay,
                }))?
            );
            Ok(true)
        }
    }
}
