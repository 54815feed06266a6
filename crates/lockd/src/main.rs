//! Shackle Lock Daemon
//!
//! Lock-side service for the Shackle smart-lock system.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lockd::config::Config;
use lockd::hardware::actuator_for;
use lockd::provision::{load_or_create_factory_secret, load_or_create_identity};
use lockd::service::LockService;
use lockd::store::{EventStore, KeyStore};
use protocol::{EventsFilter, KeyEntry, KeyType, Permission};
use uuid::Uuid;

/// Shackle lock daemon - lock-side services for the access-control protocol.
#[derive(Parser, Debug)]
#[command(name = "shackle-lockd")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the lock daemon and serve the physical button
    Start,

    /// Print the factory secret for out-of-band setup
    SetupCode,

    /// Manage issued and pending keys
    #[command(subcommand)]
    Keys(KeysCommands),

    /// Show recent lock events
    Events {
        /// Maximum number of events to show
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

/// Subcommands for key management.
#[derive(Subcommand, Debug, Clone)]
pub enum KeysCommands {
    /// List all issued and pending keys
    List,

    /// Remove a key by its ID
    Remove {
        /// Key ID to remove
        id: Uuid,

        /// Remove a pending key instead of an issued one
        #[arg(long)]
        pending: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Start => start(&config),
        Commands::SetupCode => setup_code(&config),
        Commands::Keys(command) => keys(&config, command),
        Commands::Events { limit } => events(&config, limit),
    }
}

/// Initializes tracing with an env-filter; `--verbose` forces debug.
fn init_tracing(config: &Config, verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.lock.log_level.clone()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Runs the daemon: hardware loop serving physical button presses.
///
/// The wireless transport frontend attaches to the same stores and
/// service; this loop keeps the lock usable from the door itself.
fn start(config: &Config) -> Result<()> {
    let data_dir = &config.lock.data_dir;
    let id = load_or_create_identity(data_dir)?;
    let factory_secret = load_or_create_factory_secret(data_dir)?;
    let keys = KeyStore::open(data_dir.join("keys.json"))?;
    let event_store = EventStore::open(data_dir.join("events.json"), config.events.max_events)?;
    let actuator = actuator_for(config.hardware.model)?;

    let mut service = LockService::new(
        id,
        factory_secret,
        keys,
        event_store,
        actuator,
        Duration::from_millis(config.hardware.unlock_pulse_ms),
    );

    let info = service.information();
    tracing::info!(
        "Lock '{}' ({}) started on {} hardware, status {:?}",
        config.lock.name,
        info.id,
        config.hardware.model,
        info.status
    );

    let presses = service.subscribe_button();
    loop {
        let press = match presses.recv() {
            Ok(press) => press,
            Err(_) => {
                tracing::info!("Button channel closed, shutting down");
                return Ok(());
            }
        };
        tracing::debug!("Button pressed at {}", press.at);
        if let Err(err) = service.press_button() {
            tracing::error!("Button unlock failed: {}", err);
        }
    }
}

/// Prints the factory secret for transfer via label or QR code.
fn setup_code(config: &Config) -> Result<()> {
    let data_dir = &config.lock.data_dir;
    let id = load_or_create_identity(data_dir)?;
    let secret = load_or_create_factory_secret(data_dir)?;
    println!("lock:   {}", id);
    println!("secret: {}", secret.to_base64());
    Ok(())
}

/// Handles `keys list` and `keys remove`.
fn keys(config: &Config, command: KeysCommands) -> Result<()> {
    let store = KeyStore::open(config.lock.data_dir.join("keys.json"))?;

    match command {
        KeysCommands::List => {
            let entries = store.entries();
            if entries.is_empty() {
                println!("No keys installed.");
                return Ok(());
            }
            for entry in entries {
                match entry {
                    KeyEntry::Key(key) => println!(
                        "key      {}  {:10}  {}",
                        key.id,
                        permission_label(&key.permission),
                        key.name
                    ),
                    KeyEntry::NewKey(key) => println!(
                        "pending  {}  {:10}  {} (expires {})",
                        key.id,
                        permission_label(&key.permission),
                        key.name,
                        key.expiration
                    ),
                }
            }
        }
        KeysCommands::Remove { id, pending } => {
            let kind = if pending { KeyType::NewKey } else { KeyType::Key };
            if !store.remove(id, kind)? {
                anyhow::bail!("no such key: {}", id);
            }
            store.save().context("Failed to save key store")?;
            println!("Removed {}", id);
        }
    }
    Ok(())
}

/// Prints the most recent events, oldest first.
fn events(config: &Config, limit: u32) -> Result<()> {
    let store = EventStore::open(
        config.lock.data_dir.join("events.json"),
        config.events.max_events,
    )?;

    let total = store.len() as u32;
    let offset = total.saturating_sub(limit);
    let events = store.fetch(&EventsFilter {
        offset,
        limit: Some(limit),
    });

    if events.is_empty() {
        println!("No events recorded.");
        return Ok(());
    }
    for event in events {
        println!("{}  {}  {:?}", event.date, event.key, event.action);
    }
    Ok(())
}

fn permission_label(permission: &Permission) -> &'static str {
    match permission {
        Permission::Owner => "owner",
        Permission::Admin => "admin",
        Permission::Anytime => "anytime",
        Permission::Scheduled(_) => "scheduled",
    }
}
