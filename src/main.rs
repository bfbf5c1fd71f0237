//! KeyBoy - application launcher on the right Command key

mod accessibility;
mod config;
mod dispatch;
mod error;
mod event_tap;
mod keymap;
mod launcher;
mod menu_bar;
mod modifiers;
mod notification;
mod permission;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use accessibility::SystemTrust;
use config::{Config, ConfigPaths, ConfigStore, ConfigWatcher, StoreTimings};
use dispatch::Dispatcher;
use error::{KeyBoyError, TapError};
use event_tap::EventTap;
use launcher::WorkspaceLauncher;
use permission::{Monitor, PermissionGate};

/// KeyBoy - launch applications with Right Command + key
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run without menu bar UI (daemon mode)
    #[arg(long)]
    headless: bool,

    /// Use this configuration file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Subcommand for one-shot operations
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the configuration file path
    Path,
    /// Print the current configuration
    Show,
    /// Replace the configuration with a JSON document ("-" reads stdin)
    Import { file: PathBuf },
    /// Restore the default shortcuts
    Reset,
    /// Report whether KeyBoy may monitor keyboard input
    Check {
        /// Show the system permission dialog if not trusted
        #[arg(long)]
        prompt: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let paths = match args.config {
        Some(file) => ConfigPaths::from_file(file),
        None => ConfigPaths::default_location().map_err(KeyBoyError::from)?,
    };
    let store = Arc::new(ConfigStore::new(paths, StoreTimings::default()));

    if let Some(cmd) = args.command {
        return handle_command(cmd, &store);
    }

    run_daemon(store, args.headless)
}

fn handle_command(cmd: Commands, store: &ConfigStore) -> anyhow::Result<()> {
    match cmd {
        Commands::Path => {
            println!("{}", store.paths().file.display());
        }
        Commands::Show => {
            let config = store.load()?;
            println!("{}", config.to_json()?);
        }
        Commands::Import { file } => {
            let text = read_document(&file)?;
            let config = store
                .import_json(&text)
                .with_context(|| format!("import of {} rejected", file.display()))?;
            println!("✓ Imported {} shortcuts", config.shortcuts.len());
        }
        Commands::Reset => {
            let config = store.save(Config::seed())?;
            println!("✓ Restored {} default shortcuts", config.shortcuts.len());
        }
        Commands::Check { prompt } => {
            if accessibility::is_trusted() {
                println!("✓ Input monitoring permitted");
            } else {
                println!("✗ Input monitoring not permitted");
                println!("  System Settings → Privacy & Security → Accessibility");
                if prompt {
                    accessibility::request_trust();
                }
            }
        }
    }

    Ok(())
}

fn read_document(file: &Path) -> anyhow::Result<String> {
    let mut text = String::new();
    if file.as_os_str() == "-" {
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
    } else {
        text = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
    }
    Ok(text)
}

fn run_daemon(store: Arc<ConfigStore>, headless: bool) -> anyhow::Result<()> {
    if cfg!(not(target_os = "macos")) {
        return Err(KeyBoyError::from(TapError::Unsupported).into());
    }

    let config = store.load().context("failed to load configuration")?;
    tracing::info!(
        path = %store.paths().file.display(),
        shortcuts = config.shortcuts.len(),
        "KeyBoy started"
    );

    let _watcher = ConfigWatcher::spawn(Arc::clone(&store))
        .context("failed to watch configuration directory")?;
    let launches = launcher::spawn_worker(WorkspaceLauncher, store.handle())
        .map_err(KeyBoyError::from)?;
    let tap = EventTap::new(Dispatcher::new(store.handle(), launches));
    let monitor = Monitor::spawn(PermissionGate::new(tap, SystemTrust)).map_err(KeyBoyError::from)?;

    if headless {
        let (tx, rx) = crossbeam::channel::bounded(1);
        ctrlc::set_handler(move || {
            let _ = tx.try_send(());
        })
        .context("failed to set Ctrl+C handler")?;

        tracing::info!("running headless (Ctrl+C to quit)");
        let _ = rx.recv();
        tracing::info!("shutting down");
    } else {
        menu_bar::run_with_menu_bar(Arc::clone(&store))?;
    }

    monitor.shutdown();
    tracing::info!("KeyBoy stopped");
    Ok(())
}
