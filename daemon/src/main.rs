mod applier;
mod catalog;
mod compositor;
mod config;
mod controller;
mod ipc_server;
mod macros;
mod monitors;
mod picker;
mod settings;
mod timer;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use crate::compositor::Compositor;
use crate::config::Config;
use crate::controller::Controller;
use crate::settings::JsonFileStore;

/// Multi-monitor wallpaper rotation daemon
#[derive(Parser, Debug)]
#[command(name = "paperswitcher")]
#[command(version, about, long_about = None)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/paperswitcher/config.toml)
    #[arg(short, long, env = "PAPERSWITCHER_CONFIG")]
    config: Option<PathBuf>,

    /// Settings file (default: $XDG_DATA_HOME/paperswitcher/settings.json)
    #[arg(short, long, env = "PAPERSWITCHER_SETTINGS")]
    settings: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The log level lives in the config, so load it before the logger exists
    let loaded = match args.config {
        Some(ref path) => Config::load_from_path(path),
        None => Config::load(),
    };
    let log_level = loaded
        .as_ref()
        .map(|cfg| cfg.general.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    log::info!("Starting PaperSwitcher daemon v{}", env!("CARGO_PKG_VERSION"));

    let config = match loaded {
        Ok(cfg) => {
            log::info!("✓ Configuration loaded successfully");
            log::info!("  General settings:");
            log::info!("    - Log level: {}", cfg.general.log_level);
            log::info!("    - Monitor source: {}", cfg.general.monitor_source);
            log::info!(
                "    - Resume on startup: {}",
                if cfg.general.auto_start { "yes" } else { "no" }
            );
            log::info!("  Compositor settings:");
            log::info!(
                "    - Format: {} (filter: {})",
                cfg.compositor.format,
                cfg.compositor.filter
            );
            log::info!("    - Output directory: {}", cfg.output_dir().display());
            log::info!("  Wallpaper backend: {}", cfg.applier.backend);

            if !cfg.monitor.is_empty() {
                log::info!("  Static monitors:");
                for monitor in &cfg.monitor {
                    log::info!(
                        "      - {}: {}x{} at {},{}",
                        monitor.name,
                        monitor.width,
                        monitor.height,
                        monitor.x,
                        monitor.y
                    );
                }
            }

            cfg
        }
        Err(e) => {
            log::warn!("Failed to load config: {:#}. Using defaults.", e);
            Config::default()
        }
    };

    let store = match args.settings {
        Some(path) => JsonFileStore::new(path),
        None => JsonFileStore::new(JsonFileStore::default_path()?),
    };
    log::info!("Settings file: {}", store.path().display());

    let compositor = Compositor::new(&config.compositor, config.output_dir())?;
    let setter = applier::from_settings(&config.applier)?;
    let monitor_source = monitors::from_config(&config);

    let mut controller = Controller::new(Box::new(store), monitor_source, setter, compositor)?;
    if config.general.auto_start {
        tokio::task::block_in_place(|| controller.resume_on_startup());
    }

    let state = Arc::new(Mutex::new(DaemonState::new(controller)));
    let rearm = Arc::new(Notify::new());

    // Start IPC server
    let ipc_state = state.clone();
    let ipc_rearm = rearm.clone();
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server::start(ipc_state, ipc_rearm).await {
            log::error!("IPC server error: {:#}", e);
        }
    });

    // Start rotation timer
    let timer_handle = tokio::spawn(timer::run(state.clone(), rearm));

    // Set up signal handlers
    let signal_state = state.clone();
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                log::error!("Failed to set up signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM, shutting down...");
            }
            _ = sigint.recv() => {
                log::info!("Received SIGINT, shutting down...");
            }
        }

        signal_state.lock().await.should_exit = true;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = ipc_handle => {
            log::info!("IPC server stopped");
        }
        _ = timer_handle => {
            log::info!("Rotation timer stopped");
        }
    }

    log::info!("Daemon shutting down");
    Ok(())
}

/// Shared daemon state
pub struct DaemonState {
    pub should_exit: bool,
    pub controller: Controller,
}

impl DaemonState {
    fn new(controller: Controller) -> Self {
        Self {
            should_exit: false,
            controller,
        }
    }
}
