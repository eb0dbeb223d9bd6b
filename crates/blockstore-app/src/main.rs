//! Host process for the placed-block store.
//!
//! Loads configuration, opens the store, autosaves in the background, and
//! saves every world when standard input closes or `quit` is entered.

mod platform;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use blockstore_config::{CliArgs, Config, ConfigError};
use blockstore_core::{Autosaver, BlockStore, StoreError, StoreRegistry};
use clap::Parser;

use crate::platform::{AppDirs, PlatformError};

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to open store: {0}")]
    Store(#[from] StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("blockstore: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Runs the host until input ends. Returns whether the final save was clean.
fn run(args: &CliArgs) -> Result<bool, AppError> {
    let dirs = AppDirs::resolve()?;
    let config_dir = args
        .config
        .clone()
        .unwrap_or_else(|| dirs.config_dir.clone());

    let file_config = Config::load_or_create(&config_dir)?;
    let config = effective_config(&file_config, args, &dirs);
    dirs.create_dirs()?;

    blockstore_log::init_logging(Some(&dirs.log_dir), Some(&config));
    tracing::info!(
        config_dir = %config_dir.display(),
        data_dir = %config.storage.data_dir.display(),
        preload = ?config.preload.strategy,
        "starting blockstore"
    );

    let store = BlockStore::open(&config)?;
    let autosaver = Autosaver::from_config(Arc::clone(store.registry()), &config.autosave)?;
    let mut console = Console {
        registry: Arc::clone(store.registry()),
        args,
        dirs: &dirs,
        config_dir,
        file_config,
        config,
        autosaver,
    };

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        if !console.command(line?.trim()) {
            break;
        }
    }

    if let Some(autosaver) = console.autosaver.take() {
        autosaver.stop();
    }
    let report = store.shutdown();
    for (world, world_report) in &report.worlds {
        for (coord, error) in &world_report.failed {
            tracing::error!(world = %world, cx = coord.cx, cz = coord.cz, %error, "chunk lost at shutdown");
        }
    }
    tracing::info!(
        saved = report.saved(),
        failed = report.failed(),
        "shutdown complete"
    );
    Ok(report.is_ok())
}

/// The file configuration with CLI overrides and the data directory resolved.
fn effective_config(file_config: &Config, args: &CliArgs, dirs: &AppDirs) -> Config {
    let mut config = file_config.clone();
    config.apply_cli_overrides(args);
    config.storage.data_dir = dirs.data_path(&config.storage.data_dir);
    config
}

/// Line-oriented operator console on standard input.
struct Console<'a> {
    registry: Arc<StoreRegistry>,
    args: &'a CliArgs,
    dirs: &'a AppDirs,
    config_dir: PathBuf,
    /// `config.ron` as last read, before overrides.
    file_config: Config,
    /// Settings in effect.
    config: Config,
    autosaver: Option<Autosaver>,
}

impl Console<'_> {
    /// Handles one console line. Returns `false` when the host should stop.
    fn command(&mut self, line: &str) -> bool {
        match line {
            "" => {}
            "quit" | "exit" | "stop" => return false,
            "save" => {
                let report = self.registry.save_all();
                println!("saved {} chunks, {} failed", report.saved(), report.failed());
            }
            "stats" => {
                for world in self.registry.worlds() {
                    if let Some(manager) = self.registry.get(&world) {
                        println!(
                            "{world}: {} loaded, {} dirty, {} tracked",
                            manager.loaded_count(),
                            manager.dirty_count(),
                            manager.tracked_count()
                        );
                    }
                }
            }
            "reload" => match self.reload() {
                Ok(true) => println!("configuration reloaded"),
                Ok(false) => println!("configuration unchanged"),
                Err(e) => {
                    tracing::warn!(error = %e, "config reload failed");
                    println!("reload failed: {e}");
                }
            },
            other => println!("unknown command: {other} (try save, stats, reload, quit)"),
        }
        true
    }

    /// Re-reads `config.ron` and applies what can change at runtime.
    ///
    /// Autosave restarts with the new interval. Storage, worker and preload
    /// changes take effect on the next start.
    fn reload(&mut self) -> Result<bool, AppError> {
        let Some(file_config) = self.file_config.reload(&self.config_dir)? else {
            return Ok(false);
        };
        let config = effective_config(&file_config, self.args, self.dirs);

        if config.autosave != self.config.autosave {
            if let Some(previous) = self.autosaver.take() {
                previous.stop();
            }
            self.autosaver = Autosaver::from_config(Arc::clone(&self.registry), &config.autosave)?;
            tracing::info!(interval_secs = config.autosave.interval_secs, "autosave rescheduled");
        }
        if config.storage != self.config.storage
            || config.workers != self.config.workers
            || config.preload != self.config.preload
        {
            tracing::warn!("storage, worker and preload settings apply after restart");
        }

        self.file_config = file_config;
        self.config = config;
        Ok(true)
    }
}
