//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Command-line arguments for the store host.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "blockstore", about = "Persistent placed-block store")]
pub struct CliArgs {
    /// Directory holding world data.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Number of background worker threads.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Seconds between automatic saves (0 disables).
    #[arg(long)]
    pub autosave_secs: Option<u64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref dir) = args.data_dir {
            self.storage.data_dir = dir.clone();
        }
        if let Some(threads) = args.threads {
            self.workers.threads = threads;
        }
        if let Some(secs) = args.autosave_secs {
            self.autosave.interval_secs = secs;
        }
        if let Some(ref level) = args.log_level {
            self.log.level = level.clone();
        }
    }
}
