//! Configuration for the placed-block store.
//!
//! Settings persist to disk as a RON file. Supports CLI overrides via clap,
//! hot-reload detection, and forward/backward compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    AutosaveConfig, Config, LogConfig, PreloadConfig, PreloadStrategy, StorageConfig,
    WorkerConfig, WorldBoundsConfig,
};
pub use error::ConfigError;
