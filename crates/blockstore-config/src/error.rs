//! Configuration error types.

use std::path::{Path, PathBuf};

/// Errors that can occur when loading, saving, or reloading `config.ron`.
///
/// File errors carry the path involved so host logs point at the right file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not a valid configuration.
    #[error("invalid configuration in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[source] ron::Error),

    /// The OS did not provide a configuration directory.
    #[error("could not determine a configuration directory")]
    NoConfigDir,
}

impl ConfigError {
    /// The file the error refers to, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Read { path, .. } | Self::Write { path, .. } | Self::Parse { path, .. } => {
                Some(path)
            }
            Self::Serialize(_) | Self::NoConfigDir => None,
        }
    }
}
