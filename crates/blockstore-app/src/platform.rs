//! OS directory resolution for the store host.

use std::io;
use std::path::{Path, PathBuf};

use blockstore_config::{Config, ConfigError};

/// Errors that can occur while preparing directories.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The OS did not provide a configuration directory.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Directory creation failed.
    #[error("platform I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Where the host keeps its configuration, world data and logs.
#[derive(Debug, Clone)]
pub struct AppDirs {
    /// Holds `config.ron`.
    pub config_dir: PathBuf,
    /// Base for relative `storage.data_dir` settings.
    pub data_dir: PathBuf,
    /// JSON log files.
    pub log_dir: PathBuf,
}

const APP_NAME: &str = "blockstore";

impl AppDirs {
    /// Resolves the OS-specific directories without creating them.
    pub fn resolve() -> Result<Self, PlatformError> {
        let app_config = Config::default_dir()?;
        let data_dir = dirs::data_dir()
            .map(|dir| dir.join(APP_NAME))
            .unwrap_or_else(|| app_config.join("data"));

        Ok(Self {
            config_dir: app_config.clone(),
            data_dir,
            log_dir: app_config.join("logs"),
        })
    }

    /// Directories rooted under `root`, for tests and portable installs.
    pub fn resolve_with_root(root: &Path) -> Self {
        let app_dir = root.join(APP_NAME);
        Self {
            config_dir: app_dir.join("config"),
            data_dir: app_dir.join("data"),
            log_dir: app_dir.join("logs"),
        }
    }

    /// Creates every directory on disk.
    pub fn create_dirs(&self) -> Result<(), PlatformError> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }

    /// Resolves a possibly relative data path against [`AppDirs::data_dir`].
    pub fn data_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_with_root_and_create() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = AppDirs::resolve_with_root(tmp.path());
        dirs.create_dirs().unwrap();

        assert!(dirs.config_dir.exists());
        assert!(dirs.data_dir.exists());
        assert!(dirs.log_dir.exists());
        assert!(dirs.config_dir.starts_with(tmp.path()));
    }

    #[test]
    fn test_data_path_resolution() {
        let dirs = AppDirs::resolve_with_root(Path::new("/srv"));
        assert_eq!(
            dirs.data_path(Path::new("worlds")),
            PathBuf::from("/srv/blockstore/data/worlds")
        );
        assert_eq!(
            dirs.data_path(Path::new("/var/worlds")),
            PathBuf::from("/var/worlds")
        );
    }
}
