//! Configuration structs with sensible defaults and RON persistence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the configuration inside the config directory.
const CONFIG_FILE: &str = "config.ron";

/// Application directory name used under the OS config directory.
const APP_NAME: &str = "blockstore";

/// Top-level store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Backing storage and world geometry.
    pub storage: StorageConfig,
    /// When chunk stores are loaded ahead of use.
    pub preload: PreloadConfig,
    /// Background worker pool.
    pub workers: WorkerConfig,
    /// Periodic flushing of dirty chunks.
    pub autosave: AutosaveConfig,
    /// Logging settings.
    pub log: LogConfig,
}

/// Vertical extent of a world.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorldBoundsConfig {
    /// Lowest addressable block y (inclusive).
    pub min_y: i32,
    /// Number of block layers above `min_y`.
    pub height: u32,
}

/// Backing storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding one sub-directory per world plus the world index.
    pub data_dir: PathBuf,
    /// Vertical bounds used for worlds without an override.
    pub default_bounds: WorldBoundsConfig,
    /// Per-world vertical bounds (world name -> bounds).
    pub world_bounds: HashMap<String, WorldBoundsConfig>,
}

/// Policy controlling when chunk stores are materialized ahead of access.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PreloadStrategy {
    /// Only materialize on demand.
    #[default]
    None,
    /// Preload every chunk the host reports as loaded.
    EagerOnLoad,
    /// Preload a square of chunks with the given radius around players.
    ProximityRadius(u32),
}

/// Preload configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreloadConfig {
    /// Active preload strategy.
    pub strategy: PreloadStrategy,
}

/// Background worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of worker threads (0 = derive from CPU count).
    pub threads: usize,
    /// Maximum number of queued background jobs.
    pub queue_capacity: usize,
}

/// Autosave configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Seconds between automatic saves (0 disables autosave).
    pub interval_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Log level filter (e.g., "debug", "info", "warn").
    pub level: String,
    /// Also write JSON logs to a file in the log directory.
    pub json_file: bool,
}

// --- Default implementations ---

impl Default for WorldBoundsConfig {
    fn default() -> Self {
        Self {
            min_y: -64,
            height: 384,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("blockstore"),
            default_bounds: WorldBoundsConfig::default(),
            world_bounds: HashMap::new(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            queue_capacity: 1024,
        }
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_file: false,
        }
    }
}

impl StorageConfig {
    /// Vertical bounds for the named world, falling back to the default.
    pub fn bounds_for(&self, world: &str) -> WorldBoundsConfig {
        self.world_bounds
            .get(world)
            .copied()
            .unwrap_or(self.default_bounds)
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Default configuration directory under the OS config location.
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|base| base.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read_file(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let write_err = |source| ConfigError::Write {
            path: config_path.clone(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(write_err)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(write_err)?;
        Ok(())
    }

    /// Re-reads `config.ron`: returns `Some(new_config)` if it differs from
    /// `self`, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read_file(&config_dir.join(CONFIG_FILE))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("min_y: -64"));
        assert!(ron_str.contains("interval_secs: 300"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.preload.strategy = PreloadStrategy::ProximityRadius(3);
        config.storage.world_bounds.insert(
            "nether".to_string(),
            WorldBoundsConfig {
                min_y: 0,
                height: 256,
            },
        );
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_preload_strategy_parses_from_ron() {
        let config: Config = ron::from_str("(preload: (strategy: ProximityRadius(5)))").unwrap();
        assert_eq!(config.preload.strategy, PreloadStrategy::ProximityRadius(5));

        let config: Config = ron::from_str("(preload: (strategy: EagerOnLoad))").unwrap();
        assert_eq!(config.preload.strategy, PreloadStrategy::EagerOnLoad);
    }

    #[test]
    fn test_missing_field_uses_default() {
        let ron_str = "(storage: (), log: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.autosave, AutosaveConfig::default());
        assert_eq!(config.preload.strategy, PreloadStrategy::None);
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_bounds_for_uses_override_then_default() {
        let mut storage = StorageConfig::default();
        storage.world_bounds.insert(
            "end".to_string(),
            WorldBoundsConfig {
                min_y: 0,
                height: 256,
            },
        );
        assert_eq!(storage.bounds_for("end").height, 256);
        assert_eq!(storage.bounds_for("world"), WorldBoundsConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.workers.threads = 3;
        config.storage.data_dir = PathBuf::from("/srv/blockstore");

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.autosave.interval_secs = 60;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().autosave.interval_secs, 60);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{{not valid}}").unwrap();

        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.path(), Some(dir.path().join(CONFIG_FILE).as_path()));
        assert!(err.to_string().contains("config.ron"));
    }

    #[test]
    fn test_reload_of_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::default().reload(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.path().is_some());
    }
}
