//! Per-world manager registry.
//!
//! The [`StoreRegistry`] owns one [`ChunkManager`] per world, created on first
//! access. It is built once at startup, passed to whoever needs it, and
//! flushed as a whole at shutdown.

use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::FxHashMap;

use blockstore_config::StorageConfig;

use crate::chunk_manager::ChunkManager;
use crate::coords::{WorldBounds, WorldId};
use crate::error::{RegistrySaveReport, SaveReport, StoreError};
use crate::storage::{ChunkStorage, FileStorage};

/// Owns the chunk managers of every world.
pub struct StoreRegistry {
    storage: Arc<dyn ChunkStorage>,
    default_bounds: WorldBounds,
    world_bounds: FxHashMap<WorldId, WorldBounds>,
    managers: DashMap<WorldId, Arc<ChunkManager>>,
}

impl StoreRegistry {
    /// Creates an empty registry persisting through `storage`.
    pub fn new(storage: Arc<dyn ChunkStorage>, default_bounds: WorldBounds) -> Self {
        Self {
            storage,
            default_bounds,
            world_bounds: FxHashMap::default(),
            managers: DashMap::new(),
        }
    }

    /// Opens file storage under `config.data_dir` with the configured bounds.
    pub fn from_config(config: &StorageConfig) -> Result<Self, StoreError> {
        let storage = FileStorage::open(&config.data_dir)?;
        let mut registry = Self::new(
            Arc::new(storage),
            WorldBounds::try_from(config.default_bounds)?,
        );
        for (world, bounds) in &config.world_bounds {
            let bounds = WorldBounds::try_from(*bounds)?;
            registry = registry.with_world_bounds(WorldId::new(world.as_str()), bounds);
        }
        tracing::info!(
            data_dir = %config.data_dir.display(),
            overrides = config.world_bounds.len(),
            "opened block store"
        );
        Ok(registry)
    }

    /// Uses `bounds` instead of the default for `world`.
    ///
    /// Only affects managers created afterwards.
    pub fn with_world_bounds(mut self, world: WorldId, bounds: WorldBounds) -> Self {
        self.world_bounds.insert(world, bounds);
        self
    }

    /// The vertical bounds used for `world`.
    pub fn bounds_for(&self, world: &WorldId) -> WorldBounds {
        self.world_bounds
            .get(world)
            .copied()
            .unwrap_or(self.default_bounds)
    }

    /// The backing storage shared by every world.
    pub fn storage(&self) -> &Arc<dyn ChunkStorage> {
        &self.storage
    }

    /// Returns the manager for `world`, creating it on first access.
    pub fn manager(&self, world: &WorldId) -> Arc<ChunkManager> {
        if let Some(manager) = self.managers.get(world) {
            return Arc::clone(manager.value());
        }
        let manager = self.managers.entry(world.clone()).or_insert_with(|| {
            tracing::debug!(world = %world, "created chunk manager");
            Arc::new(ChunkManager::new(
                world.clone(),
                self.bounds_for(world),
                Arc::clone(&self.storage),
            ))
        });
        Arc::clone(manager.value())
    }

    /// Returns the manager for `world` if one was created.
    pub fn get(&self, world: &WorldId) -> Option<Arc<ChunkManager>> {
        self.managers.get(world).map(|m| Arc::clone(m.value()))
    }

    /// Worlds with a manager, sorted by name.
    pub fn worlds(&self) -> Vec<WorldId> {
        let mut worlds: Vec<WorldId> = self.managers.iter().map(|e| e.key().clone()).collect();
        worlds.sort();
        worlds
    }

    /// Flushes the dirty chunks of one world.
    ///
    /// A world without a manager has nothing to save.
    pub fn save_world(&self, world: &WorldId) -> SaveReport {
        self.get(world)
            .map(|manager| manager.save_all())
            .unwrap_or_default()
    }

    /// Flushes every world, then rewrites the world index.
    pub fn save_all(&self) -> RegistrySaveReport {
        let mut managers: Vec<Arc<ChunkManager>> =
            self.managers.iter().map(|e| Arc::clone(e.value())).collect();
        managers.sort_by(|a, b| a.world().cmp(b.world()));

        let worlds = managers
            .iter()
            .map(|manager| (manager.world().clone(), manager.save_all()))
            .collect();

        let index_error = self.storage.flush_index().err().map(|e| {
            tracing::error!(error = %e, "failed to write world index");
            StoreError::from(e)
        });

        let report = RegistrySaveReport { worlds, index_error };
        tracing::info!(
            worlds = report.worlds.len(),
            saved = report.saved(),
            failed = report.failed(),
            "saved all worlds"
        );
        report
    }

    /// Drops negative-cache entries in every world.
    pub fn forget_absent(&self) -> usize {
        let managers: Vec<Arc<ChunkManager>> =
            self.managers.iter().map(|e| Arc::clone(e.value())).collect();
        managers.iter().map(|manager| manager.forget_absent()).sum()
    }

    /// Flushes `world` and drops its manager.
    ///
    /// The manager is kept if any chunk fails to save, so no change is lost.
    /// Returns `None` if the world had no manager.
    pub fn remove_world(&self, world: &WorldId) -> Option<SaveReport> {
        let manager = self.get(world)?;
        let report = manager.save_all();
        if report.is_ok() {
            self.managers.remove(world);
            tracing::debug!(world = %world, "removed chunk manager");
        } else {
            tracing::warn!(
                world = %world,
                failed = report.failed.len(),
                "keeping world with unsaved chunks"
            );
        }
        Some(report)
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("default_bounds", &self.default_bounds)
            .field("worlds", &self.managers.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{BlockPos, ChunkCoord};
    use crate::storage::{FailingStorage, INDEX_FILE, MemoryStorage};

    fn registry() -> StoreRegistry {
        StoreRegistry::new(Arc::new(MemoryStorage::new()), WorldBounds::default())
    }

    #[test]
    fn test_manager_is_created_once_per_world() {
        let registry = registry();
        let a = registry.manager(&WorldId::new("overworld"));
        let b = registry.manager(&WorldId::new("overworld"));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.get(&WorldId::new("nether")).is_none());
        assert_eq!(registry.worlds(), vec![WorldId::new("overworld")]);
    }

    #[test]
    fn test_worlds_are_independent() {
        let registry = registry();
        let pos = BlockPos::new(1, 2, 3);
        registry.manager(&WorldId::new("a")).set_placed(pos, true);
        assert!(registry.manager(&WorldId::new("a")).is_placed(pos));
        assert!(!registry.manager(&WorldId::new("b")).is_placed(pos));
    }

    #[test]
    fn test_forget_absent_spans_worlds() {
        let registry = registry();
        let pos = BlockPos::new(1, 2, 3);
        registry.manager(&WorldId::new("a")).set_placed(pos, true);
        assert!(!registry.manager(&WorldId::new("b")).is_placed(pos));
        assert!(!registry.manager(&WorldId::new("c")).is_placed(pos));

        assert_eq!(registry.forget_absent(), 2);
        assert!(registry.manager(&WorldId::new("a")).is_placed(pos));
    }

    #[test]
    fn test_world_bounds_override() {
        let nether = WorldBounds::new(0, 256).unwrap();
        let registry = registry().with_world_bounds(WorldId::new("nether"), nether);
        assert_eq!(registry.manager(&WorldId::new("nether")).bounds(), nether);
        assert_eq!(
            registry.manager(&WorldId::new("overworld")).bounds(),
            WorldBounds::default()
        );
    }

    #[test]
    fn test_save_all_reports_per_world() {
        let storage = Arc::new(FailingStorage::new());
        storage.fail_on(ChunkCoord::new(0, 0));
        let registry = StoreRegistry::new(storage.clone(), WorldBounds::default());

        registry.manager(&WorldId::new("b")).set_placed(BlockPos::new(0, 0, 0), true);
        registry.manager(&WorldId::new("a")).set_placed(BlockPos::new(16, 0, 0), true);

        let report = registry.save_all();
        assert!(!report.is_ok());
        assert_eq!(report.saved(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.worlds[0].0, WorldId::new("a"));
        assert_eq!(report.worlds[1].1.failed_chunks(), vec![ChunkCoord::new(0, 0)]);
    }

    #[test]
    fn test_save_world_without_manager_is_empty() {
        let report = registry().save_world(&WorldId::new("missing"));
        assert_eq!(report.saved, 0);
        assert!(report.is_ok());
    }

    #[test]
    fn test_remove_world_flushes_first() {
        let storage = Arc::new(MemoryStorage::new());
        let registry = StoreRegistry::new(storage.clone(), WorldBounds::default());
        let world = WorldId::new("w");
        registry.manager(&world).set_placed(BlockPos::new(0, 0, 0), true);

        let report = registry.remove_world(&world).unwrap();
        assert_eq!(report.saved, 1);
        assert!(registry.get(&world).is_none());
        assert!(registry.manager(&world).is_placed(BlockPos::new(0, 0, 0)));
        assert!(registry.remove_world(&WorldId::new("other")).is_none());
    }

    #[test]
    fn test_from_config_persists_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            ..StorageConfig::default()
        };
        let world = WorldId::new("survival world");
        let pos = BlockPos::new(-300, 12, 4000);

        {
            let registry = StoreRegistry::from_config(&config).unwrap();
            registry.manager(&world).set_placed(pos, true);
            assert!(registry.save_all().is_ok());
        }
        assert!(dir.path().join(INDEX_FILE).exists());

        let registry = StoreRegistry::from_config(&config).unwrap();
        assert!(registry.manager(&world).is_placed(pos));
    }

    #[test]
    fn test_from_config_rejects_bad_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            ..StorageConfig::default()
        };
        config.default_bounds.height = 0;
        assert!(matches!(
            StoreRegistry::from_config(&config),
            Err(StoreError::InvalidBounds { height: 0, .. })
        ));
    }
}
