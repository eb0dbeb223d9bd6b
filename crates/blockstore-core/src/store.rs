//! The assembled store: world registry plus background workers.

use std::sync::Arc;

use blockstore_config::Config;

use crate::api::BlockStoreApi;
use crate::coords::{BlockPos, ChunkCoord, Direction, WorldId};
use crate::error::{RegistrySaveReport, SaveReport, StoreError};
use crate::preload::chunks_around;
use crate::registry::StoreRegistry;
use crate::worker::{Job, WorkerPool};

/// Placed-block store for every world of one host process.
///
/// Queries and writes run on the caller's thread. Preloads are handed to the
/// worker pool and dropped when its queue is full.
#[derive(Debug)]
pub struct BlockStore {
    registry: Arc<StoreRegistry>,
    workers: WorkerPool,
}

impl BlockStore {
    pub fn new(registry: Arc<StoreRegistry>, workers: WorkerPool) -> Self {
        Self { registry, workers }
    }

    /// Opens the registry and starts the worker pool described by `config`.
    pub fn open(config: &Config) -> Result<Self, StoreError> {
        let registry = StoreRegistry::from_config(&config.storage)?;
        let workers = WorkerPool::from_config(&config.workers)?;
        Ok(Self::new(Arc::new(registry), workers))
    }

    /// The per-world registry, shareable with an autosaver.
    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    /// Queues a relocation on the worker pool.
    ///
    /// Relocations queued this way may run concurrently with each other; use
    /// [`BlockStoreApi::move_blocks`] when ordering matters.
    pub fn move_blocks_async(
        &self,
        world: &WorldId,
        positions: Vec<BlockPos>,
        direction: Direction,
    ) -> Result<(), StoreError> {
        self.workers.submit(Job::Relocate {
            manager: self.registry.manager(world),
            positions,
            direction,
        })
    }

    /// Blocks until every queued background job has finished.
    pub fn flush_pending(&self) {
        self.workers.wait_idle();
    }

    /// Finishes queued jobs, stops the workers, and saves every world.
    pub fn shutdown(mut self) -> RegistrySaveReport {
        self.workers.wait_idle();
        self.workers.shutdown();
        self.registry.save_all()
    }

    fn submit_preload(&self, world: &WorldId, coords: Vec<ChunkCoord>) {
        if coords.is_empty() {
            return;
        }
        let manager = self.registry.manager(world);
        let count = coords.len();
        if let Err(e) = self.workers.submit(Job::Preload { manager, coords }) {
            tracing::debug!(world = %world, chunks = count, error = %e, "skipping preload");
        }
    }
}

impl BlockStoreApi for BlockStore {
    fn is_placed(&self, world: &WorldId, pos: BlockPos) -> bool {
        self.registry.manager(world).is_placed(pos)
    }

    fn set_placed(&self, world: &WorldId, pos: BlockPos, placed: bool) {
        self.registry.manager(world).set_placed(pos, placed);
    }

    fn move_blocks(&self, world: &WorldId, positions: &[BlockPos], direction: Direction) {
        self.registry.manager(world).move_blocks(positions, direction);
    }

    fn preload_chunk(&self, world: &WorldId, coord: ChunkCoord) {
        if self.registry.manager(world).contains(coord) {
            return;
        }
        self.submit_preload(world, vec![coord]);
    }

    fn preload_around(&self, world: &WorldId, center: ChunkCoord, radius: u32) {
        let manager = self.registry.manager(world);
        let coords: Vec<ChunkCoord> = chunks_around(center, radius)
            .into_iter()
            .filter(|&coord| !manager.contains(coord))
            .collect();
        self.submit_preload(world, coords);
    }

    fn save_world(&self, world: &WorldId) -> SaveReport {
        self.registry.save_world(world)
    }

    fn save_all(&self) -> RegistrySaveReport {
        self.registry.save_all()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
