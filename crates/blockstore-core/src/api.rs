//! Capability interface offered to host integrations.

use crate::coords::{BlockPos, ChunkCoord, Direction, WorldId};
use crate::error::{RegistrySaveReport, SaveReport};
use crate::registry::StoreRegistry;

/// Coordinate-keyed placed flags with move, preload and save primitives.
///
/// Implementations route each call to the world's chunk manager. Preloading
/// is a hint and may be skipped or deferred.
pub trait BlockStoreApi: Send + Sync {
    /// Returns whether the block at `pos` in `world` was placed.
    fn is_placed(&self, world: &WorldId, pos: BlockPos) -> bool;

    /// Records whether the block at `pos` in `world` was placed.
    fn set_placed(&self, world: &WorldId, pos: BlockPos, placed: bool);

    /// Shifts the flags of `positions` one block along `direction`.
    fn move_blocks(&self, world: &WorldId, positions: &[BlockPos], direction: Direction);

    /// Warms the store of one chunk.
    fn preload_chunk(&self, world: &WorldId, coord: ChunkCoord);

    /// Warms every chunk within `radius` rings of `center`.
    fn preload_around(&self, world: &WorldId, center: ChunkCoord, radius: u32);

    /// Flushes the dirty chunks of one world.
    fn save_world(&self, world: &WorldId) -> SaveReport;

    /// Flushes every world.
    fn save_all(&self) -> RegistrySaveReport;
}

/// Synchronous implementation: every call completes before returning.
impl BlockStoreApi for StoreRegistry {
    fn is_placed(&self, world: &WorldId, pos: BlockPos) -> bool {
        self.manager(world).is_placed(pos)
    }

    fn set_placed(&self, world: &WorldId, pos: BlockPos, placed: bool) {
        self.manager(world).set_placed(pos, placed);
    }

    fn move_blocks(&self, world: &WorldId, positions: &[BlockPos], direction: Direction) {
        self.manager(world).move_blocks(positions, direction);
    }

    fn preload_chunk(&self, world: &WorldId, coord: ChunkCoord) {
        self.manager(world).preload_chunk(coord);
    }

    fn preload_around(&self, world: &WorldId, center: ChunkCoord, radius: u32) {
        self.manager(world).preload_around(center, radius);
    }

    fn save_world(&self, world: &WorldId) -> SaveReport {
        StoreRegistry::save_world(self, world)
    }

    fn save_all(&self) -> RegistrySaveReport {
        StoreRegistry::save_all(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
