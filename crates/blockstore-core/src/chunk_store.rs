//! Per-chunk record of placed flags with dirty tracking and versioning.
//!
//! A [`ChunkStore`] holds exactly one flag per block of a 16×16 column spanning
//! the world's full height. Flags default to `false` ("generated, not placed").

use crate::coords::{ChunkCoord, LocalCoord, WorldBounds};
use crate::flag_bits::FlagBits;

/// Placed flags for one chunk column.
#[derive(Clone, Debug)]
pub struct ChunkStore {
    /// The chunk this record belongs to.
    coord: ChunkCoord,
    /// Vertical extent the flag grid covers.
    bounds: WorldBounds,
    /// One bit per block, indexed by [`LocalCoord::index`].
    flags: FlagBits,
    /// Set on any change, cleared once persisted.
    dirty: bool,
    /// Monotonically increasing counter, bumped on each change.
    version: u64,
}

impl ChunkStore {
    /// Creates a clean store with every flag cleared.
    pub fn new(coord: ChunkCoord, bounds: WorldBounds) -> Self {
        Self {
            coord,
            bounds,
            flags: FlagBits::new(bounds.chunk_volume()),
            dirty: false,
            version: 0,
        }
    }

    /// Assembles a clean store from decoded parts.
    ///
    /// The caller guarantees `flags.len() == bounds.chunk_volume()`.
    pub(crate) fn from_parts(coord: ChunkCoord, bounds: WorldBounds, flags: FlagBits) -> Self {
        debug_assert_eq!(flags.len(), bounds.chunk_volume());
        Self {
            coord,
            bounds,
            flags,
            dirty: false,
            version: 0,
        }
    }

    /// The chunk coordinate of this record.
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// The vertical bounds this record covers.
    pub fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    /// Returns whether the block at `local` was placed.
    ///
    /// # Panics
    ///
    /// Panics if `local` lies outside this chunk.
    pub fn get(&self, local: LocalCoord) -> bool {
        self.check(local);
        self.flags.get(local.index())
    }

    /// Overwrites the flag at `local`.
    ///
    /// Marks the store dirty and bumps the version only when the value changes.
    /// Returns `true` if it changed.
    ///
    /// # Panics
    ///
    /// Panics if `local` lies outside this chunk.
    pub fn set(&mut self, local: LocalCoord, placed: bool) -> bool {
        self.check(local);
        let previous = self.flags.set(local.index(), placed);
        let changed = previous != placed;
        if changed {
            self.dirty = true;
            self.version += 1;
        }
        changed
    }

    /// Number of placed blocks in this chunk.
    pub fn placed_count(&self) -> usize {
        self.flags.count_ones()
    }

    /// Returns `true` if no block in this chunk is marked placed.
    pub fn is_empty(&self) -> bool {
        self.flags.none()
    }

    /// Local coordinates of every placed block, in index order.
    pub fn placed(&self) -> impl Iterator<Item = LocalCoord> + '_ {
        self.flags.iter_ones().map(LocalCoord::from_index)
    }

    /// Returns `true` if the store changed since it was last persisted.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Forces the store to be written on the next save.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Records a successful persist.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Returns the current version counter.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn flags(&self) -> &FlagBits {
        &self.flags
    }

    fn check(&self, local: LocalCoord) {
        assert!(
            local.in_bounds(self.bounds),
            "local coordinate {local:?} outside chunk {} (height {})",
            self.coord,
            self.bounds.height()
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
