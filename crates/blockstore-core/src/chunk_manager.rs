//! Per-world owner of every resident [`ChunkStore`], keyed by [`ChunkCoord`].
//!
//! The [`ChunkManager`] keeps one slot per chunk in a sharded concurrent map.
//! A slot is inserted atomically in the `Loading` state by the first caller
//! that misses; that caller reads the record from storage and settles the
//! slot, while any other caller for the same chunk blocks on the slot's
//! condition variable. All mutation of a store happens under its slot mutex,
//! so different chunks proceed concurrently and one chunk is serialized.
//!
//! Lock order: a slot mutex is never taken while a map shard guard is held.
//! Operations that lock several slots take them in ascending [`ChunkCoord`]
//! order.

use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rustc_hash::{FxBuildHasher, FxHashSet};

use crate::chunk_store::ChunkStore;
use crate::coords::{BlockPos, ChunkCoord, Direction, LocalCoord, WorldBounds, WorldId};
use crate::error::{SaveReport, StoreError, UnloadReport};
use crate::preload::chunks_around;
use crate::storage::ChunkStorage;

/// Lifecycle of one chunk slot.
enum SlotState {
    /// The first caller is reading the record; others wait.
    Loading,
    /// Storage holds no usable record and nothing was created yet.
    Absent,
    /// The store is in memory.
    Resident(ChunkStore),
    /// Removed from the map; holders must look the chunk up again.
    Evicted,
}

/// A map entry: the slot state plus the condition signalled when loading ends.
struct ChunkSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl ChunkSlot {
    fn loading() -> Self {
        Self {
            state: Mutex::new(SlotState::Loading),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the slot once it has left the `Loading` state.
    fn wait_settled(&self) -> MutexGuard<'_, SlotState> {
        let mut guard = self.lock();
        while matches!(*guard, SlotState::Loading) {
            guard = self
                .ready
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        guard
    }

    /// Ends loading and wakes every waiter.
    fn settle(&self, state: SlotState) {
        *self.lock() = state;
        self.ready.notify_all();
    }
}

/// What a caller may do with a settled slot.
enum Access {
    Ready,
    Missing,
    Retry,
}

/// Exclusive access to one resident store.
///
/// Holding the guard blocks every other operation on the same chunk.
pub struct StoreGuard<'a> {
    guard: MutexGuard<'a, SlotState>,
}

impl<'a> StoreGuard<'a> {
    fn new(guard: MutexGuard<'a, SlotState>) -> Option<Self> {
        matches!(*guard, SlotState::Resident(_)).then_some(Self { guard })
    }
}

impl Deref for StoreGuard<'_> {
    type Target = ChunkStore;

    fn deref(&self) -> &ChunkStore {
        match &*self.guard {
            SlotState::Resident(store) => store,
            _ => unreachable!("StoreGuard over a non-resident slot"),
        }
    }
}

impl DerefMut for StoreGuard<'_> {
    fn deref_mut(&mut self) -> &mut ChunkStore {
        match &mut *self.guard {
            SlotState::Resident(store) => store,
            _ => unreachable!("StoreGuard over a non-resident slot"),
        }
    }
}

/// A reference to the resident store of one chunk.
///
/// The handle stays valid across calls, but the chunk may be unloaded in the
/// meantime; [`StoreHandle::lock`] then returns `None`.
#[derive(Clone)]
pub struct StoreHandle {
    coord: ChunkCoord,
    slot: Arc<ChunkSlot>,
}

impl StoreHandle {
    /// The chunk this handle refers to.
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Locks the store, or returns `None` if it has been unloaded since.
    pub fn lock(&self) -> Option<StoreGuard<'_>> {
        StoreGuard::new(self.slot.wait_settled())
    }

    /// Returns `true` if both handles refer to the same in-memory store.
    pub fn same_store(&self, other: &StoreHandle) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("coord", &self.coord)
            .finish_non_exhaustive()
    }
}

/// Owns the placed-flag stores of one world.
pub struct ChunkManager {
    world: WorldId,
    bounds: WorldBounds,
    storage: Arc<dyn ChunkStorage>,
    slots: DashMap<ChunkCoord, Arc<ChunkSlot>, FxBuildHasher>,
}

impl ChunkManager {
    /// Creates an empty manager for `world`, persisting through `storage`.
    pub fn new(world: WorldId, bounds: WorldBounds, storage: Arc<dyn ChunkStorage>) -> Self {
        Self {
            world,
            bounds,
            storage,
            slots: DashMap::with_hasher(FxBuildHasher),
        }
    }

    /// The world this manager owns.
    pub fn world(&self) -> &WorldId {
        &self.world
    }

    /// The world's vertical bounds.
    pub fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    // -- Store access --------------------------------------------------------

    /// Returns the single in-memory store for `coord`.
    ///
    /// A chunk that is not resident is loaded from storage. If storage has no
    /// usable record, an empty store is created when `create` is set; otherwise
    /// `None` is returned and nothing is allocated.
    pub fn get_or_create_store(&self, coord: ChunkCoord, create: bool) -> Option<StoreHandle> {
        loop {
            let slot = self.slot(coord);
            let access = {
                let mut state = slot.wait_settled();
                self.prepare(&mut state, coord, create)
            };
            match access {
                Access::Ready => return Some(StoreHandle { coord, slot }),
                Access::Missing => return None,
                Access::Retry => continue,
            }
        }
    }

    /// Runs `f` on the store for `coord` while holding its lock.
    ///
    /// Follows the same load-or-create rules as
    /// [`get_or_create_store`](Self::get_or_create_store).
    pub fn with_store<R>(
        &self,
        coord: ChunkCoord,
        create: bool,
        f: impl FnOnce(&mut ChunkStore) -> R,
    ) -> Option<R> {
        loop {
            let slot = self.slot(coord);
            let mut state = slot.wait_settled();
            match self.prepare(&mut state, coord, create) {
                Access::Ready => {
                    let SlotState::Resident(store) = &mut *state else {
                        continue;
                    };
                    return Some(f(store));
                }
                Access::Missing => return None,
                Access::Retry => continue,
            }
        }
    }

    /// Returns whether the block at `pos` was placed.
    ///
    /// Chunks that were never persisted read as all-false without allocating
    /// a store. Positions outside the world's vertical bounds read `false`.
    ///
    /// A miss on a chunk with no record leaves an empty entry behind so later
    /// reads skip storage; [`ChunkManager::forget_absent`] or an unload drops it.
    pub fn is_placed(&self, pos: BlockPos) -> bool {
        let Some(local) = LocalCoord::of(pos, self.bounds) else {
            return false;
        };
        self.with_store(pos.chunk(), false, |store| store.get(local))
            .unwrap_or(false)
    }

    /// Sets the placed flag at `pos`, creating the chunk's store if needed.
    ///
    /// Returns `true` if the flag changed. Writes outside the world's vertical
    /// bounds are ignored.
    pub fn set_placed(&self, pos: BlockPos, placed: bool) -> bool {
        let Some(local) = LocalCoord::of(pos, self.bounds) else {
            tracing::warn!(
                world = %self.world,
                x = pos.x,
                y = pos.y,
                z = pos.z,
                "ignoring placed flag outside world bounds"
            );
            return false;
        };
        self.with_store(pos.chunk(), true, |store| store.set(local, placed))
            .unwrap_or(false)
    }

    /// Shifts the placed flags of `positions` one block along `direction`.
    ///
    /// Every source flag is read before any write. Each destination receives
    /// its source's flag, then every source that is not also a destination is
    /// cleared. All chunks touched are locked in ascending order for the whole
    /// batch and marked dirty. Flags pushed outside the world's vertical
    /// bounds are dropped.
    pub fn move_blocks(&self, positions: &[BlockPos], direction: Direction) {
        let mut sources = positions.to_vec();
        sources.sort_unstable();
        sources.dedup();
        if sources.is_empty() {
            return;
        }

        let touched: Vec<ChunkCoord> = sources
            .iter()
            .flat_map(|pos| {
                let dest = pos.offset(direction).map(BlockPos::chunk);
                std::iter::once(pos.chunk()).chain(dest)
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        loop {
            let slots: Vec<Arc<ChunkSlot>> = touched.iter().map(|&coord| self.slot(coord)).collect();
            if let Some(mut guards) = self.lock_stores(&touched, &slots) {
                self.relocate(&mut guards, &touched, &sources, direction);
                break;
            }
        }

        tracing::trace!(
            world = %self.world,
            blocks = sources.len(),
            chunks = touched.len(),
            ?direction,
            "moved placed flags"
        );
    }

    /// Locks every slot in order, materializing absent stores.
    ///
    /// Returns `None` if a slot was evicted before it could be locked; the
    /// caller resolves the slots again.
    fn lock_stores<'a>(
        &self,
        coords: &[ChunkCoord],
        slots: &'a [Arc<ChunkSlot>],
    ) -> Option<Vec<StoreGuard<'a>>> {
        let mut guards = Vec::with_capacity(slots.len());
        for (&coord, slot) in coords.iter().zip(slots) {
            let mut state = slot.wait_settled();
            if !matches!(self.prepare(&mut state, coord, true), Access::Ready) {
                return None;
            }
            guards.push(StoreGuard::new(state)?);
        }
        Some(guards)
    }

    /// Applies a relocation to locked stores; `touched` is sorted and parallel
    /// to `guards`.
    fn relocate(
        &self,
        guards: &mut [StoreGuard<'_>],
        touched: &[ChunkCoord],
        sources: &[BlockPos],
        direction: Direction,
    ) {
        let locate = |pos: BlockPos| {
            let local = LocalCoord::of(pos, self.bounds)?;
            let index = touched.binary_search(&pos.chunk()).ok()?;
            Some((index, local))
        };

        let snapshot: Vec<(BlockPos, bool)> = sources
            .iter()
            .map(|&pos| {
                let placed = locate(pos).is_some_and(|(i, local)| guards[i].get(local));
                (pos, placed)
            })
            .collect();

        for &(pos, placed) in &snapshot {
            match pos.offset(direction).and_then(locate) {
                Some((i, local)) => {
                    guards[i].set(local, placed);
                }
                None if placed => tracing::debug!(
                    world = %self.world,
                    x = pos.x,
                    y = pos.y,
                    z = pos.z,
                    ?direction,
                    "placed flag moved outside the world, dropping"
                ),
                None => {}
            }
        }

        let destinations: FxHashSet<BlockPos> = sources
            .iter()
            .filter_map(|pos| pos.offset(direction))
            .collect();
        for &(pos, _) in &snapshot {
            if destinations.contains(&pos) {
                continue;
            }
            if let Some((i, local)) = locate(pos) {
                guards[i].set(local, false);
            }
        }

        for guard in guards.iter_mut() {
            guard.mark_dirty();
        }
    }

    // -- Preloading ----------------------------------------------------------

    /// Loads or creates the store for `coord` ahead of use.
    pub fn preload_chunk(&self, coord: ChunkCoord) {
        self.with_store(coord, true, |_| ());
    }

    /// Preloads every chunk within `radius` rings of `center`, nearest first.
    ///
    /// Returns the number of chunks visited.
    pub fn preload_around(&self, center: ChunkCoord, radius: u32) -> usize {
        let coords = chunks_around(center, radius);
        for &coord in &coords {
            self.preload_chunk(coord);
        }
        tracing::debug!(
            world = %self.world,
            cx = center.cx,
            cz = center.cz,
            radius,
            chunks = coords.len(),
            "preloaded around"
        );
        coords.len()
    }

    // -- Persistence ---------------------------------------------------------

    /// Writes every dirty store to storage.
    ///
    /// Waits for in-flight loads to settle. A chunk whose write fails stays
    /// dirty and resident, and is listed in the report; the other chunks are
    /// still written.
    pub fn save_all(&self) -> SaveReport {
        let mut report = SaveReport::default();
        for (coord, slot) in self.snapshot_slots() {
            let mut state = slot.wait_settled();
            if let SlotState::Resident(store) = &mut *state
                && store.is_dirty()
            {
                match self.flush(store) {
                    Ok(()) => report.saved += 1,
                    Err(e) => {
                        tracing::error!(
                            world = %self.world,
                            cx = coord.cx,
                            cz = coord.cz,
                            error = %e,
                            "failed to save chunk"
                        );
                        report.failed.push((coord, e));
                    }
                }
            }
        }

        if report.saved > 0 || !report.is_ok() {
            tracing::info!(
                world = %self.world,
                saved = report.saved,
                failed = report.failed.len(),
                "saved world"
            );
        }
        report
    }

    /// Flushes and removes the chunk at `coord` from memory.
    ///
    /// Returns `Ok(true)` if a resident store was unloaded. A dirty store whose
    /// write fails is kept and the error returned.
    pub fn unload(&self, coord: ChunkCoord) -> Result<bool, StoreError> {
        let Some(slot) = self.slots.get(&coord).map(|entry| Arc::clone(entry.value())) else {
            return Ok(false);
        };

        let mut state = slot.wait_settled();
        let was_resident = match &mut *state {
            SlotState::Resident(store) => {
                if store.is_dirty() {
                    self.flush(store)?;
                }
                true
            }
            SlotState::Evicted => return Ok(false),
            SlotState::Absent | SlotState::Loading => false,
        };
        *state = SlotState::Evicted;
        self.slots.remove_if(&coord, |_, current| Arc::ptr_eq(current, &slot));
        drop(state);

        if was_resident {
            tracing::trace!(world = %self.world, cx = coord.cx, cz = coord.cz, "unloaded chunk");
        }
        Ok(was_resident)
    }

    /// Unloads every chunk farther than `radius` rings from `center`.
    pub fn unload_outside(&self, center: ChunkCoord, radius: u32) -> UnloadReport {
        let mut report = UnloadReport::default();
        let far: Vec<ChunkCoord> = self
            .slots
            .iter()
            .map(|entry| *entry.key())
            .filter(|coord| coord.ring_distance(center) > radius)
            .collect();

        for coord in far {
            match self.unload(coord) {
                Ok(true) => report.unloaded += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        world = %self.world,
                        cx = coord.cx,
                        cz = coord.cz,
                        error = %e,
                        "failed to flush chunk before unloading, keeping it"
                    );
                    report.failed.push((coord, e));
                }
            }
        }

        if report.unloaded > 0 {
            tracing::debug!(world = %self.world, unloaded = report.unloaded, "unloaded distant chunks");
        }
        report
    }

    /// Drops the negative-cache entries left by reads of chunks that were
    /// never persisted. Returns how many were dropped.
    pub fn forget_absent(&self) -> usize {
        let mut forgotten = 0;
        for (coord, slot) in self.snapshot_slots() {
            let mut state = slot.wait_settled();
            if !matches!(*state, SlotState::Absent) {
                continue;
            }
            *state = SlotState::Evicted;
            self.slots.remove_if(&coord, |_, current| Arc::ptr_eq(current, &slot));
            forgotten += 1;
        }
        if forgotten > 0 {
            tracing::trace!(world = %self.world, forgotten, "dropped absent chunk entries");
        }
        forgotten
    }

    // -- Statistics ----------------------------------------------------------

    /// Returns `true` if a store for `coord` is in memory.
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        let Some(slot) = self.slots.get(&coord).map(|entry| Arc::clone(entry.value())) else {
            return false;
        };
        matches!(*slot.wait_settled(), SlotState::Resident(_))
    }

    /// Number of stores in memory.
    pub fn loaded_count(&self) -> usize {
        self.count_resident(|_| true)
    }

    /// Number of chunk entries, counting those that only remember a miss.
    pub fn tracked_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of stores with unsaved changes.
    pub fn dirty_count(&self) -> usize {
        self.count_resident(ChunkStore::is_dirty)
    }

    // -- Internals -----------------------------------------------------------

    /// Returns the slot for `coord`, inserting and loading it on a miss.
    fn slot(&self, coord: ChunkCoord) -> Arc<ChunkSlot> {
        if let Some(entry) = self.slots.get(&coord) {
            return Arc::clone(entry.value());
        }

        let (slot, inserted) = match self.slots.entry(coord) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let slot = Arc::new(ChunkSlot::loading());
                entry.insert(Arc::clone(&slot));
                (slot, true)
            }
        };

        // The shard guard is released here; loading never runs under it.
        if inserted {
            self.load_into(&slot, coord);
        }
        slot
    }

    /// Reads the record for `coord` and settles `slot` with the outcome.
    fn load_into(&self, slot: &ChunkSlot, coord: ChunkCoord) {
        let state = match self.storage.read(&self.world, coord) {
            Ok(Some(bytes)) => match ChunkStore::deserialize_for(&bytes, coord, self.bounds) {
                Ok(store) => {
                    tracing::trace!(world = %self.world, cx = coord.cx, cz = coord.cz, "loaded chunk");
                    SlotState::Resident(store)
                }
                Err(e) => {
                    tracing::warn!(
                        world = %self.world,
                        cx = coord.cx,
                        cz = coord.cz,
                        error = %StoreError::from(e),
                        "discarding unreadable chunk record"
                    );
                    SlotState::Absent
                }
            },
            Ok(None) => SlotState::Absent,
            Err(e) => {
                tracing::warn!(
                    world = %self.world,
                    cx = coord.cx,
                    cz = coord.cz,
                    error = %StoreError::from(e),
                    "failed to read chunk record, treating as never persisted"
                );
                SlotState::Absent
            }
        };
        slot.settle(state);
    }

    /// Materializes an absent slot when `create` is set.
    fn prepare(&self, state: &mut SlotState, coord: ChunkCoord, create: bool) -> Access {
        match *state {
            SlotState::Resident(_) => Access::Ready,
            SlotState::Absent if create => {
                *state = SlotState::Resident(ChunkStore::new(coord, self.bounds));
                tracing::trace!(world = %self.world, cx = coord.cx, cz = coord.cz, "created chunk");
                Access::Ready
            }
            SlotState::Absent => Access::Missing,
            SlotState::Loading | SlotState::Evicted => Access::Retry,
        }
    }

    fn flush(&self, store: &mut ChunkStore) -> Result<(), StoreError> {
        let bytes = store.serialize();
        self.storage.write(&self.world, store.coord(), &bytes)?;
        store.clear_dirty();
        Ok(())
    }

    /// Copies out the current slots, sorted by coordinate, without holding
    /// any shard guard afterwards.
    fn snapshot_slots(&self) -> Vec<(ChunkCoord, Arc<ChunkSlot>)> {
        let mut slots: Vec<_> = self
            .slots
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        slots.sort_unstable_by_key(|(coord, _)| *coord);
        slots
    }

    fn count_resident(&self, pred: impl Fn(&ChunkStore) -> bool) -> usize {
        self.snapshot_slots()
            .iter()
            .filter(|(_, slot)| match &*slot.wait_settled() {
                SlotState::Resident(store) => pred(store),
                _ => false,
            })
            .count()
    }
}

impl std::fmt::Debug for ChunkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkManager")
            .field("world", &self.world)
            .field("bounds", &self.bounds)
            .field("slots", &self.slots.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FailingStorage, MemoryStorage};
    use std::sync::Barrier;

    fn manager_with(storage: Arc<dyn ChunkStorage>) -> ChunkManager {
        ChunkManager::new(WorldId::new("world"), WorldBounds::default(), storage)
    }

    fn memory_manager() -> (ChunkManager, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (manager_with(storage.clone()), storage)
    }

    fn pos(x: i32, y: i32, z: i32) -> BlockPos {
        BlockPos::new(x, y, z)
    }

    #[test]
    fn test_default_is_not_placed_and_allocates_nothing() {
        let (manager, _) = memory_manager();
        assert!(!manager.is_placed(pos(10, 64, -10)));
        assert!(manager.get_or_create_store(ChunkCoord::new(0, -1), false).is_none());
        assert_eq!(manager.loaded_count(), 0);
    }

    #[test]
    fn test_set_then_is_placed() {
        let (manager, _) = memory_manager();
        assert!(manager.set_placed(pos(-1, 0, -1), true));
        assert!(manager.is_placed(pos(-1, 0, -1)));
        assert!(!manager.is_placed(pos(-1, 1, -1)));
        assert_eq!(manager.loaded_count(), 1);
        assert!(manager.contains(ChunkCoord::new(-1, -1)));
    }

    #[test]
    fn test_set_placed_is_idempotent() {
        let (manager, _) = memory_manager();
        assert!(manager.set_placed(pos(3, 3, 3), true));
        assert!(!manager.set_placed(pos(3, 3, 3), true));
        assert!(manager.is_placed(pos(3, 3, 3)));
    }

    #[test]
    fn test_out_of_bounds_y_is_ignored() {
        let (manager, _) = memory_manager();
        assert!(!manager.set_placed(pos(0, 320, 0), true));
        assert!(!manager.is_placed(pos(0, 320, 0)));
        assert!(!manager.is_placed(pos(0, -65, 0)));
        assert_eq!(manager.loaded_count(), 0);
    }

    #[test]
    fn test_get_or_create_returns_the_same_store() {
        let (manager, _) = memory_manager();
        let a = manager.get_or_create_store(ChunkCoord::new(2, 2), true).unwrap();
        let b = manager.get_or_create_store(ChunkCoord::new(2, 2), false).unwrap();
        assert!(a.same_store(&b));

        a.lock().unwrap().set(LocalCoord::new(1, 1, 1), true);
        assert!(b.lock().unwrap().get(LocalCoord::new(1, 1, 1)));
    }

    #[test]
    fn test_save_and_reload_through_storage() {
        let storage = Arc::new(MemoryStorage::new());
        {
            let manager = manager_with(storage.clone());
            manager.set_placed(pos(100, 70, -300), true);
            manager.set_placed(pos(0, -64, 0), true);
            let report = manager.save_all();
            assert!(report.is_ok());
            assert_eq!(report.saved, 2);
            assert_eq!(manager.dirty_count(), 0);
        }

        let manager = manager_with(storage.clone());
        assert!(manager.is_placed(pos(100, 70, -300)));
        assert!(manager.is_placed(pos(0, -64, 0)));
        assert!(!manager.is_placed(pos(101, 70, -300)));
    }

    #[test]
    fn test_clean_stores_are_not_written() {
        let (manager, storage) = memory_manager();
        manager.preload_chunk(ChunkCoord::new(5, 5));
        manager.set_placed(pos(0, 0, 0), false);
        let report = manager.save_all();
        assert_eq!(report.saved, 0);
        assert_eq!(storage.write_count(), 0);
        assert_eq!(manager.loaded_count(), 2);
    }

    #[test]
    fn test_corrupt_record_is_treated_as_absent() {
        let (manager, storage) = memory_manager();
        storage.insert_record(manager.world(), ChunkCoord::new(0, 0), vec![0xde, 0xad]);

        assert!(!manager.is_placed(pos(1, 1, 1)));
        assert!(manager.get_or_create_store(ChunkCoord::new(0, 0), false).is_none());

        manager.set_placed(pos(1, 1, 1), true);
        assert!(manager.save_all().is_ok());
        let record = storage.record(manager.world(), ChunkCoord::new(0, 0)).unwrap();
        assert!(ChunkStore::deserialize(&record).is_ok());
    }

    #[test]
    fn test_record_for_other_chunk_is_rejected() {
        let (manager, storage) = memory_manager();
        let mut other = ChunkStore::new(ChunkCoord::new(9, 9), WorldBounds::default());
        other.set(LocalCoord::new(0, 0, 0), true);
        storage.insert_record(manager.world(), ChunkCoord::new(0, 0), other.serialize());

        assert!(!manager.is_placed(pos(0, -64, 0)));
    }

    #[test]
    fn test_move_line_of_three_with_overlap() {
        let (manager, _) = memory_manager();
        manager.set_placed(pos(0, 10, 0), true);
        manager.set_placed(pos(2, 10, 0), true);

        // Out of order so an in-place shift would clobber a later source.
        manager.move_blocks(&[pos(1, 10, 0), pos(0, 10, 0), pos(2, 10, 0)], Direction::East);

        let row: Vec<bool> = (0..4).map(|x| manager.is_placed(pos(x, 10, 0))).collect();
        assert_eq!(row, [false, true, false, true]);
    }

    #[test]
    fn test_move_carries_unplaced_flags_too() {
        let (manager, _) = memory_manager();
        // Natural block at x=0 pushed into a placed block's former spot.
        manager.set_placed(pos(1, 10, 0), true);
        manager.move_blocks(&[pos(0, 10, 0), pos(1, 10, 0)], Direction::East);

        assert!(!manager.is_placed(pos(0, 10, 0)));
        assert!(!manager.is_placed(pos(1, 10, 0)));
        assert!(manager.is_placed(pos(2, 10, 0)));
    }

    #[test]
    fn test_move_across_chunk_boundary_into_unloaded_chunk() {
        let storage = Arc::new(MemoryStorage::new());
        {
            let manager = manager_with(storage.clone());
            manager.set_placed(pos(15, 0, 0), true);
            manager.save_all();
        }

        let manager = manager_with(storage.clone());
        manager.move_blocks(&[pos(15, 0, 0)], Direction::East);

        assert!(!manager.is_placed(pos(15, 0, 0)));
        assert!(manager.is_placed(pos(16, 0, 0)));
        assert_eq!(manager.dirty_count(), 2);
    }

    #[test]
    fn test_move_down_across_negative_coordinates() {
        let (manager, _) = memory_manager();
        manager.set_placed(pos(-1, 5, -1), true);
        manager.move_blocks(&[pos(-1, 5, -1)], Direction::North);
        assert!(manager.is_placed(pos(-1, 5, -2)));
        assert!(!manager.is_placed(pos(-1, 5, -1)));

        manager.move_blocks(&[pos(-1, 5, -2)], Direction::Down);
        assert!(manager.is_placed(pos(-1, 4, -2)));
    }

    #[test]
    fn test_move_out_of_world_drops_flag() {
        let (manager, _) = memory_manager();
        manager.set_placed(pos(0, 319, 0), true);
        manager.move_blocks(&[pos(0, 319, 0)], Direction::Up);
        assert!(!manager.is_placed(pos(0, 319, 0)));
    }

    #[test]
    fn test_move_past_coordinate_limit_drops_flag() {
        let (manager, _) = memory_manager();
        let edge = pos(i32::MAX, 0, 0);
        manager.set_placed(edge, true);
        manager.set_placed(pos(i32::MAX - 1, 0, 0), true);

        manager.move_blocks(&[pos(i32::MAX - 1, 0, 0), edge], Direction::East);

        assert!(!manager.is_placed(pos(i32::MAX - 1, 0, 0)));
        assert!(manager.is_placed(edge));
        assert!(!manager.is_placed(pos(i32::MIN, 0, 0)));

        manager.move_blocks(&[edge], Direction::East);
        assert!(!manager.is_placed(edge));
    }

    #[test]
    fn test_move_empty_batch_is_noop() {
        let (manager, _) = memory_manager();
        manager.move_blocks(&[], Direction::Up);
        assert_eq!(manager.loaded_count(), 0);
    }

    #[test]
    fn test_duplicate_positions_move_once() {
        let (manager, _) = memory_manager();
        manager.set_placed(pos(4, 4, 4), true);
        manager.move_blocks(&[pos(4, 4, 4), pos(4, 4, 4)], Direction::South);
        assert!(manager.is_placed(pos(4, 4, 5)));
        assert!(!manager.is_placed(pos(4, 4, 4)));
        assert!(!manager.is_placed(pos(4, 4, 6)));
    }

    #[test]
    fn test_concurrent_materialization_yields_one_store() {
        let (manager, storage) = memory_manager();
        let manager = Arc::new(manager);
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let manager = Arc::clone(&manager);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    manager.set_placed(pos(i, 0, 0), true);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(storage.read_count(), 1);
        assert_eq!(manager.loaded_count(), 1);
        for i in 0..8 {
            assert!(manager.is_placed(pos(i, 0, 0)));
        }
    }

    #[test]
    fn test_concurrent_moves_do_not_deadlock() {
        let (manager, _) = memory_manager();
        let manager = Arc::new(manager);
        for x in 0..64 {
            manager.set_placed(pos(x * 8, 0, 0), true);
        }

        let handles: Vec<_> = [Direction::East, Direction::West, Direction::South, Direction::North]
            .into_iter()
            .map(|direction| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let batch: Vec<_> = (0..64).map(|x| pos(x * 8, 1, 0)).collect();
                        manager.move_blocks(&batch, direction);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(manager.loaded_count() > 0);
    }

    #[test]
    fn test_partial_save_reports_exactly_failing_chunks() {
        let storage = Arc::new(FailingStorage::new());
        storage.fail_on(ChunkCoord::new(1, 0));
        let manager = manager_with(storage.clone());

        manager.set_placed(pos(0, 0, 0), true);
        manager.set_placed(pos(16, 0, 0), true);
        manager.set_placed(pos(32, 0, 0), true);

        let report = manager.save_all();
        assert_eq!(report.saved, 2);
        assert_eq!(report.failed_chunks(), vec![ChunkCoord::new(1, 0)]);
        assert!(matches!(report.failed[0].1, StoreError::StorageIo(_)));
        assert_eq!(manager.dirty_count(), 1);

        storage.clear_failures();
        let retry = manager.save_all();
        assert_eq!(retry.saved, 1);
        assert!(retry.is_ok());
    }

    #[test]
    fn test_unload_flushes_dirty_store() {
        let (manager, storage) = memory_manager();
        manager.set_placed(pos(0, 0, 0), true);

        assert!(manager.unload(ChunkCoord::new(0, 0)).unwrap());
        assert_eq!(manager.loaded_count(), 0);
        assert_eq!(storage.write_count(), 1);
        assert!(!manager.unload(ChunkCoord::new(0, 0)).unwrap());

        assert!(manager.is_placed(pos(0, 0, 0)));
    }

    #[test]
    fn test_unload_keeps_store_when_flush_fails() {
        let storage = Arc::new(FailingStorage::new());
        storage.fail_on(ChunkCoord::new(0, 0));
        let manager = manager_with(storage.clone());
        manager.set_placed(pos(0, 0, 0), true);

        assert!(manager.unload(ChunkCoord::new(0, 0)).is_err());
        assert!(manager.contains(ChunkCoord::new(0, 0)));
        assert!(manager.is_placed(pos(0, 0, 0)));
    }

    #[test]
    fn test_stale_handle_after_unload() {
        let (manager, _) = memory_manager();
        let handle = manager.get_or_create_store(ChunkCoord::new(0, 0), true).unwrap();
        manager.unload(ChunkCoord::new(0, 0)).unwrap();
        assert!(handle.lock().is_none());
    }

    #[test]
    fn test_unload_outside_radius() {
        let (manager, _) = memory_manager();
        for cx in -3..=3 {
            manager.set_placed(pos(cx * 16, 0, 0), true);
        }
        let report = manager.unload_outside(ChunkCoord::new(0, 0), 1);
        assert_eq!(report.unloaded, 4);
        assert!(report.failed.is_empty());
        assert_eq!(manager.loaded_count(), 3);
        assert!(manager.is_placed(pos(48, 0, 0)));
    }

    #[test]
    fn test_forget_absent_keeps_resident_stores() {
        let (manager, storage) = memory_manager();
        manager.set_placed(pos(0, 0, 0), true);
        for cx in 1..=10 {
            assert!(!manager.is_placed(pos(cx * 16, 0, 0)));
        }
        assert_eq!(manager.tracked_count(), 11);
        let reads = storage.read_count();

        assert_eq!(manager.forget_absent(), 10);
        assert_eq!(manager.tracked_count(), 1);
        assert_eq!(manager.loaded_count(), 1);
        assert!(manager.is_placed(pos(0, 0, 0)));

        assert!(!manager.is_placed(pos(16, 0, 0)));
        assert_eq!(storage.read_count(), reads + 1);
    }

    #[test]
    fn test_preload_around_materializes_square() {
        let (manager, _) = memory_manager();
        assert_eq!(manager.preload_around(ChunkCoord::new(10, -10), 2), 25);
        assert_eq!(manager.loaded_count(), 25);
        assert_eq!(manager.dirty_count(), 0);
    }
}
