//! Backing storage for chunk records.
//!
//! [`ChunkStorage`] is the seam between the manager and the persistent medium.
//! [`FileStorage`] keeps one file per chunk under a directory per world and a
//! human-readable `worlds.ron` index mapping world names to directories.
//! [`MemoryStorage`] keeps records in memory for tests and embedding.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use dashmap::{DashMap, DashSet};

use crate::coords::{ChunkCoord, WorldId};

/// File name of the world index inside the storage root.
pub const INDEX_FILE: &str = "worlds.ron";

/// Extension of chunk record files.
const RECORD_EXT: &str = "bsck";

/// Chunks per region directory edge (`log2`).
const REGION_SHIFT: u32 = 5;

/// A persistent medium for serialized chunk records.
///
/// Implementations must make each `write` atomic from the point of view of a
/// later `read`: a reader sees either the old record or the new one.
pub trait ChunkStorage: Send + Sync {
    /// Reads the record for `coord`, or `None` if it was never written.
    fn read(&self, world: &WorldId, coord: ChunkCoord) -> io::Result<Option<Vec<u8>>>;

    /// Replaces the record for `coord`.
    fn write(&self, world: &WorldId, coord: ChunkCoord, data: &[u8]) -> io::Result<()>;

    /// Persists any world-name bindings the backend keeps.
    fn flush_index(&self) -> io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Filesystem backend
// ---------------------------------------------------------------------------

/// Chunk records on the local filesystem.
///
/// Layout: `<root>/worlds.ron` and
/// `<root>/<world dir>/<rx>.<rz>/<cx>.<cz>.bsck`, where a region directory
/// groups 32×32 chunks.
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
    /// World name -> directory name.
    dirs: DashMap<WorldId, String>,
    /// Directory names already bound to some world.
    taken: DashSet<String>,
    /// Held while the index temp file is written and renamed.
    index_lock: Mutex<()>,
}

impl FileStorage {
    /// Opens (creating if necessary) a storage root and reads its world index.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let storage = Self {
            root,
            dirs: DashMap::new(),
            taken: DashSet::new(),
            index_lock: Mutex::new(()),
        };

        let index_path = storage.root.join(INDEX_FILE);
        if index_path.exists() {
            let contents = std::fs::read_to_string(&index_path)?;
            let index: BTreeMap<String, String> = ron::from_str(&contents)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            for (world, dir) in index {
                storage.taken.insert(dir.clone());
                storage.dirs.insert(WorldId::new(world), dir);
            }
            tracing::debug!(
                root = %storage.root.display(),
                worlds = storage.dirs.len(),
                "loaded world index"
            );
        }

        Ok(storage)
    }

    /// The storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `world`'s records, binding a new one on first use.
    pub fn world_dir(&self, world: &WorldId) -> PathBuf {
        self.root.join(self.dir_name(world))
    }

    /// Path of the record file for `coord` in `world`.
    pub fn record_path(&self, world: &WorldId, coord: ChunkCoord) -> PathBuf {
        let region = format!("{}.{}", coord.cx >> REGION_SHIFT, coord.cz >> REGION_SHIFT);
        self.world_dir(world)
            .join(region)
            .join(format!("{}.{}.{RECORD_EXT}", coord.cx, coord.cz))
    }

    fn dir_name(&self, world: &WorldId) -> String {
        if let Some(dir) = self.dirs.get(world) {
            return dir.clone();
        }
        self.dirs
            .entry(world.clone())
            .or_insert_with(|| {
                let base = sanitize(world.as_str());
                let mut candidate = base.clone();
                let mut n = 1;
                while !self.taken.insert(candidate.clone()) {
                    n += 1;
                    candidate = format!("{base}-{n}");
                }
                tracing::debug!(world = %world, dir = %candidate, "bound world directory");
                candidate
            })
            .clone()
    }
}

impl ChunkStorage for FileStorage {
    fn read(&self, world: &WorldId, coord: ChunkCoord) -> io::Result<Option<Vec<u8>>> {
        match std::fs::read(self.record_path(world, coord)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, world: &WorldId, coord: ChunkCoord, data: &[u8]) -> io::Result<()> {
        let path = self.record_path(world, coord);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_replacing(&path, data)
    }

    fn flush_index(&self) -> io::Result<()> {
        let _guard = self.index_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let index: BTreeMap<String, String> = self
            .dirs
            .iter()
            .map(|entry| (entry.key().as_str().to_string(), entry.value().clone()))
            .collect();
        let pretty = ron::ser::PrettyConfig::new().depth_limit(2);
        let serialized = ron::ser::to_string_pretty(&index, pretty)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        write_replacing(&self.root.join(INDEX_FILE), serialized.as_bytes())
    }
}

/// Writes to a sibling temp file, then renames it over `path`.
fn write_replacing(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)
}

/// Maps a world name onto a portable directory name.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "world".to_string()
    } else {
        cleaned
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Chunk records held in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: DashMap<(WorldId, ChunkCoord), Vec<u8>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the record for `coord`, if any.
    pub fn record(&self, world: &WorldId, coord: ChunkCoord) -> Option<Vec<u8>> {
        self.records
            .get(&(world.clone(), coord))
            .map(|r| r.value().clone())
    }

    /// Stores a raw record, bypassing the manager.
    pub fn insert_record(&self, world: &WorldId, coord: ChunkCoord, data: Vec<u8>) {
        self.records.insert((world.clone(), coord), data);
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no record is held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of `read` calls served.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of `write` calls served.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl ChunkStorage for MemoryStorage {
    fn read(&self, world: &WorldId, coord: ChunkCoord) -> io::Result<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.record(world, coord))
    }

    fn write(&self, world: &WorldId, coord: ChunkCoord, data: &[u8]) -> io::Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.records.insert((world.clone(), coord), data.to_vec());
        Ok(())
    }
}

/// Memory storage whose writes fail for selected chunks.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FailingStorage {
    inner: MemoryStorage,
    failing: std::sync::Mutex<rustc_hash::FxHashSet<ChunkCoord>>,
}

#[cfg(test)]
impl FailingStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_on(&self, coord: ChunkCoord) {
        self.failing.lock().unwrap().insert(coord);
    }

    pub(crate) fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[cfg(test)]
impl ChunkStorage for FailingStorage {
    fn read(&self, world: &WorldId, coord: ChunkCoord) -> io::Result<Option<Vec<u8>>> {
        self.inner.read(world, coord)
    }

    fn write(&self, world: &WorldId, coord: ChunkCoord, data: &[u8]) -> io::Result<()> {
        if self.failing.lock().unwrap().contains(&coord) {
            return Err(io::Error::other(format!("injected write failure at {coord}")));
        }
        self.inner.write(world, coord, data)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
