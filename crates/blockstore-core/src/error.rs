//! Error and report types for the chunk store.

use crate::chunk_serial::ChunkSerError;
use crate::coords::{ChunkCoord, WorldId};

/// Errors surfaced by the store.
///
/// Read-side failures (`CorruptRecord`, `StorageIo` while loading) are
/// recovered inside the manager by treating the chunk as never persisted; they
/// only reach callers through save and unload reports.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A persisted record could not be decoded.
    #[error("corrupt chunk record: {0}")]
    CorruptRecord(#[from] ChunkSerError),

    /// Reading from or writing to the backing medium failed.
    #[error("storage I/O failure: {0}")]
    StorageIo(#[from] std::io::Error),

    /// World bounds outside the supported range.
    #[error("invalid world bounds: min_y {min_y}, height {height}")]
    InvalidBounds {
        /// Requested minimum y.
        min_y: i32,
        /// Requested height.
        height: u32,
    },

    /// The background worker pool is shut down or its queue is full.
    #[error("background worker unavailable")]
    WorkerUnavailable,
}

/// Outcome of flushing the dirty chunks of one world.
#[derive(Debug, Default)]
pub struct SaveReport {
    /// Number of chunk records written.
    pub saved: usize,
    /// Chunks whose write failed; they stay dirty and resident.
    pub failed: Vec<(ChunkCoord, StoreError)>,
}

impl SaveReport {
    /// Returns `true` if every dirty chunk was written.
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }

    /// Coordinates of the chunks that failed to save.
    pub fn failed_chunks(&self) -> Vec<ChunkCoord> {
        self.failed.iter().map(|(coord, _)| *coord).collect()
    }
}

/// Outcome of flushing every world.
#[derive(Debug, Default)]
pub struct RegistrySaveReport {
    /// Per-world results, sorted by world.
    pub worlds: Vec<(WorldId, SaveReport)>,
    /// Failure rewriting the world index, if any.
    pub index_error: Option<StoreError>,
}

impl RegistrySaveReport {
    /// Returns `true` if every world saved cleanly and the index was written.
    pub fn is_ok(&self) -> bool {
        self.index_error.is_none() && self.worlds.iter().all(|(_, r)| r.is_ok())
    }

    /// Total chunk records written across all worlds.
    pub fn saved(&self) -> usize {
        self.worlds.iter().map(|(_, r)| r.saved).sum()
    }

    /// Total chunks that failed to save across all worlds.
    pub fn failed(&self) -> usize {
        self.worlds.iter().map(|(_, r)| r.failed.len()).sum()
    }
}

/// Outcome of evicting chunks from memory.
#[derive(Debug, Default)]
pub struct UnloadReport {
    /// Number of chunks removed from memory.
    pub unloaded: usize,
    /// Dirty chunks that could not be flushed and were therefore kept.
    pub failed: Vec<(ChunkCoord, StoreError)>,
}
