//! Persistent per-block "placed by a player" flags for large sparse voxel worlds.
//!
//! Worlds are split into 16×16 chunk columns. Each column's flags live in a
//! compact [`ChunkStore`] that is loaded from storage on first access, mutated
//! in place, and flushed back when dirty. A [`ChunkManager`] owns the stores of
//! one world; a [`StoreRegistry`] owns one manager per world.

pub mod api;
pub mod autosave;
pub mod chunk_manager;
pub mod chunk_serial;
pub mod chunk_store;
pub mod coords;
pub mod error;
pub mod flag_bits;
pub mod preload;
pub mod registry;
pub mod storage;
pub mod store;
pub mod worker;

pub use api::BlockStoreApi;
pub use autosave::Autosaver;
pub use chunk_manager::{ChunkManager, StoreGuard, StoreHandle};
pub use chunk_serial::{ChunkSerError, FORMAT_VERSION};
pub use chunk_store::ChunkStore;
pub use coords::{BlockPos, CHUNK_EDGE, ChunkCoord, Direction, LocalCoord, WorldBounds, WorldId};
pub use error::{RegistrySaveReport, SaveReport, StoreError, UnloadReport};
pub use flag_bits::FlagBits;
pub use preload::{PreloadQueue, PreloadStrategy, chunks_around};
pub use registry::StoreRegistry;
pub use storage::{ChunkStorage, FileStorage, MemoryStorage};
pub use store::BlockStore;
pub use worker::{Job, WorkerPool};
