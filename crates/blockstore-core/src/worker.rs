//! Background worker pool for preloading and deferred relocation.
//!
//! Jobs are queued on a bounded channel and executed by a fixed set of named
//! threads. Submission never blocks: when the queue is full the job is
//! rejected with [`StoreError::WorkerUnavailable`]. Jobs run against chunk
//! managers and therefore respect per-chunk serialization.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, TrySendError, bounded};

use blockstore_config::WorkerConfig;

use crate::chunk_manager::ChunkManager;
use crate::coords::{BlockPos, ChunkCoord, Direction};
use crate::error::StoreError;

/// Name given to every worker thread.
const THREAD_NAME: &str = "blockstore-worker";

/// Work a background thread can perform.
pub enum Job {
    /// Materialize the listed chunks, in order.
    Preload {
        manager: Arc<ChunkManager>,
        coords: Vec<ChunkCoord>,
    },
    /// Shift placed flags as [`ChunkManager::move_blocks`] does.
    Relocate {
        manager: Arc<ChunkManager>,
        positions: Vec<BlockPos>,
        direction: Direction,
    },
}

impl Job {
    fn run(self) {
        match self {
            Job::Preload { manager, coords } => {
                for coord in coords {
                    manager.preload_chunk(coord);
                }
            }
            Job::Relocate {
                manager,
                positions,
                direction,
            } => manager.move_blocks(&positions, direction),
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::Preload { manager, coords } => f
                .debug_struct("Preload")
                .field("world", manager.world())
                .field("chunks", &coords.len())
                .finish(),
            Job::Relocate {
                manager,
                positions,
                direction,
            } => f
                .debug_struct("Relocate")
                .field("world", manager.world())
                .field("blocks", &positions.len())
                .field("direction", direction)
                .finish(),
        }
    }
}

/// Count of submitted jobs that have not finished.
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn add(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn get(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_zero(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self.idle.wait(count).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Marks a job finished even if it panics.
struct DoneOnDrop<'a>(&'a Pending);

impl Drop for DoneOnDrop<'_> {
    fn drop(&mut self) {
        self.0.done();
    }
}

/// A fixed pool of background threads fed by a bounded queue.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    threads: Vec<JoinHandle<()>>,
    pending: Arc<Pending>,
}

impl WorkerPool {
    /// Spawns `thread_count` workers sharing a queue of `queue_capacity` jobs.
    pub fn new(thread_count: usize, queue_capacity: usize) -> std::io::Result<Self> {
        let (sender, receiver) = bounded::<Job>(queue_capacity.max(1));
        let pending = Arc::new(Pending::default());

        let mut threads = Vec::with_capacity(thread_count);
        for _ in 0..thread_count.max(1) {
            let receiver = receiver.clone();
            let pending = Arc::clone(&pending);
            let handle = std::thread::Builder::new()
                .name(THREAD_NAME.into())
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        let _done = DoneOnDrop(&pending);
                        tracing::trace!(?job, "running background job");
                        job.run();
                    }
                })?;
            threads.push(handle);
        }

        tracing::debug!(threads = threads.len(), queue_capacity, "started worker pool");
        Ok(Self {
            sender: Some(sender),
            threads,
            pending,
        })
    }

    /// Spawns a pool sized by `config`; zero threads means one per spare core.
    pub fn from_config(config: &WorkerConfig) -> std::io::Result<Self> {
        let threads = if config.threads == 0 {
            default_thread_count()
        } else {
            config.threads
        };
        Self::new(threads, config.queue_capacity)
    }

    /// Queues `job` without blocking.
    pub fn submit(&self, job: Job) -> Result<(), StoreError> {
        let sender = self.sender.as_ref().ok_or(StoreError::WorkerUnavailable)?;
        self.pending.add();
        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) | Err(TrySendError::Disconnected(job)) => {
                self.pending.done();
                tracing::debug!(?job, "worker queue unavailable, job rejected");
                Err(StoreError::WorkerUnavailable)
            }
        }
    }

    /// Number of jobs queued or running.
    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    /// Number of worker threads.
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Blocks until every submitted job has finished.
    pub fn wait_idle(&self) {
        self.pending.wait_zero();
    }

    /// Stops accepting jobs, lets queued ones finish, and joins the threads.
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
        tracing::debug!("worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads.len())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Leaves headroom for the host's own threads.
fn default_thread_count() -> usize {
    num_cpus::get().saturating_sub(2).max(1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{WorldBounds, WorldId};
    use crate::storage::MemoryStorage;

    fn manager() -> Arc<ChunkManager> {
        Arc::new(ChunkManager::new(
            WorldId::new("world"),
            WorldBounds::default(),
            Arc::new(MemoryStorage::new()),
        ))
    }

    #[test]
    fn test_preload_job_runs() {
        let pool = WorkerPool::new(2, 16).unwrap();
        let manager = manager();
        pool.submit(Job::Preload {
            manager: Arc::clone(&manager),
            coords: vec![ChunkCoord::new(0, 0), ChunkCoord::new(1, 0)],
        })
        .unwrap();
        pool.wait_idle();
        assert_eq!(manager.loaded_count(), 2);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_relocate_job_runs() {
        let pool = WorkerPool::new(1, 16).unwrap();
        let manager = manager();
        manager.set_placed(BlockPos::new(0, 0, 0), true);
        pool.submit(Job::Relocate {
            manager: Arc::clone(&manager),
            positions: vec![BlockPos::new(0, 0, 0)],
            direction: Direction::Up,
        })
        .unwrap();
        pool.wait_idle();
        assert!(manager.is_placed(BlockPos::new(0, 1, 0)));
        assert!(!manager.is_placed(BlockPos::new(0, 0, 0)));
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let mut pool = WorkerPool::new(1, 4).unwrap();
        pool.shutdown();
        let result = pool.submit(Job::Preload {
            manager: manager(),
            coords: vec![],
        });
        assert!(matches!(result, Err(StoreError::WorkerUnavailable)));
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let mut pool = WorkerPool::new(1, 64).unwrap();
        let manager = manager();
        for cx in 0..32 {
            pool.submit(Job::Preload {
                manager: Arc::clone(&manager),
                coords: vec![ChunkCoord::new(cx, 0)],
            })
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(manager.loaded_count(), 32);
        assert_eq!(pool.thread_count(), 0);
    }

    #[test]
    fn test_from_config_auto_threads() {
        let pool = WorkerPool::from_config(&WorkerConfig::default()).unwrap();
        assert!(pool.thread_count() >= 1);
    }
}
