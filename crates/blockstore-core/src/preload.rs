//! Nearest-first ordering for cache-warming loads.
//!
//! Preloading is purely an optimisation: every chunk it touches would be
//! loaded on demand anyway. The queue only decides the order, so that chunks
//! closest to a point of interest become resident first.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::FxHashSet;

use crate::coords::ChunkCoord;

pub use blockstore_config::PreloadStrategy;

/// Priority queue of chunks awaiting preload, ordered by distance.
///
/// Uses a min-heap so that the nearest chunks are loaded first. Ties are
/// broken by coordinate so the order is deterministic.
#[derive(Debug, Default)]
pub struct PreloadQueue {
    /// Min-heap: `(distance_squared, ChunkCoord)`.
    queue: BinaryHeap<Reverse<(u64, ChunkCoord)>>,
    /// Coordinates already in the queue (dedup guard).
    pending: FxHashSet<ChunkCoord>,
}

impl PreloadQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `coord` with its squared distance to the point of interest.
    ///
    /// Duplicate coordinates are ignored.
    pub fn enqueue(&mut self, coord: ChunkCoord, dist_sq: u64) {
        if self.pending.insert(coord) {
            self.queue.push(Reverse((dist_sq, coord)));
        }
    }

    /// Removes `coord` if it is pending. Returns `true` if it was.
    pub fn cancel(&mut self, coord: ChunkCoord) -> bool {
        self.pending.remove(&coord)
    }

    /// Dequeues the nearest chunk.
    pub fn dequeue(&mut self) -> Option<ChunkCoord> {
        while let Some(Reverse((_, coord))) = self.queue.pop() {
            if self.pending.remove(&coord) {
                return Some(coord);
            }
            // Cancelled after being queued.
        }
        None
    }

    /// Drains every pending chunk, nearest first.
    pub fn drain(&mut self) -> Vec<ChunkCoord> {
        std::iter::from_fn(|| self.dequeue()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
    }
}

/// Every chunk within `radius` rings of `center` (a square of side
/// `2 * radius + 1`), nearest first.
pub fn chunks_around(center: ChunkCoord, radius: u32) -> Vec<ChunkCoord> {
    let r = i64::from(radius);
    let mut queue = PreloadQueue::new();
    for dx in -r..=r {
        for dz in -r..=r {
            let (Ok(cx), Ok(cz)) = (
                i32::try_from(i64::from(center.cx) + dx),
                i32::try_from(i64::from(center.cz) + dz),
            ) else {
                continue;
            };
            let coord = ChunkCoord::new(cx, cz);
            queue.enqueue(coord, coord.distance_sq(center));
        }
    }
    queue.drain()
}

/// Radius to preload around players under `strategy`, if any.
pub fn proximity_radius(strategy: PreloadStrategy) -> Option<u32> {
    match strategy {
        PreloadStrategy::ProximityRadius(radius) => Some(radius),
        PreloadStrategy::None | PreloadStrategy::EagerOnLoad => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_orders_by_distance() {
        let mut queue = PreloadQueue::new();
        queue.enqueue(ChunkCoord::new(5, 5), 50);
        queue.enqueue(ChunkCoord::new(1, 0), 1);
        queue.enqueue(ChunkCoord::new(2, 2), 8);

        assert_eq!(queue.dequeue(), Some(ChunkCoord::new(1, 0)));
        assert_eq!(queue.dequeue(), Some(ChunkCoord::new(2, 2)));
        assert_eq!(queue.dequeue(), Some(ChunkCoord::new(5, 5)));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_queue_deduplicates() {
        let mut queue = PreloadQueue::new();
        queue.enqueue(ChunkCoord::new(0, 0), 0);
        queue.enqueue(ChunkCoord::new(0, 0), 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_cancelled_entries_are_skipped() {
        let mut queue = PreloadQueue::new();
        queue.enqueue(ChunkCoord::new(0, 0), 0);
        queue.enqueue(ChunkCoord::new(3, 0), 9);
        assert!(queue.cancel(ChunkCoord::new(0, 0)));
        assert_eq!(queue.drain(), vec![ChunkCoord::new(3, 0)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_chunks_around_is_a_nearest_first_square() {
        let center = ChunkCoord::new(-4, 7);
        let coords = chunks_around(center, 2);
        assert_eq!(coords.len(), 25);
        assert_eq!(coords[0], center);

        let distances: Vec<u64> = coords.iter().map(|c| c.distance_sq(center)).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        assert!(coords.iter().all(|c| c.ring_distance(center) <= 2));
    }

    #[test]
    fn test_chunks_around_radius_zero() {
        assert_eq!(chunks_around(ChunkCoord::new(1, 1), 0), vec![ChunkCoord::new(1, 1)]);
    }

    #[test]
    fn test_chunks_around_clips_at_coordinate_limits() {
        let coords = chunks_around(ChunkCoord::new(i32::MAX, 0), 1);
        assert_eq!(coords.len(), 6);
    }

    #[test]
    fn test_proximity_radius() {
        assert_eq!(proximity_radius(PreloadStrategy::ProximityRadius(3)), Some(3));
        assert_eq!(proximity_radius(PreloadStrategy::EagerOnLoad), None);
        assert_eq!(proximity_radius(PreloadStrategy::None), None);
    }
}
