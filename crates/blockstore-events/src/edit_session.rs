//! Decorator for bulk edit sessions.
//!
//! Blocks written by an editing tool count as natural: the wrapper clears the
//! placed flag of every position before forwarding the write.

use std::sync::Arc;

use blockstore_core::{BlockPos, ChunkManager, StoreRegistry, WorldId};

/// Destination of an edit session's block writes.
pub trait BlockSink<B> {
    type Error;

    /// Writes `block` at `pos`, returning whether the world changed.
    fn set_block(&mut self, pos: BlockPos, block: B) -> Result<bool, Self::Error>;
}

/// Wraps a sink so that every written position is marked natural.
///
/// Resolves the world's manager once; each write then costs one chunk lookup.
#[derive(Debug)]
pub struct PlacedClearingSink<S> {
    manager: Arc<ChunkManager>,
    inner: S,
}

impl<S> PlacedClearingSink<S> {
    pub fn new(manager: Arc<ChunkManager>, inner: S) -> Self {
        Self { manager, inner }
    }

    /// Wraps `inner` for edits in `world`.
    pub fn for_world(registry: &StoreRegistry, world: &WorldId, inner: S) -> Self {
        Self::new(registry.manager(world), inner)
    }

    /// The wrapped sink.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Unwraps the decorator.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<B, S: BlockSink<B>> BlockSink<B> for PlacedClearingSink<S> {
    type Error = S::Error;

    fn set_block(&mut self, pos: BlockPos, block: B) -> Result<bool, Self::Error> {
        self.manager.set_placed(pos, false);
        self.inner.set_block(pos, block)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use blockstore_core::{MemoryStorage, WorldBounds};

    /// Records every write it receives.
    #[derive(Default)]
    struct RecordingSink {
        writes: Vec<(BlockPos, &'static str)>,
    }

    impl BlockSink<&'static str> for RecordingSink {
        type Error = std::convert::Infallible;

        fn set_block(&mut self, pos: BlockPos, block: &'static str) -> Result<bool, Self::Error> {
            self.writes.push((pos, block));
            Ok(true)
        }
    }

    struct RejectingSink;

    impl BlockSink<u16> for RejectingSink {
        type Error = String;

        fn set_block(&mut self, pos: BlockPos, _block: u16) -> Result<bool, Self::Error> {
            Err(format!("cannot edit {pos:?}"))
        }
    }

    fn registry() -> StoreRegistry {
        StoreRegistry::new(Arc::new(MemoryStorage::new()), WorldBounds::default())
    }

    #[test]
    fn test_edit_clears_placed_then_delegates() {
        let registry = registry();
        let world = WorldId::new("world");
        let manager = registry.manager(&world);
        for x in 0..40 {
            manager.set_placed(BlockPos::new(x, 10, 0), true);
        }

        let mut sink = PlacedClearingSink::for_world(&registry, &world, RecordingSink::default());
        for x in 0..40 {
            assert_eq!(sink.set_block(BlockPos::new(x, 10, 0), "stone"), Ok(true));
        }

        assert!((0..40).all(|x| !manager.is_placed(BlockPos::new(x, 10, 0))));
        let inner = sink.into_inner();
        assert_eq!(inner.writes.len(), 40);
        assert_eq!(inner.writes[0], (BlockPos::new(0, 10, 0), "stone"));
    }

    #[test]
    fn test_flag_cleared_even_if_inner_fails() {
        let registry = registry();
        let world = WorldId::new("world");
        let pos = BlockPos::new(3, 3, 3);
        registry.manager(&world).set_placed(pos, true);

        let mut sink = PlacedClearingSink::for_world(&registry, &world, RejectingSink);
        assert!(sink.set_block(pos, 1).is_err());
        assert!(!registry.manager(&world).is_placed(pos));
    }
}
