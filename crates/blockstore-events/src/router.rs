//! Maps host events onto store operations.
//!
//! Placing marks a block placed; breaking and natural growth clear it.
//! Pistons shift the flags of the blocks they move. Chunk loads and player
//! movement drive preloading according to the configured strategy.

use std::sync::Arc;

use blockstore_core::preload::proximity_radius;
use blockstore_core::{BlockPos, BlockStoreApi, Direction, PreloadStrategy, WorldId};

use crate::event::BlockEvent;

/// Applies host events to a store.
#[derive(Debug)]
pub struct EventRouter<A> {
    api: Arc<A>,
    strategy: PreloadStrategy,
}

impl<A: BlockStoreApi> EventRouter<A> {
    pub fn new(api: Arc<A>, strategy: PreloadStrategy) -> Self {
        Self { api, strategy }
    }

    /// The store events are applied to.
    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn strategy(&self) -> PreloadStrategy {
        self.strategy
    }

    /// Switches the preload strategy, e.g. after a configuration reload.
    pub fn set_strategy(&mut self, strategy: PreloadStrategy) {
        self.strategy = strategy;
    }

    /// Applies one event.
    pub fn handle(&self, event: &BlockEvent) {
        match event {
            BlockEvent::Placed { world, pos } => self.api.set_placed(world, *pos, true),
            BlockEvent::Broken { world, pos } | BlockEvent::Grown { world, pos } => {
                self.api.set_placed(world, *pos, false)
            }
            BlockEvent::PistonExtended {
                world,
                piston,
                facing,
                moved,
            } => self.piston_extended(world, *piston, *facing, moved),
            BlockEvent::PistonRetracted {
                world,
                piston,
                facing,
                moved,
                sticky,
            } => self.piston_retracted(world, *piston, *facing, moved, *sticky),
            BlockEvent::ChunkLoaded { world, chunk } => {
                if self.strategy == PreloadStrategy::EagerOnLoad {
                    self.api.preload_chunk(world, *chunk);
                }
            }
            BlockEvent::PlayerMoved {
                from_world,
                from,
                to_world,
                to,
            }
            | BlockEvent::PlayerTeleported {
                from_world,
                from,
                to_world,
                to,
            } => {
                let crossed = from_world != to_world || from.chunk() != to.chunk();
                if crossed {
                    self.preload_near(to_world, *to);
                }
            }
            BlockEvent::PlayerJoined { world, at } => self.preload_near(world, *at),
        }
    }

    /// Pushes the payload, then gives the arm the piston's own flag.
    fn piston_extended(
        &self,
        world: &WorldId,
        piston: BlockPos,
        facing: Option<Direction>,
        moved: &[BlockPos],
    ) {
        let Some(facing) = facing else {
            tracing::debug!(world = %world, "ignoring extension of undirected piston");
            return;
        };
        self.api.move_blocks(world, moved, facing);
        if let Some(arm) = piston.offset(facing) {
            let piston_placed = self.api.is_placed(world, piston);
            self.api.set_placed(world, arm, piston_placed);
        }
    }

    /// Clears the arm, or pulls a sticky piston's payload back.
    fn piston_retracted(
        &self,
        world: &WorldId,
        piston: BlockPos,
        facing: Option<Direction>,
        moved: &[BlockPos],
        sticky: bool,
    ) {
        let Some(facing) = facing else {
            tracing::debug!(world = %world, "ignoring retraction of undirected piston");
            return;
        };
        if !sticky || moved.is_empty() {
            if let Some(arm) = piston.offset(facing) {
                self.api.set_placed(world, arm, false);
            }
            return;
        }
        self.api.move_blocks(world, moved, facing.opposite());
    }

    fn preload_near(&self, world: &WorldId, pos: BlockPos) {
        if let Some(radius) = proximity_radius(self.strategy) {
            self.api.preload_around(world, pos.chunk(), radius);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
