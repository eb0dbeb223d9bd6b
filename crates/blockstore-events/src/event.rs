//! Host events that affect placed flags or preloading.

use blockstore_core::{BlockPos, ChunkCoord, Direction, WorldId};

/// A game event reported by the host.
///
/// Positions are block coordinates; hosts floor entity locations before
/// reporting them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockEvent {
    /// A player placed a block.
    Placed { world: WorldId, pos: BlockPos },
    /// A block was broken.
    Broken { world: WorldId, pos: BlockPos },
    /// A block grew or spread naturally into `pos`.
    Grown { world: WorldId, pos: BlockPos },
    /// A piston extended, pushing `moved` one block along `facing`.
    ///
    /// `facing` is `None` for pistons without a direction.
    PistonExtended {
        world: WorldId,
        piston: BlockPos,
        facing: Option<Direction>,
        moved: Vec<BlockPos>,
    },
    /// A piston retracted, pulling `moved` back toward it when sticky.
    PistonRetracted {
        world: WorldId,
        piston: BlockPos,
        facing: Option<Direction>,
        moved: Vec<BlockPos>,
        sticky: bool,
    },
    /// The host loaded a chunk.
    ChunkLoaded { world: WorldId, chunk: ChunkCoord },
    /// A player walked from one position to another.
    PlayerMoved {
        from_world: WorldId,
        from: BlockPos,
        to_world: WorldId,
        to: BlockPos,
    },
    /// A player was teleported.
    PlayerTeleported {
        from_world: WorldId,
        from: BlockPos,
        to_world: WorldId,
        to: BlockPos,
    },
    /// A player joined at `at`.
    PlayerJoined { world: WorldId, at: BlockPos },
}

impl BlockEvent {
    /// The world the event's effects land in.
    pub fn world(&self) -> &WorldId {
        match self {
            BlockEvent::Placed { world, .. }
            | BlockEvent::Broken { world, .. }
            | BlockEvent::Grown { world, .. }
            | BlockEvent::PistonExtended { world, .. }
            | BlockEvent::PistonRetracted { world, .. }
            | BlockEvent::ChunkLoaded { world, .. }
            | BlockEvent::PlayerJoined { world, .. } => world,
            BlockEvent::PlayerMoved { to_world, .. }
            | BlockEvent::PlayerTeleported { to_world, .. } => to_world,
        }
    }
}
