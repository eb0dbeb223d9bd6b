//! Host-event shim for the placed-block store.
//!
//! Translates the game host's block, piston, chunk and player events into
//! calls on a [`BlockStoreApi`](blockstore_core::BlockStoreApi), and wraps
//! bulk edit sessions so every block they write is marked natural.

pub mod edit_session;
pub mod event;
pub mod router;

pub use edit_session::{BlockSink, PlacedClearingSink};
pub use event::BlockEvent;
pub use router::EventRouter;
