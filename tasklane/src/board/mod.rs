//! Ordered task board.
//!
//! [`store`] owns the local collections, [`drag`] turns pointer events into
//! reorders, [`queue`] persists orders latest-wins, and [`sync`] ties them
//! to the server.

pub mod drag;
pub mod queue;
pub mod store;
pub mod sync;

pub use drag::{DragAdapter, DragEngine, DragState, DropEffect, DropOutcome};
pub use queue::{ReorderPayload, ReorderQueue, ReorderSink};
pub use store::{Action, CollectionStore};
pub use sync::{Board, BoardConfig, BoardWarning};
