//! Entities mirrored into an index of their ids.

mod handle;
mod kind;

pub use handle::{IndexedEntity, ReconcileReport};
pub use kind::{Identified, IndexedKind};
