//! Typed entities over versioned documents.

mod handle;
mod kind;

pub use handle::Entity;
pub use kind::EntityKind;
