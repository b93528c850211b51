//! Static description of an indexed entity type.

use crate::entity::EntityKind;

/// A state that carries its own entity id.
pub trait Identified {
    /// Returns the stored id.
    fn id(&self) -> &str;

    /// Overwrites the stored id.
    fn set_id(&mut self, id: String);
}

/// An [`EntityKind`] whose documents are enumerable through an index.
///
/// ```rust
/// use docket_core::{EntityKind, Identified, IndexedKind};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct User {
///     id: String,
///     name: String,
/// }
///
/// impl Identified for User {
///     fn id(&self) -> &str {
///         &self.id
///     }
///     fn set_id(&mut self, id: String) {
///         self.id = id;
///     }
/// }
///
/// struct Users;
///
/// impl EntityKind for Users {
///     const ENTITY_NAME: &'static str = "user";
///     type State = User;
///
///     fn initial_state() -> User {
///         User::default()
///     }
/// }
///
/// impl IndexedKind for Users {
///     const INDEX_NAME: &'static str = "users";
/// }
/// ```
pub trait IndexedKind: EntityKind<State: Identified> {
    /// Name of the index listing every id of this type.
    const INDEX_NAME: &'static str;

    /// Derives the id under which `state` is created.
    fn key_of(state: &Self::State) -> String {
        state.id().to_string()
    }

    /// States created by [`IndexedEntity::ensure_seed`](crate::IndexedEntity::ensure_seed)
    /// when the index is empty.
    fn seed_data() -> Vec<Self::State> {
        Vec::new()
    }
}
