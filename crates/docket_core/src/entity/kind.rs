//! Static description of an entity type.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Static configuration of one entity type.
///
/// An implementor is usually a zero-sized marker type:
///
/// ```rust
/// use docket_core::EntityKind;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct Settings {
///     theme: String,
/// }
///
/// struct SettingsKind;
///
/// impl EntityKind for SettingsKind {
///     const ENTITY_NAME: &'static str = "settings";
///     type State = Settings;
///
///     fn initial_state() -> Settings {
///         Settings::default()
///     }
/// }
/// ```
pub trait EntityKind: Send + Sync + 'static {
    /// Namespace for document keys: `<ENTITY_NAME>:<id>`.
    const ENTITY_NAME: &'static str;

    /// The document payload.
    type State: Serialize + DeserializeOwned + Clone + Send;

    /// State reported for an id that has never been saved.
    fn initial_state() -> Self::State;

    /// Returns the document key for `id`.
    fn key_for(id: &str) -> String {
        format!("{}:{}", Self::ENTITY_NAME, id)
    }
}
