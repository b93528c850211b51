//! Document commands.

use super::{open_store, CommandResult};
use docket_core::{Document, DocumentStore};
use serde::Serialize;
use std::path::Path;

/// A document rendered for output.
#[derive(Debug, Serialize)]
pub struct DocView {
    /// Document key.
    pub key: String,
    /// Stored version.
    pub version: u64,
    /// Payload converted to JSON.
    pub data: serde_json::Value,
}

/// Loads `key` as a generic payload.
pub fn load(store: &DocumentStore, key: &str) -> CommandResult<Option<DocView>> {
    let Some(doc) = store.get::<ciborium::Value>(key)? else {
        return Ok(None);
    };
    let Document { version, data } = doc;
    Ok(Some(DocView {
        key: key.to_string(),
        version,
        data: serde_json::to_value(&data)?,
    }))
}

/// Runs `doc get`.
pub fn get(path: &Path, key: &str) -> CommandResult {
    let (_, store) = open_store(path)?;
    let view = load(&store, key)?.ok_or_else(|| format!("No document at {key:?}"))?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Runs `doc delete`.
pub fn delete(path: &Path, key: &str) -> CommandResult {
    let (_, store) = open_store(path)?;
    if store.delete(key)? {
        println!("Deleted {key}");
    } else {
        println!("No document at {key:?}");
    }
    Ok(())
}
