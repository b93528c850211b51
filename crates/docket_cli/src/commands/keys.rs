//! Keys command implementation.

use super::{open_store, CommandResult};
use std::path::Path;

/// Runs the keys command.
pub fn run(path: &Path, prefix: &str) -> CommandResult {
    let (_, store) = open_store(path)?;
    let keys = store.keys_with_prefix(prefix)?;
    for key in &keys {
        println!("{key}");
    }
    tracing::debug!(count = keys.len(), prefix, "listed keys");
    Ok(())
}
