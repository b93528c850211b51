//! Compact command implementation.

use super::{open_store, CommandResult};
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path) -> CommandResult {
    let (backend, _) = open_store(path)?;

    let records_before = backend.record_count();
    let bytes_before = backend.size();
    backend.compact()?;

    println!("Compacted {:?}", path);
    println!("  Records: {} -> {}", records_before, backend.record_count());
    println!("  Size:    {} -> {} bytes", bytes_before, backend.size());
    println!("  Keys:    {}", backend.len());
    Ok(())
}
