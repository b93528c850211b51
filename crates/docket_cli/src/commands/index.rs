//! Index commands.
//!
//! Items are treated as strings, the item type `IndexedEntity` stores.

use super::{open_or_create_store, open_store, CommandResult};
use crate::Format;
use docket_core::{DocumentStore, Index, IndexReport, IndexRoot, PageSummary};
use serde::Serialize;
use std::path::Path;

/// Root and page chain of one index.
#[derive(Debug, Serialize)]
pub struct Inspection {
    /// The root document, if present.
    pub root: Option<IndexRoot>,
    /// Reachable pages, head first.
    pub pages: Vec<PageSummary>,
}

fn open_index(store: DocumentStore, name: &str) -> Index<String> {
    Index::new(store, name)
}

/// Collects the root and page chain of `name`.
pub fn inspection(store: &DocumentStore, name: &str) -> CommandResult<Inspection> {
    let index = open_index(store.clone(), name);
    Ok(Inspection {
        root: index.root()?,
        pages: index.pages()?,
    })
}

/// Renders `inspection` as indented text.
pub fn render_text(name: &str, inspection: &Inspection) -> String {
    let Some(root) = &inspection.root else {
        return format!("Index {name:?} does not exist\n");
    };

    let mut out = format!("Index {:?}\n", root.name);
    out.push_str(&format!("  Page size:   {}\n", root.page_size));
    out.push_str(&format!("  Items:       {}\n", root.total_count));
    out.push_str(&format!("  Head page:   {}\n", root.head_page_id.as_deref().unwrap_or("-")));
    out.push_str(&format!("  Tail page:   {}\n", root.tail_page_id.as_deref().unwrap_or("-")));
    out.push_str(&format!("  Pages:       {}\n", inspection.pages.len()));
    for (position, page) in inspection.pages.iter().enumerate() {
        out.push_str(&format!(
            "    #{:<4} {} ({} items)\n",
            position, page.id, page.len
        ));
    }
    out
}

/// Runs `index list`.
pub fn list(path: &Path, name: &str) -> CommandResult {
    let (_, store) = open_store(path)?;
    for item in open_index(store, name).scan() {
        println!("{}", item?);
    }
    Ok(())
}

/// Runs `index add`.
pub fn add(path: &Path, name: &str, items: &[String], page_size: Option<usize>) -> CommandResult {
    let store = open_or_create_store(path)?;
    let index = match page_size {
        Some(size) => Index::with_page_size(store, name, size),
        None => open_index(store, name),
    };
    index.add_batch(items)?;
    println!("Added {} items to {name:?} ({} total)", items.len(), index.count()?);
    Ok(())
}

/// Runs `index remove`.
pub fn remove(path: &Path, name: &str, items: &[String]) -> CommandResult {
    let (_, store) = open_store(path)?;
    let index = open_index(store, name);
    let removed = index.remove_batch(items)?;
    println!("Removed {removed} items from {name:?} ({} left)", index.count()?);
    Ok(())
}

/// Runs `index clear`.
pub fn clear(path: &Path, name: &str) -> CommandResult {
    let (_, store) = open_store(path)?;
    open_index(store, name).clear()?;
    println!("Cleared {name:?}");
    Ok(())
}

/// Runs `index inspect`.
pub fn inspect(path: &Path, name: &str, format: Format) -> CommandResult {
    let (_, store) = open_store(path)?;
    let inspection = inspection(&store, name)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&inspection)?),
        Format::Text => print!("{}", render_text(name, &inspection)),
    }
    Ok(())
}

/// Runs `index verify`. Fails if any invariant is broken.
pub fn verify(path: &Path, name: &str) -> CommandResult {
    let (_, store) = open_store(path)?;
    let report = open_index(store, name).verify()?;
    print_report(&report);

    if report.is_consistent() {
        println!("✓ Index verification passed");
        Ok(())
    } else {
        println!("✗ Index verification failed");
        Err("Verification failed".into())
    }
}

fn print_report(report: &IndexReport) {
    println!("Verifying index {:?}", report.name);
    if !report.root_present {
        println!("  Root not found (nothing to check)");
        return;
    }
    println!("  Root count:    {}", report.total_count);
    println!("  Counted items: {}", report.counted_items);
    println!("  Pages:         {} ({} empty)", report.pages, report.empty_pages);
    for violation in &report.violations {
        println!("  - {violation}");
    }
}
