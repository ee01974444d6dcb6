//! Note command handlers
//!
//! Annotations belong to books; highlights and excerpts are synced, local
//! bookmarks never leave the device.

use anyhow::Result;

use tome_core::LibraryStore;

use crate::commands::resolve_book_id;
use crate::output::Output;

/// List annotations on a book
pub fn list(store: &LibraryStore, book_id: String, output: &Output) -> Result<()> {
    let book_id = resolve_book_id(store, &book_id)?;
    let book = store
        .get_book(&book_id)?
        .ok_or_else(|| anyhow::anyhow!("Book not found: {}", book_id))?;

    let annotations: Vec<_> = store
        .annotations_for_book(&book_id)?
        .into_iter()
        .filter(|a| !a.is_deleted())
        .collect();
    output.print_annotations(&book, &annotations);
    Ok(())
}
