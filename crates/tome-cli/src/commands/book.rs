//! Book command handlers

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use tome_core::{BookFormat, Config, HttpTransport, LibraryStore, SyncEngine};

use crate::commands::resolve_book_id;
use crate::output::Output;

/// List books in the library
pub fn list(store: &LibraryStore, all: bool, output: &Output) -> Result<()> {
    let books = if all {
        store.all_books()?
    } else {
        store.active_books()?
    };
    output.print_books(&books);
    Ok(())
}

/// Show one book
pub fn show(store: &LibraryStore, id: String, output: &Output) -> Result<()> {
    let book_id = resolve_book_id(store, &id)?;
    let book = store
        .get_book(&book_id)?
        .ok_or_else(|| anyhow::anyhow!("Book not found: {}", id))?;
    output.print_book(&book);
    Ok(())
}

/// Import a book file into the library
pub fn import(
    store: &LibraryStore,
    path: String,
    title: Option<String>,
    author: Option<String>,
    output: &Output,
) -> Result<()> {
    let path = Path::new(&path);
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if bytes.is_empty() {
        bail!("{} is empty", path.display());
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Untitled");
    let title = title.unwrap_or_else(|| stem.to_string());
    let author = author.unwrap_or_else(|| "Unknown".to_string());
    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .map(BookFormat::from_hint)
        .unwrap_or_default();

    let book = store.import_book_file(&bytes, &title, &author, format)?;
    output.success(&format!("Imported {} as {}", title, &book.id[..8]));

    if output.is_quiet() {
        println!("{}", book.id);
    }
    Ok(())
}

/// Open a book for reading: pull remote state first, then show where to
/// resume
pub async fn open(config: &Config, store: LibraryStore, id: String, output: &Output) -> Result<()> {
    let book_id = resolve_book_id(&store, &id)?;

    let book = if config.sync_enabled && config.server_url.is_some() {
        let transport = Arc::new(HttpTransport::from_config(config)?);
        let engine = SyncEngine::new(store, transport, config);
        engine.on_book_opened(&book_id).await?
    } else {
        store.get_book(&book_id)?
    };

    let book = book.ok_or_else(|| anyhow::anyhow!("Book not found: {}", id))?;
    output.print_book(&book);
    Ok(())
}
