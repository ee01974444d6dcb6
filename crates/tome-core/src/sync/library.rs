//! Library reconciliation
//!
//! Brings the set of books on this replica and the remote store toward
//! each other without ever deleting on either side. Remote documents the
//! replica has never seen are downloaded and imported; local books with no
//! remote representation are uploaded. Deletions do not propagate.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::models::BookFormat;
use crate::storage::LibraryStore;
use crate::sync::cursor::SyncScope;
use crate::sync::identity;
use crate::sync::progress::to_local_page;
use crate::sync::transport::{RemoteDocument, Transport, UploadMeta};

/// Tag sent with uploads so the remote store can attribute the writer
const ORIGIN_TAG: &str = "tome";

/// Counts from a library pull pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryPull {
    pub imported: usize,
    pub matched: usize,
    pub skipped: usize,
}

/// Pull remote documents since the library cursor and import unknown ones
///
/// A document that matches an existing book (linked, or equal under
/// normalized title/author) is short-circuited: the link is recorded and
/// local content is left alone. Unknown documents are downloaded and
/// imported, with remote status and page overlaid only when the fresh
/// import carries none of its own.
///
/// The cursor advances to the pass start time only when no item was
/// skipped, so a failed download is retried on the next pass without
/// re-importing what already landed.
pub async fn pull_library(store: &LibraryStore, transport: &dyn Transport) -> Result<LibraryPull> {
    let pass_started = Utc::now();
    let since = store.cursor(SyncScope::Library, None)?;

    let batch = transport
        .list_documents(since)
        .await
        .context("Failed to list remote documents")?;

    let mut outcome = LibraryPull::default();
    for remote in &batch {
        match pull_one_document(store, transport, remote).await {
            Ok(DocumentPull::Imported) => outcome.imported += 1,
            Ok(DocumentPull::Matched) => outcome.matched += 1,
            Ok(DocumentPull::Skipped) => outcome.skipped += 1,
            Err(e) => {
                warn!(remote_id = remote.id, "document pull failed: {e:#}");
                outcome.skipped += 1;
            }
        }
    }

    if outcome.skipped == 0 {
        store.advance_cursor(SyncScope::Library, None, pass_started)?;
    }
    info!(
        imported = outcome.imported,
        matched = outcome.matched,
        skipped = outcome.skipped,
        "library pull complete"
    );
    Ok(outcome)
}

enum DocumentPull {
    Imported,
    Matched,
    Skipped,
}

async fn pull_one_document(
    store: &LibraryStore,
    transport: &dyn Transport,
    remote: &RemoteDocument,
) -> Result<DocumentPull> {
    if store.book_for_remote(&remote.id)?.is_some() {
        return Ok(DocumentPull::Matched);
    }
    if let Some(book) = identity::find_matching_book(store, remote)? {
        debug!(book_id = book.id, remote_id = remote.id, "matched existing book");
        identity::record_link(store, &book.id, &remote.id)?;
        return Ok(DocumentPull::Matched);
    }

    let bytes = transport
        .download_file(&remote.id)
        .await
        .context("Failed to download document file")?;
    if bytes.is_empty() {
        warn!(remote_id = remote.id, title = remote.title, "empty download, skipping");
        return Ok(DocumentPull::Skipped);
    }

    let format = remote
        .format
        .as_deref()
        .map(BookFormat::from_hint)
        .unwrap_or(BookFormat::Unknown);
    let mut book = store.import_book_file(&bytes, &remote.title, &remote.author, format)?;
    identity::record_link(store, &book.id, &remote.id)?;

    // A fresh import has no reading state of its own, so the remote
    // snapshot seeds it. Anything the user already did locally wins.
    if !book.has_progress() {
        if remote.current_page > 0 {
            book.set_progress(to_local_page(remote.current_page), remote.total_pages);
        }
        if book.status != remote.status {
            book.set_status(remote.status);
        }
        store.update_book(&book)?;
    }

    info!(book_id = book.id, title = book.title, "imported remote document");
    Ok(DocumentPull::Imported)
}

/// Counts from a library push pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryPush {
    pub uploaded: usize,
    pub matched: usize,
    pub skipped: usize,
}

/// Upload local books the remote store does not have
///
/// Every candidate gets a fresh `search_by_title` existence check right
/// before its upload, so a document created moments ago by another replica
/// is linked instead of duplicated. Failures on one book never stop the
/// pass.
pub async fn push_library(store: &LibraryStore, transport: &dyn Transport) -> Result<LibraryPush> {
    let mut outcome = LibraryPush::default();

    for book in store.active_books()? {
        if store.document_link(&book.id)?.is_some() {
            continue;
        }

        let existing = match transport.search_by_title(&book.title).await {
            Ok(found) => found,
            Err(e) => {
                warn!(book_id = book.id, "existence check failed: {e}");
                outcome.skipped += 1;
                continue;
            }
        };
        if let Some(remote) = existing.filter(|r| identity::matches(&book, r)) {
            debug!(book_id = book.id, remote_id = remote.id, "book already on remote");
            identity::record_link(store, &book.id, &remote.id)?;
            outcome.matched += 1;
            continue;
        }

        let bytes = match store.read_book_file(&book) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(book_id = book.id, "cannot read book file: {e}");
                outcome.skipped += 1;
                continue;
            }
        };
        if bytes.is_empty() {
            warn!(book_id = book.id, title = book.title, "empty book file, not uploading");
            outcome.skipped += 1;
            continue;
        }

        let meta = UploadMeta {
            title: book.title.clone(),
            author: book.author.clone(),
            total_pages: (book.total_pages > 0).then_some(book.total_pages),
            filename: format!("{}.{}", book.id, book.format.extension()),
            origin_tag: ORIGIN_TAG.to_string(),
        };
        match transport.upload_document(&bytes, &meta).await {
            Ok(remote_id) => {
                identity::record_link(store, &book.id, &remote_id)?;
                info!(book_id = book.id, remote_id, "uploaded book");
                outcome.uploaded += 1;
            }
            Err(e) => {
                warn!(book_id = book.id, "upload failed: {e}");
                outcome.skipped += 1;
            }
        }
    }

    if outcome.uploaded > 0 || outcome.matched > 0 {
        info!(
            uploaded = outcome.uploaded,
            matched = outcome.matched,
            skipped = outcome.skipped,
            "library push complete"
        );
    }
    Ok(outcome)
}
