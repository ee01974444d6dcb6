//! Progress reconciliation
//!
//! Merges one remote progress snapshot into local progress per book.
//! Conflict policy is "furthest progress wins": the remote position is
//! adopted only when it is both newer than the last reconciliation and
//! strictly ahead of the local position. The remote store counts pages
//! from 0, local books from 1; the mapping is exact in both directions.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::models::ReadingStatus;
use crate::storage::LibraryStore;
use crate::sync::cursor::SyncScope;
use crate::sync::identity;
use crate::sync::transport::{ProgressUpdate, RemoteDocument, Transport, TransportError};

/// Convert a local 1-based page to the remote 0-based form
pub fn to_remote_page(local: u32) -> u32 {
    local.saturating_sub(1)
}

/// Convert a remote 0-based page to the local 1-based form
pub fn to_local_page(remote: u32) -> u32 {
    remote.saturating_add(1)
}

/// Decision produced by [`merge_progress`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressMerge {
    /// Adopt the remote position (already converted to 1-based)
    Apply {
        page: u32,
        total_pages: u32,
        finish: bool,
    },
    /// Local progress stands
    Keep,
}

/// Decide whether a remote snapshot supersedes local progress
///
/// The remote position is applied iff its update time is strictly newer
/// than the progress cursor and the converted page is strictly ahead of
/// the local page. A missing cursor means this book was never reconciled,
/// so any remote update time qualifies. Status only ever upgrades to
/// finished, and only alongside an applied position.
pub fn merge_progress(
    local_page: u32,
    local_status: ReadingStatus,
    remote: &RemoteDocument,
    cursor: Option<DateTime<Utc>>,
) -> ProgressMerge {
    let newer_than_cursor = cursor.map_or(true, |c| remote.updated_at > c);
    if !newer_than_cursor {
        return ProgressMerge::Keep;
    }

    let remote_page = to_local_page(remote.current_page);
    if remote_page <= local_page {
        return ProgressMerge::Keep;
    }

    let finish =
        remote.status == ReadingStatus::Finished && local_status != ReadingStatus::Finished;

    ProgressMerge::Apply {
        page: remote_page,
        total_pages: remote.total_pages,
        finish,
    }
}

/// Outcome of a progress pull pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressPull {
    /// No identity link exists yet; nothing to pull
    NoLink,
    /// The linked document is gone; the link was invalidated
    LinkInvalidated,
    /// Remote position adopted
    Applied { page: u32 },
    /// Local progress stood
    Unchanged,
}

/// Pull the remote progress snapshot for one book and merge it
///
/// The progress cursor tracks "last reconciled", not "last changed", so it
/// advances whether or not the merge applied anything. A network failure
/// propagates with no state mutation and no cursor advance.
pub async fn pull_progress(
    store: &LibraryStore,
    transport: &dyn Transport,
    book_id: &str,
) -> Result<ProgressPull> {
    let Some(remote_id) = store.document_link(book_id)? else {
        debug!(book_id, "progress pull skipped, no document link");
        return Ok(ProgressPull::NoLink);
    };

    let remote = match transport.get_document(&remote_id).await {
        Ok(doc) => doc,
        Err(TransportError::NotFound) => {
            warn!(book_id, remote_id, "linked document gone, clearing identity");
            identity::invalidate_link(store, book_id)?;
            return Ok(ProgressPull::LinkInvalidated);
        }
        Err(e) => return Err(e).context("Failed to fetch remote document"),
    };

    let Some(mut book) = store.get_book(book_id)? else {
        return Ok(ProgressPull::NoLink);
    };

    let cursor = store.cursor(SyncScope::Progress, Some(book_id))?;
    let decision = merge_progress(book.current_page, book.status, &remote, cursor);

    let outcome = match decision {
        ProgressMerge::Apply {
            page,
            total_pages,
            finish,
        } => {
            info!(book_id, page, "adopting remote reading position");
            book.set_progress(page, total_pages);
            if finish {
                book.set_status(ReadingStatus::Finished);
            }
            store.update_book(&book)?;
            ProgressPull::Applied { page }
        }
        ProgressMerge::Keep => ProgressPull::Unchanged,
    };

    store.advance_cursor(SyncScope::Progress, Some(book_id), Utc::now())?;
    Ok(outcome)
}

/// Outcome of a progress push pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressPush {
    /// No link or no recorded progress; nothing sent
    Skipped,
    /// Position sent to the remote store
    Pushed { remote_page: u32 },
}

/// Push the local reading position for one book
///
/// Sends only when the book actually has progress. The 1-based local page
/// is converted to the remote 0-based form.
pub async fn push_progress(
    store: &LibraryStore,
    transport: &dyn Transport,
    book_id: &str,
) -> Result<ProgressPush> {
    let Some(book) = store.get_book(book_id)? else {
        return Ok(ProgressPush::Skipped);
    };
    if !book.has_progress() {
        debug!(book_id, "progress push skipped, no local progress");
        return Ok(ProgressPush::Skipped);
    }
    let Some(remote_id) = store.document_link(book_id)? else {
        debug!(book_id, "progress push skipped, no document link");
        return Ok(ProgressPush::Skipped);
    };

    let remote_page = to_remote_page(book.current_page);
    let update = ProgressUpdate {
        document_id: remote_id,
        current_page: remote_page,
        status: Some(book.status),
    };

    transport
        .update_progress(&update)
        .await
        .context("Failed to push reading position")?;

    store.advance_cursor(SyncScope::Progress, Some(book_id), Utc::now())?;
    info!(book_id, remote_page, "pushed reading position");
    Ok(ProgressPush::Pushed { remote_page })
}
