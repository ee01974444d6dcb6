//! Notes reconciliation
//!
//! Merges a batch of remote notes into the local annotation set, per book,
//! with last-writer-wins at note granularity and soft-delete arbitration.
//! Ties favor local, so re-delivering an already-merged batch changes
//! nothing.
//!
//! A remote note's metadata bag determines its lineage: an origin id means
//! some replica created it from a local annotation and the note keeps that
//! identity everywhere; no origin id means the note was created outside
//! any replica and is adopted as a foreign excerpt.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{Annotation, AnnotationKind};
use crate::storage::LibraryStore;
use crate::sync::cursor::SyncScope;
use crate::sync::identity;
use crate::sync::transport::{NoteMetadata, RemoteNote, Transport, TransportError};

/// Decision produced by [`merge_note`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteAction {
    /// Reconstruct a replica-created note this replica has never seen
    InsertNative,
    /// Adopt a note created outside any replica
    InsertForeign,
    /// Apply the remote soft delete
    Delete,
    /// Remote edit is strictly newer; overwrite local content
    Overwrite,
    /// Local annotation is authoritative; no change
    Keep,
}

/// Decide how one remote note merges against its local counterpart
///
/// `local` must already be resolved: by origin id for replica-created
/// notes, by the synced-identifier map for foreign ones. Equal timestamps
/// resolve to `Keep`: local is authoritative on ties, which makes
/// re-merging the same batch a no-op.
pub fn merge_note(local: Option<&Annotation>, remote: &RemoteNote) -> NoteAction {
    let metadata = remote.metadata.as_ref();
    let origin_id = metadata.and_then(|m| m.origin_id);

    match (origin_id, local) {
        // Foreign note, not yet mapped locally
        (None, None) => NoteAction::InsertForeign,
        // Foreign note already adopted; the remote store never edits these
        (None, Some(_)) => NoteAction::Keep,
        // Replica-created note unknown to this replica
        (Some(_), None) => NoteAction::InsertNative,
        (Some(_), Some(local)) => {
            if let Some(deleted_at) = metadata.and_then(|m| m.deleted_at) {
                // A later local edit (or un-delete) beats the remote deletion
                if local.updated_at > deleted_at {
                    return NoteAction::Keep;
                }
                if local.is_deleted() {
                    return NoteAction::Keep;
                }
                return NoteAction::Delete;
            }

            let remote_updated = metadata
                .and_then(|m| m.updated_at)
                .unwrap_or(remote.updated_at);
            if remote_updated > local.updated_at {
                NoteAction::Overwrite
            } else {
                NoteAction::Keep
            }
        }
    }
}

/// Counts from a notes pull pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotesMerged {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub kept: usize,
}

/// Outcome of a notes pull pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotesPull {
    /// No identity link exists yet; nothing to pull
    NoLink,
    /// The linked document is gone; the link was invalidated
    LinkInvalidated,
    /// Batch merged
    Merged(NotesMerged),
}

/// Pull remote notes for one book since the notes cursor and merge them
///
/// Every reconciled pair is recorded in the synced-identifier map so
/// re-delivery is recognized. The cursor advances to the pass start time
/// once the batch is processed; an empty batch still advances it. A
/// network failure propagates before anything is mutated.
pub async fn pull_notes(
    store: &LibraryStore,
    transport: &dyn Transport,
    book_id: &str,
) -> Result<NotesPull> {
    let Some(remote_id) = store.document_link(book_id)? else {
        debug!(book_id, "notes pull skipped, no document link");
        return Ok(NotesPull::NoLink);
    };

    let pass_started = Utc::now();
    let since = store.cursor(SyncScope::Notes, Some(book_id))?;

    let batch = match transport.list_notes(&remote_id, since).await {
        Ok(batch) => batch,
        Err(TransportError::NotFound) => {
            warn!(book_id, remote_id, "linked document gone, clearing identity");
            identity::invalidate_link(store, book_id)?;
            return Ok(NotesPull::LinkInvalidated);
        }
        Err(e) => return Err(e).context("Failed to list remote notes"),
    };

    let mut merged = NotesMerged::default();
    for remote in &batch {
        apply_remote_note(store, book_id, remote, &mut merged)?;
    }

    store.advance_cursor(SyncScope::Notes, Some(book_id), pass_started)?;
    info!(
        book_id,
        inserted = merged.inserted,
        updated = merged.updated,
        deleted = merged.deleted,
        "notes pull complete"
    );
    Ok(NotesPull::Merged(merged))
}

fn apply_remote_note(
    store: &LibraryStore,
    book_id: &str,
    remote: &RemoteNote,
    merged: &mut NotesMerged,
) -> Result<()> {
    let metadata = remote.metadata.as_ref();
    let origin_id = metadata.and_then(|m| m.origin_id);

    let local = match origin_id {
        Some(id) => store.get_annotation(id)?,
        None => match store.annotation_for_remote(&remote.id)? {
            Some(id) => store.get_annotation(id)?,
            None => None,
        },
    };

    match merge_note(local.as_ref(), remote) {
        NoteAction::InsertNative => {
            // Reconstruct with the originating replica's identity and
            // logical timestamps, not this replica's clock.
            let origin = origin_id.unwrap_or_else(Uuid::new_v4);
            let annotation = Annotation {
                id: origin,
                book_id: book_id.to_string(),
                kind: metadata
                    .and_then(|m| m.kind)
                    .unwrap_or(AnnotationKind::Highlight),
                anchor: metadata.and_then(|m| m.anchor.clone()),
                text: remote.content.clone(),
                note: metadata.and_then(|m| m.note.clone()),
                color: metadata.and_then(|m| m.color.clone()),
                created_at: remote.created_at,
                updated_at: metadata
                    .and_then(|m| m.updated_at)
                    .unwrap_or(remote.updated_at),
                deleted_at: metadata.and_then(|m| m.deleted_at),
            };
            store.add_annotation(&annotation)?;
            store.set_note_link(annotation.id, &remote.id)?;
            merged.inserted += 1;
        }
        NoteAction::InsertForeign => {
            // No anchor was supplied, so the note arrives as an excerpt
            let annotation = Annotation {
                id: Uuid::new_v4(),
                book_id: book_id.to_string(),
                kind: AnnotationKind::Excerpt,
                anchor: None,
                text: remote.content.clone(),
                note: None,
                color: None,
                created_at: remote.created_at,
                updated_at: remote.updated_at,
                deleted_at: None,
            };
            store.add_annotation(&annotation)?;
            store.set_note_link(annotation.id, &remote.id)?;
            merged.inserted += 1;
        }
        NoteAction::Delete => {
            let mut annotation = local.expect("delete action requires a local annotation");
            let deleted_at = metadata
                .and_then(|m| m.deleted_at)
                .unwrap_or(remote.updated_at);
            annotation.deleted_at = Some(deleted_at);
            if deleted_at > annotation.updated_at {
                annotation.updated_at = deleted_at;
            }
            store.update_annotation(&annotation)?;
            store.set_note_link(annotation.id, &remote.id)?;
            merged.deleted += 1;
        }
        NoteAction::Overwrite => {
            let mut annotation = local.expect("overwrite action requires a local annotation");
            annotation.text = remote.content.clone();
            if let Some(m) = metadata {
                if let Some(kind) = m.kind {
                    annotation.kind = kind;
                }
                if m.anchor.is_some() {
                    annotation.anchor = m.anchor.clone();
                }
                if m.note.is_some() {
                    annotation.note = m.note.clone();
                }
                if m.color.is_some() {
                    annotation.color = m.color.clone();
                }
            }
            annotation.updated_at = metadata
                .and_then(|m| m.updated_at)
                .unwrap_or(remote.updated_at);
            // A newer remote edit supersedes an older local deletion
            annotation.deleted_at = None;
            store.update_annotation(&annotation)?;
            store.set_note_link(annotation.id, &remote.id)?;
            merged.updated += 1;
        }
        NoteAction::Keep => {
            if let Some(annotation) = local {
                store.set_note_link(annotation.id, &remote.id)?;
            }
            merged.kept += 1;
        }
    }

    Ok(())
}

/// Outcome of a notes push pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotesPush {
    pub pushed: usize,
    pub failed: usize,
}

/// Push unsynced local annotations for one book
///
/// Candidates are syncable kinds (highlight/excerpt) with non-empty text,
/// not soft-deleted, and not yet present in the synced-identifier map.
/// Creation and metadata attachment are two separate remote operations;
/// the identity pair is recorded only once both succeed, so a failed
/// attach is retried wholesale on the next pass instead of leaving an
/// untagged remote note behind. If creation succeeds without delivering
/// an id, the local id is recorded as a placeholder so the note is still
/// marked attempted.
pub async fn push_notes(
    store: &LibraryStore,
    transport: &dyn Transport,
    book_id: &str,
) -> Result<NotesPush> {
    let Some(remote_id) = store.document_link(book_id)? else {
        debug!(book_id, "notes push skipped, no document link");
        return Ok(NotesPush::default());
    };

    let mut outcome = NotesPush::default();
    for annotation in store.annotations_for_book(book_id)? {
        if !annotation.kind.is_syncable()
            || annotation.is_deleted()
            || annotation.text.trim().is_empty()
            || store.note_link(annotation.id)?.is_some()
        {
            continue;
        }

        match push_one_note(store, transport, &remote_id, &annotation).await {
            Ok(()) => outcome.pushed += 1,
            Err(e) => {
                warn!(book_id, annotation_id = %annotation.id, "note push failed: {e:#}");
                outcome.failed += 1;
            }
        }
    }

    if outcome.pushed > 0 {
        info!(book_id, pushed = outcome.pushed, "notes push complete");
    }
    Ok(outcome)
}

async fn push_one_note(
    store: &LibraryStore,
    transport: &dyn Transport,
    document_id: &str,
    annotation: &Annotation,
) -> Result<()> {
    let created_id = transport
        .create_note(document_id, &annotation.text)
        .await
        .context("Failed to create remote note")?;

    if created_id.is_empty() {
        // Creation went through but no id came back. Mark the note as
        // attempted under its own id so it is not re-created forever.
        warn!(annotation_id = %annotation.id, "note created without an id, recording placeholder");
        store.set_note_link(annotation.id, &annotation.id.to_string())?;
        return Ok(());
    }

    let metadata = NoteMetadata {
        origin_id: Some(annotation.id),
        updated_at: Some(annotation.updated_at),
        deleted_at: annotation.deleted_at,
        anchor: annotation.anchor.clone(),
        color: annotation.color.clone(),
        kind: Some(annotation.kind),
        note: annotation.note.clone(),
    };

    transport
        .update_note(&created_id, &metadata)
        .await
        .context("Failed to attach note metadata")?;

    store.set_note_link(annotation.id, &created_id)?;
    Ok(())
}
