//! Identity bridge
//!
//! Resolves and caches the 1:1 correspondence between a local book and its
//! remote document. Performs no network calls itself: the reconcilers feed
//! it already-fetched snapshots and it makes the identity decision.
//!
//! Matching is content-based (normalized title and author equality), so a
//! book imported independently on two devices resolves to the same remote
//! document instead of creating a duplicate.

use tracing::debug;

use crate::models::Book;
use crate::storage::{LibraryStore, StorageResult};
use crate::sync::cursor::SyncScope;
use crate::sync::transport::RemoteDocument;

/// Normalize a title or author for matching: lowercase, trimmed, inner
/// whitespace collapsed
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a local book and a remote document describe the same content
pub fn matches(book: &Book, remote: &RemoteDocument) -> bool {
    normalize(&book.title) == normalize(&remote.title)
        && normalize(&book.author) == normalize(&remote.author)
}

/// Find a non-deleted local book matching a remote document
pub fn find_matching_book(
    store: &LibraryStore,
    remote: &RemoteDocument,
) -> StorageResult<Option<Book>> {
    let books = store.active_books()?;
    Ok(books.into_iter().find(|book| matches(book, remote)))
}

/// Record a resolved identity link
///
/// A book holds at most one link. Re-resolving to the same remote id is a
/// no-op; a link to a different document stands until [`invalidate_link`]
/// clears it, so a duplicate remote document cannot flip an established
/// identity back and forth between pulls.
pub fn record_link(store: &LibraryStore, book_id: &str, remote_id: &str) -> StorageResult<()> {
    match store.document_link(book_id)? {
        Some(existing) if existing == remote_id => Ok(()),
        Some(existing) => {
            debug!(book_id, existing, remote_id, "book already linked, keeping existing link");
            Ok(())
        }
        None => {
            debug!(book_id, remote_id, "recording document identity link");
            store.set_document_link(book_id, remote_id)
        }
    }
}

/// Invalidate a book's remote identity
///
/// Called when the linked remote document is confirmed gone. The link is
/// cleared before any new identity can be established, and the book's
/// progress and notes cursors are dropped so remote history is re-fetched
/// under the next identity.
pub fn invalidate_link(store: &LibraryStore, book_id: &str) -> StorageResult<()> {
    debug!(book_id, "invalidating document identity link");
    store.clear_document_link(book_id)?;
    store.reset_cursor(SyncScope::Progress, Some(book_id))?;
    store.reset_cursor(SyncScope::Notes, Some(book_id))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::models::ReadingStatus;

    fn remote(title: &str, author: &str) -> RemoteDocument {
        RemoteDocument {
            id: "remote-1".to_string(),
            title: title.to_string(),
            author: author.to_string(),
            format: None,
            current_page: 0,
            total_pages: 0,
            status: ReadingStatus::Unread,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  The  Left Hand\tof Darkness "), "the left hand of darkness");
        assert_eq!(normalize("URSULA K. LE GUIN"), "ursula k. le guin");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_matches_ignores_case_and_spacing() {
        let book = Book::new("abc", "The Dispossessed", "Ursula K. Le Guin");
        assert!(matches(&book, &remote("the  dispossessed", "ursula k. le guin")));
        assert!(!matches(&book, &remote("The Dispossessed", "Someone Else")));
        assert!(!matches(&book, &remote("The Word for World is Forest", "Ursula K. Le Guin")));
    }

    #[test]
    fn test_find_matching_book_skips_deleted() {
        let store = LibraryStore::open_in_memory().unwrap();
        let book = Book::new("abc", "Dune", "Frank Herbert");
        store.add_book(&book).unwrap();

        let found = find_matching_book(&store, &remote("dune", "frank herbert")).unwrap();
        assert_eq!(found.unwrap().id, "abc");

        store.delete_book("abc").unwrap();
        let found = find_matching_book(&store, &remote("dune", "frank herbert")).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_record_link_idempotent() {
        let store = LibraryStore::open_in_memory().unwrap();
        store.add_book(&Book::new("abc", "Dune", "Frank Herbert")).unwrap();

        record_link(&store, "abc", "remote-1").unwrap();
        record_link(&store, "abc", "remote-1").unwrap();
        assert_eq!(store.document_link("abc").unwrap().as_deref(), Some("remote-1"));
    }

    #[test]
    fn test_record_link_keeps_established_identity() {
        let store = LibraryStore::open_in_memory().unwrap();
        store.add_book(&Book::new("abc", "Dune", "Frank Herbert")).unwrap();

        record_link(&store, "abc", "remote-1").unwrap();
        // A duplicate remote document resolving to the same book does not
        // steal the link
        record_link(&store, "abc", "remote-2").unwrap();
        assert_eq!(store.document_link("abc").unwrap().as_deref(), Some("remote-1"));
    }

    #[test]
    fn test_invalidate_link_clears_link_and_cursors() {
        let store = LibraryStore::open_in_memory().unwrap();
        store.add_book(&Book::new("abc", "Dune", "Frank Herbert")).unwrap();
        store.set_document_link("abc", "remote-1").unwrap();
        store
            .advance_cursor(SyncScope::Progress, Some("abc"), Utc::now())
            .unwrap();
        store
            .advance_cursor(SyncScope::Notes, Some("abc"), Utc::now())
            .unwrap();

        invalidate_link(&store, "abc").unwrap();

        assert!(store.document_link("abc").unwrap().is_none());
        assert!(store.cursor(SyncScope::Progress, Some("abc")).unwrap().is_none());
        assert!(store.cursor(SyncScope::Notes, Some("abc")).unwrap().is_none());
    }
}
