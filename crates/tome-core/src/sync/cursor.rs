//! Sync scopes and keys
//!
//! Reconciliation is scoped: library membership syncs globally, progress
//! and notes sync per book. A cursor, the last successfully synced
//! timestamp, is kept per (scope, book) pair and bounds incremental
//! pulls. Cursor persistence lives in [`crate::storage::LibraryStore`];
//! this module defines the keying.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A reconciliation scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncScope {
    /// Library membership (which books exist)
    Library,
    /// Reading position within one book
    Progress,
    /// Annotations of one book
    Notes,
}

impl SyncScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncScope::Library => "library",
            SyncScope::Progress => "progress",
            SyncScope::Notes => "notes",
        }
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key identifying one stream of reconciliation passes
///
/// At most one operation is ever in flight per key (single-flight rule).
/// The library scope is book-independent, so its key carries no book id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncKey {
    pub book_id: Option<String>,
    pub scope: SyncScope,
}

impl SyncKey {
    pub fn library() -> Self {
        Self {
            book_id: None,
            scope: SyncScope::Library,
        }
    }

    pub fn progress(book_id: impl Into<String>) -> Self {
        Self {
            book_id: Some(book_id.into()),
            scope: SyncScope::Progress,
        }
    }

    pub fn notes(book_id: impl Into<String>) -> Self {
        Self {
            book_id: Some(book_id.into()),
            scope: SyncScope::Notes,
        }
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.book_id {
            Some(book_id) => write!(f, "{}/{}", self.scope, book_id),
            None => write!(f, "{}", self.scope),
        }
    }
}
