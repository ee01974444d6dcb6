//! Data models for Tome
//!
//! Defines the core local data structures: Book and Annotation.
//! Books are identified by a content hash of the underlying file, so the
//! same file imported on two devices yields the same identifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where the reader currently is in a book
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadingStatus {
    #[default]
    Unread,
    Reading,
    Finished,
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::Unread => "unread",
            ReadingStatus::Reading => "reading",
            ReadingStatus::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "reading" => ReadingStatus::Reading,
            "finished" => ReadingStatus::Finished,
            _ => ReadingStatus::Unread,
        }
    }
}

/// File format of a book
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Epub,
    Pdf,
    Txt,
    #[default]
    Unknown,
}

impl BookFormat {
    /// Guess the format from a file extension or MIME hint
    pub fn from_hint(hint: &str) -> Self {
        let hint = hint.trim().to_lowercase();
        if hint.contains("epub") {
            BookFormat::Epub
        } else if hint.contains("pdf") {
            BookFormat::Pdf
        } else if hint.contains("txt") || hint.contains("text/plain") {
            BookFormat::Txt
        } else {
            BookFormat::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookFormat::Epub => "epub",
            BookFormat::Pdf => "pdf",
            BookFormat::Txt => "txt",
            BookFormat::Unknown => "unknown",
        }
    }

    /// File extension used when storing the book on disk
    pub fn extension(&self) -> &'static str {
        match self {
            BookFormat::Epub => "epub",
            BookFormat::Pdf => "pdf",
            BookFormat::Txt => "txt",
            BookFormat::Unknown => "bin",
        }
    }
}

/// A book in the local library
///
/// Pages are 1-based: `current_page == 0` means no reading progress has
/// been recorded yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Book {
    /// Content hash of the book file (hex SHA-256)
    pub id: String,
    /// Display title
    pub title: String,
    /// Author name
    pub author: String,
    /// File format
    pub format: BookFormat,
    /// Current page (1-based, 0 = none)
    pub current_page: u32,
    /// Total page count (0 = unknown)
    pub total_pages: u32,
    /// Reading status
    pub status: ReadingStatus,
    /// When this book was added locally
    pub created_at: DateTime<Utc>,
    /// When this book was last modified locally
    pub updated_at: DateTime<Utc>,
    /// Soft delete marker
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Book {
    /// Create a new book with the given content-hash id
    pub fn new(id: impl Into<String>, title: impl Into<String>, author: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            author: author.into(),
            format: BookFormat::Unknown,
            current_page: 0,
            total_pages: 0,
            status: ReadingStatus::Unread,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether any reading progress has been recorded
    pub fn has_progress(&self) -> bool {
        self.current_page > 0
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Record a new reading position
    pub fn set_progress(&mut self, current_page: u32, total_pages: u32) {
        self.current_page = current_page;
        if total_pages > 0 {
            self.total_pages = total_pages;
        }
        if self.status == ReadingStatus::Unread && current_page > 0 {
            self.status = ReadingStatus::Reading;
        }
        self.updated_at = Utc::now();
    }

    pub fn set_status(&mut self, status: ReadingStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Mark the book as deleted without removing the row
    pub fn mark_deleted(&mut self) {
        let now = Utc::now();
        self.deleted_at = Some(now);
        self.updated_at = now;
    }
}

/// Kind of annotation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    /// A highlighted passage, anchored to a position
    Highlight,
    /// A free-standing excerpt without a position
    Excerpt,
    /// A saved reading position
    Bookmark,
}

impl AnnotationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationKind::Highlight => "highlight",
            AnnotationKind::Excerpt => "excerpt",
            AnnotationKind::Bookmark => "bookmark",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "highlight" => AnnotationKind::Highlight,
            "bookmark" => AnnotationKind::Bookmark,
            _ => AnnotationKind::Excerpt,
        }
    }

    /// Whether this kind is shared with the remote store
    pub fn is_syncable(&self) -> bool {
        matches!(self, AnnotationKind::Highlight | AnnotationKind::Excerpt)
    }
}

/// A highlight, excerpt, or bookmark attached to a book
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    /// Unique identifier, generated locally and stable across syncs
    pub id: Uuid,
    /// The book this annotation belongs to
    pub book_id: String,
    /// Kind of annotation
    pub kind: AnnotationKind,
    /// Position reference within the book (e.g. an EPUB CFI), if any
    pub anchor: Option<String>,
    /// The highlighted or excerpted text
    pub text: String,
    /// Free-text note the user attached
    pub note: Option<String>,
    /// Highlight color
    pub color: Option<String>,
    /// When this annotation was created
    pub created_at: DateTime<Utc>,
    /// Logical write time, compared during sync
    pub updated_at: DateTime<Utc>,
    /// Soft delete marker; presence means logically deleted
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Annotation {
    /// Create a new annotation on a book
    pub fn new(book_id: impl Into<String>, kind: AnnotationKind, text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            book_id: book_id.into(),
            kind,
            anchor: None,
            text: text.into(),
            note: None,
            color: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Create an annotation with a specific ID (for loading from storage)
    pub fn with_id(
        id: Uuid,
        book_id: impl Into<String>,
        kind: AnnotationKind,
        text: impl Into<String>,
    ) -> Self {
        let mut annotation = Self::new(book_id, kind, text);
        annotation.id = id;
        annotation
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn set_anchor(&mut self, anchor: Option<String>) {
        self.anchor = anchor;
        self.updated_at = Utc::now();
    }

    pub fn set_note(&mut self, note: Option<String>) {
        self.note = note;
        self.updated_at = Utc::now();
    }

    pub fn set_color(&mut self, color: Option<String>) {
        self.color = color;
        self.updated_at = Utc::now();
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.updated_at = Utc::now();
    }

    /// Soft-delete this annotation
    pub fn mark_deleted(&mut self) {
        let now = Utc::now();
        self.deleted_at = Some(now);
        self.updated_at = now;
    }

    /// Reverse a soft delete
    pub fn undelete(&mut self) {
        self.deleted_at = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_new() {
        let book = Book::new("abc123", "Dune", "Frank Herbert");
        assert_eq!(book.id, "abc123");
        assert_eq!(book.title, "Dune");
        assert_eq!(book.status, ReadingStatus::Unread);
        assert!(!book.has_progress());
        assert!(!book.is_deleted());
    }

    #[test]
    fn test_book_set_progress() {
        let mut book = Book::new("abc123", "Dune", "Frank Herbert");
        let original_updated = book.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(10));

        book.set_progress(42, 500);
        assert_eq!(book.current_page, 42);
        assert_eq!(book.total_pages, 500);
        assert_eq!(book.status, ReadingStatus::Reading);
        assert!(book.has_progress());
        assert!(book.updated_at > original_updated);
    }

    #[test]
    fn test_book_progress_keeps_total_when_unknown() {
        let mut book = Book::new("abc123", "Dune", "Frank Herbert");
        book.set_progress(10, 500);
        book.set_progress(20, 0);
        assert_eq!(book.total_pages, 500);
    }

    #[test]
    fn test_book_mark_deleted() {
        let mut book = Book::new("abc123", "Dune", "Frank Herbert");
        book.mark_deleted();
        assert!(book.is_deleted());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            ReadingStatus::Unread,
            ReadingStatus::Reading,
            ReadingStatus::Finished,
        ] {
            assert_eq!(ReadingStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_format_from_hint() {
        assert_eq!(BookFormat::from_hint("epub"), BookFormat::Epub);
        assert_eq!(BookFormat::from_hint("application/epub+zip"), BookFormat::Epub);
        assert_eq!(BookFormat::from_hint("PDF"), BookFormat::Pdf);
        assert_eq!(BookFormat::from_hint("text/plain"), BookFormat::Txt);
        assert_eq!(BookFormat::from_hint("mobi"), BookFormat::Unknown);
    }

    #[test]
    fn test_annotation_new() {
        let annotation = Annotation::new("abc123", AnnotationKind::Highlight, "a passage");
        assert_eq!(annotation.book_id, "abc123");
        assert_eq!(annotation.text, "a passage");
        assert!(annotation.anchor.is_none());
        assert!(!annotation.is_deleted());
    }

    #[test]
    fn test_annotation_with_id() {
        let id = Uuid::new_v4();
        let annotation = Annotation::with_id(id, "abc123", AnnotationKind::Excerpt, "text");
        assert_eq!(annotation.id, id);
    }

    #[test]
    fn test_annotation_soft_delete_and_undelete() {
        let mut annotation = Annotation::new("abc123", AnnotationKind::Highlight, "a passage");
        annotation.mark_deleted();
        assert!(annotation.is_deleted());
        assert_eq!(annotation.deleted_at, Some(annotation.updated_at));

        std::thread::sleep(std::time::Duration::from_millis(10));
        annotation.undelete();
        assert!(!annotation.is_deleted());
        assert!(annotation.updated_at > annotation.created_at);
    }

    #[test]
    fn test_annotation_kind_syncable() {
        assert!(AnnotationKind::Highlight.is_syncable());
        assert!(AnnotationKind::Excerpt.is_syncable());
        assert!(!AnnotationKind::Bookmark.is_syncable());
    }

    #[test]
    fn test_annotation_serialization() {
        let mut annotation = Annotation::new("abc123", AnnotationKind::Highlight, "a passage");
        annotation.set_note(Some("my thought".to_string()));
        annotation.set_color(Some("yellow".to_string()));

        let json = serde_json::to_string(&annotation).unwrap();
        let deserialized: Annotation = serde_json::from_str(&json).unwrap();
        assert_eq!(annotation, deserialized);
    }

    #[test]
    fn test_book_serialization() {
        let mut book = Book::new("abc123", "Dune", "Frank Herbert");
        book.set_progress(42, 500);
        let json = serde_json::to_string(&book).unwrap();
        let deserialized: Book = serde_json::from_str(&json).unwrap();
        assert_eq!(book, deserialized);
    }
}
