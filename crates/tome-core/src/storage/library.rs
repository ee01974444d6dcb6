//! SQLite-backed local library
//!
//! Source of truth for books, annotations, and the sync bookkeeping the
//! reconciliation engine owns: identity links and per-scope cursors.
//!
//! ## Tables
//!
//! - `books` / `annotations` - user data, soft-deleted rather than removed
//! - `document_links` / `note_links` - local <-> remote identity
//! - `sync_cursors` - last-synced timestamps per (scope, book)

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{Annotation, AnnotationKind, Book, BookFormat, ReadingStatus};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema::{init_schema, needs_init};
use crate::sync::cursor::SyncScope;

/// SQLite-backed store for the local library
///
/// The connection sits behind a mutex so the store can be shared with
/// tasks on other threads; every statement runs under a short-lived lock
/// that is never held across an await point.
pub struct LibraryStore {
    conn: Mutex<Connection>,
    books_dir: PathBuf,
}

impl LibraryStore {
    /// Open or create the library database
    pub fn open(config: &Config) -> StorageResult<Self> {
        let path = config.sqlite_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        if needs_init(&conn) {
            init_schema(&conn)?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
            books_dir: config.books_dir(),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            books_dir: std::env::temp_dir().join("tome-books"),
        })
    }

    /// Directory book files are stored in
    pub fn books_dir(&self) -> &Path {
        &self.books_dir
    }

    /// Lock the connection for one statement
    ///
    /// A poisoned lock means another thread panicked mid-call; the
    /// connection itself is still consistent, so the guard is recovered.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ==================== Book Operations ====================

    /// Insert a new book
    pub fn add_book(&self, book: &Book) -> StorageResult<()> {
        self.conn().execute(
            r#"
            INSERT INTO books (id, title, author, format, current_page, total_pages,
                               status, created_at, updated_at, deleted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                book.id,
                book.title,
                book.author,
                book.format.as_str(),
                book.current_page,
                book.total_pages,
                book.status.as_str(),
                book.created_at.timestamp_millis(),
                book.updated_at.timestamp_millis(),
                book.deleted_at.map(|t| t.timestamp_millis()),
            ],
        )?;
        Ok(())
    }

    /// Update an existing book
    pub fn update_book(&self, book: &Book) -> StorageResult<()> {
        self.conn().execute(
            r#"
            UPDATE books
            SET title = ?2, author = ?3, format = ?4, current_page = ?5,
                total_pages = ?6, status = ?7, updated_at = ?8, deleted_at = ?9
            WHERE id = ?1
            "#,
            params![
                book.id,
                book.title,
                book.author,
                book.format.as_str(),
                book.current_page,
                book.total_pages,
                book.status.as_str(),
                book.updated_at.timestamp_millis(),
                book.deleted_at.map(|t| t.timestamp_millis()),
            ],
        )?;
        Ok(())
    }

    /// Get a book by ID
    pub fn get_book(&self, id: &str) -> StorageResult<Option<Book>> {
        let book = self
            .conn()
            .prepare(
                "SELECT id, title, author, format, current_page, total_pages, status,
                        created_at, updated_at, deleted_at
                 FROM books WHERE id = ?",
            )?
            .query_row(params![id], book_from_row)
            .optional()?;
        Ok(book)
    }

    /// Get all books, including soft-deleted ones
    pub fn all_books(&self) -> StorageResult<Vec<Book>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, title, author, format, current_page, total_pages, status,
                    created_at, updated_at, deleted_at
             FROM books ORDER BY created_at DESC",
        )?;
        let books = stmt
            .query_map([], book_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(books)
    }

    /// Get all books that are not soft-deleted
    pub fn active_books(&self) -> StorageResult<Vec<Book>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, title, author, format, current_page, total_pages, status,
                    created_at, updated_at, deleted_at
             FROM books WHERE deleted_at IS NULL ORDER BY created_at DESC",
        )?;
        let books = stmt
            .query_map([], book_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(books)
    }

    /// Soft-delete a book
    pub fn delete_book(&self, id: &str) -> StorageResult<()> {
        let now = Utc::now().timestamp_millis();
        self.conn().execute(
            "UPDATE books SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        Ok(())
    }

    /// Count non-deleted books
    pub fn book_count(&self) -> StorageResult<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM books WHERE deleted_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==================== Book Files ====================

    /// Import book file bytes into the library
    ///
    /// The book id is the hex SHA-256 of the content, so re-importing the
    /// same file is detected before any row is written. Empty payloads are
    /// rejected. Returns the existing book when the content is already
    /// present; a soft-deleted row is reinstated rather than re-inserted,
    /// so reprocessing the same content stays idempotent.
    pub fn import_book_file(
        &self,
        bytes: &[u8],
        title: &str,
        author: &str,
        format: BookFormat,
    ) -> StorageResult<Book> {
        if bytes.is_empty() {
            return Err(StorageError::EmptyFile {
                path: PathBuf::from(title),
            });
        }

        let id = content_hash(bytes);
        if let Some(mut existing) = self.get_book(&id)? {
            if existing.is_deleted() {
                existing.deleted_at = None;
                existing.title = title.to_string();
                existing.author = author.to_string();
                existing.format = format;
                existing.updated_at = Utc::now();
                self.update_book(&existing)?;
                self.write_book_file(&existing, bytes)?;
            }
            return Ok(existing);
        }

        let mut book = Book::new(id, title, author);
        book.format = format;
        self.write_book_file(&book, bytes)?;
        self.add_book(&book)?;
        Ok(book)
    }

    fn write_book_file(&self, book: &Book, bytes: &[u8]) -> StorageResult<()> {
        std::fs::create_dir_all(&self.books_dir).map_err(|e| StorageError::CreateDirectory {
            path: self.books_dir.clone(),
            source: e,
        })?;
        let path = self.book_file_path(book);
        std::fs::write(&path, bytes).map_err(|e| StorageError::WriteError {
            path: path.clone(),
            source: e,
        })?;
        Ok(())
    }

    /// Path of the stored file for a book
    pub fn book_file_path(&self, book: &Book) -> PathBuf {
        self.books_dir
            .join(format!("{}.{}", book.id, book.format.extension()))
    }

    /// Read the stored file bytes for a book
    pub fn read_book_file(&self, book: &Book) -> StorageResult<Vec<u8>> {
        let path = self.book_file_path(book);
        std::fs::read(&path).map_err(|e| StorageError::from_io(e, path))
    }

    // ==================== Annotation Operations ====================

    /// Insert a new annotation
    pub fn add_annotation(&self, annotation: &Annotation) -> StorageResult<()> {
        self.conn().execute(
            r#"
            INSERT INTO annotations (id, book_id, kind, anchor, text, note, color,
                                     created_at, updated_at, deleted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                annotation.id.to_string(),
                annotation.book_id,
                annotation.kind.as_str(),
                annotation.anchor,
                annotation.text,
                annotation.note,
                annotation.color,
                annotation.created_at.timestamp_millis(),
                annotation.updated_at.timestamp_millis(),
                annotation.deleted_at.map(|t| t.timestamp_millis()),
            ],
        )?;
        Ok(())
    }

    /// Update an existing annotation
    pub fn update_annotation(&self, annotation: &Annotation) -> StorageResult<()> {
        self.conn().execute(
            r#"
            UPDATE annotations
            SET kind = ?2, anchor = ?3, text = ?4, note = ?5, color = ?6,
                updated_at = ?7, deleted_at = ?8
            WHERE id = ?1
            "#,
            params![
                annotation.id.to_string(),
                annotation.kind.as_str(),
                annotation.anchor,
                annotation.text,
                annotation.note,
                annotation.color,
                annotation.updated_at.timestamp_millis(),
                annotation.deleted_at.map(|t| t.timestamp_millis()),
            ],
        )?;
        Ok(())
    }

    /// Get an annotation by ID
    pub fn get_annotation(&self, id: Uuid) -> StorageResult<Option<Annotation>> {
        let annotation = self
            .conn()
            .prepare(
                "SELECT id, book_id, kind, anchor, text, note, color,
                        created_at, updated_at, deleted_at
                 FROM annotations WHERE id = ?",
            )?
            .query_row(params![id.to_string()], annotation_from_row)
            .optional()?;
        Ok(annotation)
    }

    /// Get all annotations for a book, including soft-deleted ones
    pub fn annotations_for_book(&self, book_id: &str) -> StorageResult<Vec<Annotation>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, book_id, kind, anchor, text, note, color,
                    created_at, updated_at, deleted_at
             FROM annotations WHERE book_id = ? ORDER BY created_at",
        )?;
        let annotations = stmt
            .query_map(params![book_id], annotation_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(annotations)
    }

    /// Count non-deleted annotations
    pub fn annotation_count(&self) -> StorageResult<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM annotations WHERE deleted_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==================== Identity Links ====================

    /// Get the remote document linked to a book
    pub fn document_link(&self, book_id: &str) -> StorageResult<Option<String>> {
        let remote_id = self
            .conn()
            .prepare("SELECT remote_id FROM document_links WHERE book_id = ?")?
            .query_row(params![book_id], |row| row.get(0))
            .optional()?;
        Ok(remote_id)
    }

    /// Record the identity link between a book and a remote document
    pub fn set_document_link(&self, book_id: &str, remote_id: &str) -> StorageResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO document_links (book_id, remote_id) VALUES (?1, ?2)",
            params![book_id, remote_id],
        )?;
        Ok(())
    }

    /// Reverse lookup: local book already linked to a remote document id
    pub fn book_for_remote(&self, remote_id: &str) -> StorageResult<Option<String>> {
        let book_id = self
            .conn()
            .prepare("SELECT book_id FROM document_links WHERE remote_id = ?")?
            .query_row(params![remote_id], |row| row.get(0))
            .optional()?;
        Ok(book_id)
    }

    /// Clear a book's identity link
    pub fn clear_document_link(&self, book_id: &str) -> StorageResult<()> {
        self.conn().execute(
            "DELETE FROM document_links WHERE book_id = ?",
            params![book_id],
        )?;
        Ok(())
    }

    /// Get the remote note linked to an annotation
    pub fn note_link(&self, annotation_id: Uuid) -> StorageResult<Option<String>> {
        let remote_id = self
            .conn()
            .prepare("SELECT remote_id FROM note_links WHERE annotation_id = ?")?
            .query_row(params![annotation_id.to_string()], |row| row.get(0))
            .optional()?;
        Ok(remote_id)
    }

    /// Record a reconciled annotation <-> remote note pair
    pub fn set_note_link(&self, annotation_id: Uuid, remote_id: &str) -> StorageResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO note_links (annotation_id, remote_id) VALUES (?1, ?2)",
            params![annotation_id.to_string(), remote_id],
        )?;
        Ok(())
    }

    /// Reverse lookup: local annotation already mapped to a remote note id
    pub fn annotation_for_remote(&self, remote_id: &str) -> StorageResult<Option<Uuid>> {
        let id: Option<String> = self
            .conn()
            .prepare("SELECT annotation_id FROM note_links WHERE remote_id = ?")?
            .query_row(params![remote_id], |row| row.get(0))
            .optional()?;
        Ok(id.and_then(|s| Uuid::parse_str(&s).ok()))
    }

    // ==================== Sync Cursors ====================

    /// Get the cursor for a (scope, book) pair
    ///
    /// `book_id` is `None` for the library scope.
    pub fn cursor(
        &self,
        scope: SyncScope,
        book_id: Option<&str>,
    ) -> StorageResult<Option<DateTime<Utc>>> {
        let millis: Option<i64> = self
            .conn()
            .prepare("SELECT synced_at FROM sync_cursors WHERE scope = ?1 AND book_id = ?2")?
            .query_row(params![scope.as_str(), book_id.unwrap_or("")], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(millis.and_then(datetime_from_millis))
    }

    /// Advance a cursor forward
    ///
    /// Cursors are monotonic: an attempt to move one backwards is ignored.
    pub fn advance_cursor(
        &self,
        scope: SyncScope,
        book_id: Option<&str>,
        synced_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.conn().execute(
            r#"
            INSERT INTO sync_cursors (scope, book_id, synced_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(scope, book_id)
            DO UPDATE SET synced_at = MAX(synced_at, excluded.synced_at)
            "#,
            params![
                scope.as_str(),
                book_id.unwrap_or(""),
                synced_at.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    /// Drop a cursor entirely
    ///
    /// Only valid as part of identity invalidation, when the linked remote
    /// entity is confirmed gone and its history must be re-fetched.
    pub fn reset_cursor(&self, scope: SyncScope, book_id: Option<&str>) -> StorageResult<()> {
        self.conn().execute(
            "DELETE FROM sync_cursors WHERE scope = ?1 AND book_id = ?2",
            params![scope.as_str(), book_id.unwrap_or("")],
        )?;
        Ok(())
    }
}

/// Hex SHA-256 of book file content, used as the book id
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn datetime_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

fn book_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
    let format: String = row.get(3)?;
    let status: String = row.get(6)?;
    let created: i64 = row.get(7)?;
    let updated: i64 = row.get(8)?;
    let deleted: Option<i64> = row.get(9)?;

    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        format: BookFormat::from_hint(&format),
        current_page: row.get(4)?,
        total_pages: row.get(5)?,
        status: ReadingStatus::parse(&status),
        created_at: datetime_from_millis(created).unwrap_or_default(),
        updated_at: datetime_from_millis(updated).unwrap_or_default(),
        deleted_at: deleted.and_then(datetime_from_millis),
    })
}

fn annotation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Annotation> {
    let id: String = row.get(0)?;
    let kind: String = row.get(2)?;
    let created: i64 = row.get(7)?;
    let updated: i64 = row.get(8)?;
    let deleted: Option<i64> = row.get(9)?;

    Ok(Annotation {
        id: Uuid::parse_str(&id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        book_id: row.get(1)?,
        kind: AnnotationKind::parse(&kind),
        anchor: row.get(3)?,
        text: row.get(4)?,
        note: row.get(5)?,
        color: row.get(6)?,
        created_at: datetime_from_millis(created).unwrap_or_default(),
        updated_at: datetime_from_millis(updated).unwrap_or_default(),
        deleted_at: deleted.and_then(datetime_from_millis),
    })
}
