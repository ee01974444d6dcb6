//! SQLite schema for the local library
//!
//! Holds books, annotations, and the sync bookkeeping the engine owns:
//! identity links to remote entities and per-scope cursors.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Books table. Pages are stored 1-based; current_page = 0 means
        -- no recorded progress.
        CREATE TABLE IF NOT EXISTS books (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            format TEXT NOT NULL,
            current_page INTEGER NOT NULL DEFAULT 0,
            total_pages INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'unread',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );

        -- Annotations table (highlights, excerpts, bookmarks)
        CREATE TABLE IF NOT EXISTS annotations (
            id TEXT PRIMARY KEY,
            book_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            anchor TEXT,
            text TEXT NOT NULL,
            note TEXT,
            color TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER,
            FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
        );

        -- Identity links: local book <-> remote document (1:1)
        CREATE TABLE IF NOT EXISTS document_links (
            book_id TEXT PRIMARY KEY,
            remote_id TEXT UNIQUE NOT NULL,
            FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
        );

        -- Identity links: local annotation <-> remote note. This doubles
        -- as the synced-note map: presence means the pair was reconciled.
        CREATE TABLE IF NOT EXISTS note_links (
            annotation_id TEXT PRIMARY KEY,
            remote_id TEXT NOT NULL,
            FOREIGN KEY (annotation_id) REFERENCES annotations(id) ON DELETE CASCADE
        );

        -- Per-scope sync cursors. book_id is part of the primary key, so
        -- the library scope stores '' rather than NULL.
        CREATE TABLE IF NOT EXISTS sync_cursors (
            scope TEXT NOT NULL,
            book_id TEXT NOT NULL DEFAULT '',
            synced_at INTEGER NOT NULL,
            PRIMARY KEY (scope, book_id)
        );

        -- Indexes for common query patterns

        -- Dedup matching during library reconciliation
        CREATE INDEX IF NOT EXISTS idx_books_title ON books(title);

        -- Per-book annotation batches
        CREATE INDEX IF NOT EXISTS idx_annotations_book_id ON annotations(book_id);
        CREATE INDEX IF NOT EXISTS idx_annotations_updated_at ON annotations(updated_at);

        -- Reverse lookup: remote note id -> local annotation
        CREATE INDEX IF NOT EXISTS idx_note_links_remote_id ON note_links(remote_id);
        "#,
    )?;

    // Set schema version
    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"books".to_string()));
        assert!(tables.contains(&"annotations".to_string()));
        assert!(tables.contains(&"document_links".to_string()));
        assert!(tables.contains(&"note_links".to_string()));
        assert!(tables.contains(&"sync_cursors".to_string()));
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();

        assert!(needs_init(&conn));

        init_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
        assert!(!needs_init(&conn));
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_indexes_exist() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(indexes.contains(&"idx_books_title".to_string()));
        assert!(indexes.contains(&"idx_annotations_book_id".to_string()));
        assert!(indexes.contains(&"idx_note_links_remote_id".to_string()));
    }
}
