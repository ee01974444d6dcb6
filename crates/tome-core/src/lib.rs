//! Tome Core Library
//!
//! This crate provides the core functionality for Tome, a local-first
//! reading tracker: a per-device library of books with reading progress
//! and annotations, reconciled against a remote library server.
//!
//! # Architecture
//!
//! - **SQLite**: Source of truth for local data; always usable offline
//! - **Reconciliation**: progress merges by furthest-position-wins,
//!   annotations by last-writer-wins, library membership by
//!   import-or-upload with no deletion propagation
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let store = LibraryStore::open(&config)?;
//!
//! // Import a book
//! let book = store.import_book_file(&bytes, "Dune", "Frank Herbert", BookFormat::Epub)?;
//!
//! // Record progress
//! let mut book = store.get_book(&book.id)?.unwrap();
//! book.set_progress(42, 412);
//! store.update_book(&book)?;
//! ```
//!
//! # Modules
//!
//! - `models`: books, annotations, and their state machines
//! - `storage`: SQLite-backed library store (main entry point)
//! - `sync`: reconciliation engine, transports, and scheduling
//! - `config`: application configuration

pub mod config;
pub mod models;
pub mod storage;
pub mod sync;

pub use config::Config;
pub use models::{Annotation, AnnotationKind, Book, BookFormat, ReadingStatus};
pub use storage::{LibraryStore, StorageError};
pub use sync::{HttpTransport, SyncDirection, SyncEngine, SyncReport, Transport};
