//! Local storage layer
//!
//! SQLite-backed persistence for books, annotations, identity links, and
//! sync cursors.

mod error;
mod library;
pub mod schema;

pub use error::{StorageError, StorageResult};
pub use library::{content_hash, LibraryStore};
