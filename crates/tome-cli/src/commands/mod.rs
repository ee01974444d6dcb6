//! Command handlers

pub mod book;
pub mod config;
pub mod note;
pub mod status;
pub mod sync;

use anyhow::{bail, Result};
use tome_core::LibraryStore;

/// Resolve a full book id or unique prefix
pub fn resolve_book_id(store: &LibraryStore, id: &str) -> Result<String> {
    if store.get_book(id)?.is_some() {
        return Ok(id.to_string());
    }

    let mut matches: Vec<String> = store
        .all_books()?
        .into_iter()
        .filter(|b| b.id.starts_with(id))
        .map(|b| b.id)
        .collect();

    match matches.len() {
        0 => bail!("No book matching '{}'", id),
        1 => Ok(matches.remove(0)),
        n => bail!("Ambiguous id '{}' matches {} books", id, n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tome_core::Book;

    #[test]
    fn test_resolve_book_id_by_prefix() {
        let store = LibraryStore::open_in_memory().unwrap();
        store.add_book(&Book::new("abcdef123", "Dune", "Frank Herbert")).unwrap();
        store.add_book(&Book::new("abd999", "Solaris", "Stanislaw Lem")).unwrap();

        assert_eq!(resolve_book_id(&store, "abcdef123").unwrap(), "abcdef123");
        assert_eq!(resolve_book_id(&store, "abc").unwrap(), "abcdef123");
        assert!(resolve_book_id(&store, "ab").is_err());
        assert!(resolve_book_id(&store, "zzz").is_err());
    }
}
