//! Storage backends for bmdb.
//!
//! Every backend implements the same [`Storage`] trait so the table layer,
//! the WAL wrapper, and tests can swap one for another. `binary` is the
//! production single-file format; `memory` is the zero-persistence
//! in-process map; `json` is the reference on-disk format used by
//! `bmdb-durability`'s default WAL base and by tooling that wants a
//! human-readable file.

pub mod binary;
pub mod json;
pub mod memory;

pub use binary::BinaryFileStore;
pub use json::JsonFileStore;
pub use memory::InMemoryStorage;

use bmdb_core::{Result, Value};
use std::collections::BTreeMap;

/// A table's logical contents: doc-id to body, in doc-id order.
pub type TableSnapshot = BTreeMap<u64, Value>;

/// The storage contract every backend implements.
///
/// All methods take `&mut self`: chunk caches, file handles, and delta
/// logs are private mutable state with no cross-table sharing.
pub trait Storage {
    /// Every document in `table`, keyed by doc-id.
    fn read_table(&mut self, table: &str) -> Result<TableSnapshot>;

    /// Replace `table`'s contents with `docs`, computing add/update/remove
    /// against the current state.
    fn write_table(&mut self, table: &str, docs: TableSnapshot) -> Result<()>;

    /// A single document body, `None` if absent.
    fn read_document(&mut self, table: &str, doc_id: u64) -> Result<Option<Value>>;

    /// Insert or overwrite a single document.
    fn write_document(&mut self, table: &str, doc_id: u64, body: Value) -> Result<()>;

    /// Remove a single document, returning whether it was present.
    fn delete_document(&mut self, table: &str, doc_id: u64) -> Result<bool>;

    /// Read several documents by id in one call.
    fn read_documents_bulk(&mut self, table: &str, ids: &[u64]) -> Result<TableSnapshot>;

    /// Write several documents by id in one call.
    fn update_documents_bulk(&mut self, table: &str, docs: TableSnapshot) -> Result<()>;

    /// Remove every document in `table`.
    fn truncate_table(&mut self, table: &str) -> Result<()>;

    /// Every table name with at least one stored document.
    fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Flush any buffered state to durable storage. A no-op for
    /// `InMemoryStorage`.
    fn sync(&mut self) -> Result<()>;
}

/// Build the B-tree / map key for a document.
pub fn document_key(table: &str, doc_id: u64) -> String {
    format!("{table}/{doc_id}")
}

/// Split a `document_key` back into its table name and doc-id, given the
/// table name is already known (table names are not allowed to contain
/// `/`, so the first `/` always separates table from doc-id).
pub fn parse_doc_id(table: &str, key: &str) -> Option<u64> {
    let prefix = document_key(table, 0);
    let prefix = &prefix[..prefix.len() - 1]; // strip the trailing '0'
    key.strip_prefix(prefix)?.parse().ok()
}

impl Storage for Box<dyn Storage> {
    fn read_table(&mut self, table: &str) -> Result<TableSnapshot> {
        (**self).read_table(table)
    }

    fn write_table(&mut self, table: &str, docs: TableSnapshot) -> Result<()> {
        (**self).write_table(table, docs)
    }

    fn read_document(&mut self, table: &str, doc_id: u64) -> Result<Option<Value>> {
        (**self).read_document(table, doc_id)
    }

    fn write_document(&mut self, table: &str, doc_id: u64, body: Value) -> Result<()> {
        (**self).write_document(table, doc_id, body)
    }

    fn delete_document(&mut self, table: &str, doc_id: u64) -> Result<bool> {
        (**self).delete_document(table, doc_id)
    }

    fn read_documents_bulk(&mut self, table: &str, ids: &[u64]) -> Result<TableSnapshot> {
        (**self).read_documents_bulk(table, ids)
    }

    fn update_documents_bulk(&mut self, table: &str, docs: TableSnapshot) -> Result<()> {
        (**self).update_documents_bulk(table, docs)
    }

    fn truncate_table(&mut self, table: &str) -> Result<()> {
        (**self).truncate_table(table)
    }

    fn list_tables(&mut self) -> Result<Vec<String>> {
        (**self).list_tables()
    }

    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_roundtrip() {
        let k = document_key("users", 42);
        assert_eq!(k, "users/42");
        assert_eq!(parse_doc_id("users", &k), Some(42));
        assert_eq!(parse_doc_id("posts", &k), None);
    }
}
