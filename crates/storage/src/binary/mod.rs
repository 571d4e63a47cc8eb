//! The production single-file `Storage` backend.
//!
//! Layout: a 32-byte [`Header`], then a fixed 1 MiB B-tree node area, then
//! a variable-length document area. The B-tree maps `"<table>/<docId>"` to
//! an `Entry{offset,length}` span in the document area; document bodies are
//! MessagePack-encoded via `bmdb-codec`. All file I/O goes through a
//! [`ChunkCache`] so repeated reads of hot pages don't hit the OS per call.
mod chunk_cache;
mod header;

pub use chunk_cache::{ChunkCache, ChunkCacheStats};
pub use header::Header;

use crate::{document_key, parse_doc_id, Storage, TableSnapshot};
use bmdb_btree::{BTree, BtreeError, Entry, PageStore, NODE_SIZE};
use bmdb_core::{limits, Error, Result, Value};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Cap on recycled node offsets kept in memory between opens.
const FREE_LIST_CAP: usize = 4096;

/// A `PageStore` borrowing the file store's chunk cache, header, and free
/// list for the duration of one B-tree operation. Constructed fresh by
/// [`BinaryFileStore::with_tree`] rather than held long-term, since `BTree`
/// owns its page store by value.
struct FileNodeStore<'a> {
    cache: &'a mut ChunkCache<fs::File>,
    header: &'a mut Header,
    free_list: &'a mut Vec<u32>,
}

impl<'a> PageStore for FileNodeStore<'a> {
    fn read_node(&mut self, offset: u32) -> std::result::Result<[u8; NODE_SIZE], BtreeError> {
        let bytes = self
            .cache
            .read(offset as u64, NODE_SIZE)
            .map_err(|e| BtreeError::Io(e.to_string()))?;
        bytes
            .try_into()
            .map_err(|_| BtreeError::CorruptNode {
                offset,
                detail: "short node read".into(),
            })
    }

    fn write_node(&mut self, offset: u32, bytes: &[u8; NODE_SIZE]) -> std::result::Result<(), BtreeError> {
        self.cache
            .write(offset as u64, bytes)
            .map_err(|e| BtreeError::Io(e.to_string()))
    }

    fn allocate_node(&mut self) -> std::result::Result<u32, BtreeError> {
        if let Some(offset) = self.free_list.pop() {
            return Ok(offset);
        }
        let offset = self.header.next_node_offset;
        let next = offset as u64 + NODE_SIZE as u64;
        if next > limits::HEADER_SIZE + limits::BTREE_AREA_SIZE {
            return Err(BtreeError::Io("btree node area exhausted".into()));
        }
        self.header.next_node_offset = next as u32;
        Ok(offset)
    }

    fn free_node(&mut self, offset: u32) {
        if self.free_list.len() < FREE_LIST_CAP {
            self.free_list.push(offset);
        }
    }
}

/// A single-file document store: B-tree index plus append-only document
/// area, with a page cache in front of the file handle.
pub struct BinaryFileStore {
    path: PathBuf,
    cache: ChunkCache<fs::File>,
    header: Header,
    free_list: Vec<u32>,
}

impl BinaryFileStore {
    /// Open an existing file or create a new one at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let existed = fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| Error::io("open", e))?;
        let mut cache = ChunkCache::new(file, limits::CHUNK_SIZE);
        let header = if existed {
            let bytes = cache.read(0, 32)?;
            let arr: [u8; 32] = bytes.try_into().map_err(|_| Error::Corruption {
                location: "file header".into(),
                detail: "file shorter than header".into(),
            })?;
            Header::deserialize(&arr)?
        } else {
            let fresh = Header::fresh();
            cache.write(0, &fresh.serialize())?;
            cache.sync()?;
            fresh
        };
        Ok(BinaryFileStore {
            path,
            cache,
            header,
            free_list: Vec::new(),
        })
    }

    /// Current chunk cache statistics.
    pub fn cache_stats(&self) -> ChunkCacheStats {
        self.cache.stats()
    }

    fn with_tree<R>(
        &mut self,
        f: impl FnOnce(&mut BTree<FileNodeStore<'_>>) -> std::result::Result<R, BtreeError>,
    ) -> Result<R> {
        let root = self.header.root_offset;
        let store = FileNodeStore {
            cache: &mut self.cache,
            header: &mut self.header,
            free_list: &mut self.free_list,
        };
        let mut tree = BTree::open(store, root);
        let result = f(&mut tree).map_err(Error::from)?;
        let new_root = tree.root_offset();
        self.header.root_offset = new_root;
        Ok(result)
    }

    fn append_raw(&mut self, bytes: &[u8]) -> Result<Entry> {
        let offset = self.header.free_space_offset;
        self.cache.write(offset, bytes)?;
        self.header.free_space_offset += bytes.len() as u64;
        Ok(Entry {
            offset: offset as u32,
            length: bytes.len() as u32,
        })
    }

    fn read_raw(&mut self, entry: Entry) -> Result<Vec<u8>> {
        self.cache.read(entry.offset as u64, entry.length as usize)
    }

    fn put(&mut self, table: &str, doc_id: u64, body: Value) -> Result<()> {
        let bytes = bmdb_codec::encode(&body).map_err(Error::from)?;
        let entry = self.append_raw(&bytes)?;
        let key = document_key(table, doc_id);
        let existed = self.with_tree(|t| t.find(&key))?.is_some();
        self.with_tree(|t| t.insert(&key, entry))?;
        if !existed {
            self.header.doc_count += 1;
        }
        Ok(())
    }

    fn flush_header(&mut self) -> Result<()> {
        self.cache.write(0, &self.header.serialize())?;
        Ok(())
    }
}

impl Storage for BinaryFileStore {
    fn read_table(&mut self, table: &str) -> Result<TableSnapshot> {
        let prefix = format!("{table}/");
        let entries = self.with_tree(|t| t.scan_from_prefix(&prefix))?;
        let mut out = TableSnapshot::new();
        for (key, entry) in entries {
            if let Some(doc_id) = parse_doc_id(table, &key) {
                let bytes = self.read_raw(entry)?;
                let value = bmdb_codec::decode(&bytes).map_err(Error::from)?;
                out.insert(doc_id, value);
            }
        }
        Ok(out)
    }

    fn write_table(&mut self, table: &str, docs: TableSnapshot) -> Result<()> {
        let current = self.read_table(table)?;
        for (&id, body) in &docs {
            if current.get(&id) != Some(body) {
                self.put(table, id, body.clone())?;
            }
        }
        for &id in current.keys() {
            if !docs.contains_key(&id) {
                self.delete_document(table, id)?;
            }
        }
        self.flush_header()
    }

    fn read_document(&mut self, table: &str, doc_id: u64) -> Result<Option<Value>> {
        let key = document_key(table, doc_id);
        match self.with_tree(|t| t.find(&key))? {
            Some(entry) => {
                let bytes = self.read_raw(entry)?;
                Ok(Some(bmdb_codec::decode(&bytes).map_err(Error::from)?))
            }
            None => Ok(None),
        }
    }

    fn write_document(&mut self, table: &str, doc_id: u64, body: Value) -> Result<()> {
        self.put(table, doc_id, body)?;
        self.flush_header()
    }

    fn delete_document(&mut self, table: &str, doc_id: u64) -> Result<bool> {
        let key = document_key(table, doc_id);
        let removed = self.with_tree(|t| t.remove(&key))?;
        if removed {
            self.header.doc_count = self.header.doc_count.saturating_sub(1);
            self.flush_header()?;
        }
        Ok(removed)
    }

    fn read_documents_bulk(&mut self, table: &str, ids: &[u64]) -> Result<TableSnapshot> {
        let mut out = TableSnapshot::new();
        for &id in ids {
            if let Some(v) = self.read_document(table, id)? {
                out.insert(id, v);
            }
        }
        Ok(out)
    }

    fn update_documents_bulk(&mut self, table: &str, docs: TableSnapshot) -> Result<()> {
        for (id, body) in docs {
            self.put(table, id, body)?;
        }
        self.flush_header()
    }

    fn truncate_table(&mut self, table: &str) -> Result<()> {
        let prefix = format!("{table}/");
        let entries = self.with_tree(|t| t.scan_from_prefix(&prefix))?;
        let keys: Vec<String> = entries.into_iter().map(|(k, _)| k).collect();
        let removed = self.with_tree(|t| t.bulk_remove(&keys))?;
        self.header.doc_count = self.header.doc_count.saturating_sub(removed as u32);
        self.flush_header()
    }

    fn list_tables(&mut self) -> Result<Vec<String>> {
        let entries = self.with_tree(|t| t.scan())?;
        let mut tables: Vec<String> = entries
            .into_iter()
            .filter_map(|(key, _)| key.split_once('/').map(|(table, _)| table.to_string()))
            .collect();
        tables.sort();
        tables.dedup();
        Ok(tables)
    }

    fn sync(&mut self) -> Result<()> {
        self.flush_header()?;
        self.cache.sync()
    }
}

impl BinaryFileStore {
    /// Rewrite the file in place, dropping garbage left behind by deletes
    /// and overwrites. All live documents are copied once into a temp file, the
    /// B-tree is rebuilt in doc-id order, and the temp file replaces the
    /// original via rename.
    pub fn compact(&mut self) -> Result<()> {
        self.sync()?;
        let tmp_path = self.path.with_extension("bmdb.compact");
        {
            let mut fresh = BinaryFileStore::open(&tmp_path)?;
            let entries = self.with_tree(|t| t.scan())?;
            let mut rebuilt: BTreeMap<String, Entry> = BTreeMap::new();
            for (key, entry) in entries {
                let bytes = self.read_raw(entry)?;
                let new_entry = fresh.append_raw(&bytes)?;
                rebuilt.insert(key, new_entry);
            }
            let doc_count = rebuilt.len() as u32;
            fresh.with_tree(|t| t.bulk_insert(rebuilt.into_iter().collect()))?;
            fresh.header.doc_count = doc_count;
            fresh.sync()?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|e| Error::io("rename", e))?;
        *self = BinaryFileStore::open(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmdb_core::OrderedMap;
    use tempfile::tempdir;

    #[test]
    fn write_read_delete_roundtrip() {
        let dir = tempdir().unwrap();
        let mut store = BinaryFileStore::open(dir.path().join("data.bmdb")).unwrap();
        let mut body = OrderedMap::new();
        body.insert("name".into(), Value::String("Ada".into()));
        store
            .write_document("users", 1, Value::Map(body.clone()))
            .unwrap();
        assert_eq!(
            store.read_document("users", 1).unwrap(),
            Some(Value::Map(body))
        );
        assert!(store.delete_document("users", 1).unwrap());
        assert_eq!(store.read_document("users", 1).unwrap(), None);
    }

    #[test]
    fn reopen_preserves_documents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bmdb");
        {
            let mut store = BinaryFileStore::open(&path).unwrap();
            for i in 0..20u64 {
                store
                    .write_document("items", i, Value::Int(i as i64))
                    .unwrap();
            }
            store.sync().unwrap();
        }
        let mut reopened = BinaryFileStore::open(&path).unwrap();
        for i in 0..20u64 {
            assert_eq!(
                reopened.read_document("items", i).unwrap(),
                Some(Value::Int(i as i64))
            );
        }
    }

    #[test]
    fn compaction_preserves_live_documents_and_drops_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bmdb");
        let mut store = BinaryFileStore::open(&path).unwrap();
        for i in 0..50u64 {
            store.write_document("t", i, Value::Int(i as i64)).unwrap();
        }
        for i in 0..25u64 {
            store.delete_document("t", i).unwrap();
        }
        // overwrite survivors to leave stale bytes behind pre-compaction
        for i in 25..50u64 {
            store.write_document("t", i, Value::Int(i as i64 * 2)).unwrap();
        }
        store.compact().unwrap();
        for i in 0..25u64 {
            assert_eq!(store.read_document("t", i).unwrap(), None);
        }
        for i in 25..50u64 {
            assert_eq!(store.read_document("t", i).unwrap(), Some(Value::Int(i as i64 * 2)));
        }
    }

    #[test]
    fn list_and_truncate_tables() {
        let dir = tempdir().unwrap();
        let mut store = BinaryFileStore::open(dir.path().join("data.bmdb")).unwrap();
        store.write_document("a", 1, Value::Int(1)).unwrap();
        store.write_document("b", 1, Value::Int(2)).unwrap();
        let mut tables = store.list_tables().unwrap();
        tables.sort();
        assert_eq!(tables, vec!["a".to_string(), "b".to_string()]);

        store.truncate_table("a").unwrap();
        assert_eq!(store.read_table("a").unwrap().len(), 0);
        assert_eq!(store.read_table("b").unwrap().len(), 1);
    }
}
