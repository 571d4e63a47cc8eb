//! In-memory storage: a map from table name to doc-id map.
use crate::{Storage, TableSnapshot};
use bmdb_core::{Result, Value};
use std::collections::{HashMap, VecDeque};

/// Bound on a table's delta log before it collapses into the base map.
const DELTA_LOG_CAP: usize = 10_000;

/// One fine-grained mutation, recorded so a caller can observe incremental
/// changes without re-reading the whole table.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaOp {
    /// A document was inserted or overwritten.
    Write {
        /// The document's id.
        doc_id: u64,
        /// Its new body.
        body: Value,
    },
    /// A document was removed.
    Delete {
        /// The document's id.
        doc_id: u64,
    },
}

/// Zero-persistence storage: a `HashMap<table, HashMap<doc_id, Value>>`.
///
/// Every table additionally keeps a bounded delta log of recent
/// mutations; once a table's log exceeds [`DELTA_LOG_CAP`] entries it is
/// collapsed (cleared — the base map is already authoritative, so nothing
/// is lost by dropping the log).
#[derive(Default)]
pub struct InMemoryStorage {
    tables: HashMap<String, TableSnapshot>,
    deltas: HashMap<String, VecDeque<DeltaOp>>,
}

impl InMemoryStorage {
    /// An empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain (and clear) the delta log for `table`.
    pub fn drain_deltas(&mut self, table: &str) -> Vec<DeltaOp> {
        self.deltas
            .get_mut(table)
            .map(|d| d.drain(..).collect())
            .unwrap_or_default()
    }

    fn push_delta(&mut self, table: &str, op: DeltaOp) {
        let log = self.deltas.entry(table.to_string()).or_default();
        log.push_back(op);
        if log.len() > DELTA_LOG_CAP {
            log.clear();
        }
    }
}

impl Storage for InMemoryStorage {
    fn read_table(&mut self, table: &str) -> Result<TableSnapshot> {
        Ok(self.tables.get(table).cloned().unwrap_or_default())
    }

    fn write_table(&mut self, table: &str, docs: TableSnapshot) -> Result<()> {
        let current = self.tables.entry(table.to_string()).or_default();
        for (&id, body) in &docs {
            if current.get(&id) != Some(body) {
                self.push_delta(
                    table,
                    DeltaOp::Write {
                        doc_id: id,
                        body: body.clone(),
                    },
                );
            }
        }
        let removed: Vec<u64> = current
            .keys()
            .filter(|id| !docs.contains_key(id))
            .copied()
            .collect();
        for id in removed {
            self.push_delta(table, DeltaOp::Delete { doc_id: id });
        }
        *current = docs;
        Ok(())
    }

    fn read_document(&mut self, table: &str, doc_id: u64) -> Result<Option<Value>> {
        Ok(self
            .tables
            .get(table)
            .and_then(|t| t.get(&doc_id))
            .cloned())
    }

    fn write_document(&mut self, table: &str, doc_id: u64, body: Value) -> Result<()> {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(doc_id, body.clone());
        self.push_delta(table, DeltaOp::Write { doc_id, body });
        Ok(())
    }

    fn delete_document(&mut self, table: &str, doc_id: u64) -> Result<bool> {
        let removed = self
            .tables
            .get_mut(table)
            .map(|t| t.remove(&doc_id).is_some())
            .unwrap_or(false);
        if removed {
            self.push_delta(table, DeltaOp::Delete { doc_id });
        }
        Ok(removed)
    }

    fn read_documents_bulk(&mut self, table: &str, ids: &[u64]) -> Result<TableSnapshot> {
        let t = self.tables.get(table);
        Ok(ids
            .iter()
            .filter_map(|id| t.and_then(|t| t.get(id)).map(|v| (*id, v.clone())))
            .collect())
    }

    fn update_documents_bulk(&mut self, table: &str, docs: TableSnapshot) -> Result<()> {
        for (id, body) in docs {
            self.write_document(table, id, body)?;
        }
        Ok(())
    }

    fn truncate_table(&mut self, table: &str) -> Result<()> {
        if let Some(t) = self.tables.get_mut(table) {
            let ids: Vec<u64> = t.keys().copied().collect();
            t.clear();
            for id in ids {
                self.push_delta(table, DeltaOp::Delete { doc_id: id });
            }
        }
        Ok(())
    }

    fn list_tables(&mut self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
