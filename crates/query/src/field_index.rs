//! Per-field B-tree index over top-level document fields.
use crate::compare::IndexKey;
use bmdb_btree::DocIdBitmap;
use bmdb_core::Value;
use std::collections::BTreeMap;

/// Aggregate statistics the planner uses for selectivity estimates.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldStats {
    /// Number of (value, docId) entries indexed for this field.
    pub total_entries: usize,
    /// Count of distinct values.
    pub distinct_values: usize,
}

/// An in-memory ordered map from indexable value to doc-id bitmap, for one
/// field.
#[derive(Debug, Default)]
pub struct FieldIndex {
    map: BTreeMap<IndexKey, DocIdBitmap>,
    total_entries: usize,
}

impl FieldIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index one (value, docId) pair. No-op if the value isn't indexable.
    pub fn insert(&mut self, value: &Value, doc_id: u64) {
        let Some(key) = IndexKey::from_value(value) else {
            return;
        };
        let bitmap = self.map.entry(key).or_insert_with(DocIdBitmap::new);
        if !bitmap.contains(doc_id) {
            bitmap.insert(doc_id);
            self.total_entries += 1;
        }
    }

    /// Remove one (value, docId) pair.
    pub fn remove(&mut self, value: &Value, doc_id: u64) {
        let Some(key) = IndexKey::from_value(value) else {
            return;
        };
        if let Some(bitmap) = self.map.get_mut(&key) {
            if bitmap.contains(doc_id) {
                bitmap.remove(doc_id);
                self.total_entries = self.total_entries.saturating_sub(1);
            }
            if bitmap.is_empty() {
                self.map.remove(&key);
            }
        }
    }

    /// Exact-value lookup.
    pub fn get_exact(&self, value: &Value) -> DocIdBitmap {
        match IndexKey::from_value(value) {
            Some(key) => self.map.get(&key).cloned().unwrap_or_default(),
            None => DocIdBitmap::new(),
        }
    }

    /// Union of bitmaps for every value in `values` (backs the `in` op).
    pub fn get_in(&self, values: &[Value]) -> DocIdBitmap {
        let mut out = DocIdBitmap::new();
        for v in values {
            out = out.union(&self.get_exact(v));
        }
        out
    }

    /// Inclusive/exclusive range `[lo, hi]`.
    pub fn get_range(&self, lo: &Value, hi: &Value, inclusive: bool) -> DocIdBitmap {
        let (Some(lo_key), Some(hi_key)) = (IndexKey::from_value(lo), IndexKey::from_value(hi))
        else {
            return DocIdBitmap::new();
        };
        let mut out = DocIdBitmap::new();
        for (key, bitmap) in self.map.range(lo_key..=hi_key.clone()) {
            if !inclusive && *key == hi_key {
                continue;
            }
            out = out.union(bitmap);
        }
        out
    }

    /// `field > value` (or `>=` when `inclusive`).
    pub fn get_greater_than(&self, value: &Value, inclusive: bool) -> DocIdBitmap {
        let Some(key) = IndexKey::from_value(value) else {
            return DocIdBitmap::new();
        };
        let mut out = DocIdBitmap::new();
        for (k, bitmap) in self.map.range(key.clone()..) {
            if !inclusive && *k == key {
                continue;
            }
            out = out.union(bitmap);
        }
        out
    }

    /// `field < value` (or `<=` when `inclusive`).
    pub fn get_less_than(&self, value: &Value, inclusive: bool) -> DocIdBitmap {
        let Some(key) = IndexKey::from_value(value) else {
            return DocIdBitmap::new();
        };
        let mut out = DocIdBitmap::new();
        for (k, bitmap) in self.map.range(..=key.clone()) {
            if !inclusive && *k == key {
                continue;
            }
            out = out.union(bitmap);
        }
        out
    }

    pub fn stats(&self) -> FieldStats {
        FieldStats {
            total_entries: self.total_entries,
            distinct_values: self.map.len(),
        }
    }
}
