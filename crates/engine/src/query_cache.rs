//! LRU query-result cache keyed by predicate hash.
use bmdb_core::Document;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Caches search results for cacheable predicates. Cleared wholesale on any
/// mutation, since a single invalidation bit per key would still need
/// per-key dependency tracking this cache doesn't attempt.
pub struct QueryCache {
    entries: LruCache<u64, Vec<Document>>,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        QueryCache {
            entries: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap()),
        }
    }

    /// Look up cached results for a predicate's stable hash, cloning so the
    /// caller can mutate freely without aliasing cached state.
    pub fn get(&mut self, hash: u64) -> Option<Vec<Document>> {
        self.entries.get(&hash).cloned()
    }

    pub fn put(&mut self, hash: u64, docs: Vec<Document>) {
        self.entries.put(hash, docs);
    }

    /// Drop every cached entry (called on every mutating table operation).
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmdb_core::Value;

    #[test]
    fn put_then_get_roundtrips() {
        let mut cache = QueryCache::new(4);
        let docs = vec![Document::new(1, Value::Int(1))];
        cache.put(42, docs.clone());
        assert_eq!(cache.get(42), Some(docs));
    }

    #[test]
    fn invalidate_clears_everything() {
        let mut cache = QueryCache::new(4);
        cache.put(1, vec![]);
        cache.invalidate();
        assert_eq!(cache.get(1), None);
    }

    #[test]
    fn evicts_least_recently_used_past_capacity() {
        let mut cache = QueryCache::new(2);
        cache.put(1, vec![]);
        cache.put(2, vec![]);
        cache.put(3, vec![]); // evicts 1
        assert_eq!(cache.get(1), None);
        assert!(cache.get(2).is_some());
        assert!(cache.get(3).is_some());
    }
}
