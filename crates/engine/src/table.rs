//! The table layer: insert/search/update/remove over one named
//! collection of documents, backed by any [`Storage`] implementation.
use crate::doc_id::DocIdAllocator;
use crate::query_cache::QueryCache;
use bmdb_core::{Document, Error, Result, Value, DOC_ID_FIELD, DOC_ID_FIELD_CAMEL};
use bmdb_query::{IndexManager, Predicate, QueryPlan, Strategy};
use bmdb_storage::Storage;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// How to pick which documents an update/remove call applies to.
pub enum Selector<'a> {
    /// Every document in the table.
    All,
    /// Documents matching a predicate.
    Query(&'a Predicate),
    /// Documents named by id (ids not present in the table are ignored).
    Ids(&'a [u64]),
}

/// How an update call transforms the documents it selects.
pub enum Updater {
    /// Shallow-merge these top-level fields into the existing body.
    Fields(Value),
    /// Apply an arbitrary transform to the existing body in place.
    Patch(Box<dyn FnMut(&mut Value) + Send>),
}

/// One named collection of documents. Generic over the backing
/// [`Storage`] implementation so the same table logic runs over memory,
/// JSON, binary, or WAL-wrapped storage.
pub struct Table<S: Storage> {
    storage: Arc<Mutex<S>>,
    name: String,
    index_manager: IndexManager,
    cache: QueryCache,
    allocator: DocIdAllocator,
}

impl<S: Storage> Table<S> {
    /// Open (or create) a table, scanning its existing contents once to
    /// seed the doc-id allocator and rebuild the in-memory field indexes.
    pub fn open(storage: Arc<Mutex<S>>, name: impl Into<String>, cache_capacity: usize) -> Result<Self> {
        let name = name.into();
        let snapshot = storage.lock().read_table(&name)?;
        let allocator = DocIdAllocator::from_existing_ids(snapshot.keys().copied());
        let mut index_manager = IndexManager::new();
        for (&id, body) in &snapshot {
            index_manager.record_insert(&Document::new(id, body.clone()));
        }
        index_manager.set_total_docs(snapshot.len() as u64);

        Ok(Table {
            storage,
            name,
            index_manager,
            cache: QueryCache::new(cache_capacity),
            allocator,
        })
    }

    /// The table's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert one document, returning its doc-id.
    pub fn insert(&mut self, body: Value) -> Result<u64> {
        let doc_id = self.reserve_id(&body)?;
        let doc = Document::new(doc_id, body);
        self.storage
            .lock()
            .write_document(&self.name, doc_id, doc.storage_body().clone())?;
        self.index_manager.record_insert(&doc);
        self.index_manager
            .set_total_docs(self.index_manager.total_docs() + 1);
        self.cache.invalidate();
        Ok(doc_id)
    }

    /// Insert several documents as one all-or-nothing write: every requested explicit id is checked for collisions
    /// (within the batch and against the table) before anything is written.
    pub fn insert_multiple(&mut self, bodies: Vec<Value>) -> Result<Vec<u64>> {
        if bodies.is_empty() {
            return Ok(Vec::new());
        }

        let requested: Vec<Option<u64>> = bodies.iter().map(extract_requested_id).collect();

        let mut seen = HashSet::new();
        {
            let mut storage = self.storage.lock();
            for id in requested.iter().flatten() {
                if !seen.insert(*id) || storage.read_document(&self.name, *id)?.is_some() {
                    return Err(Error::DuplicateDocId { doc_id: *id });
                }
            }
        }

        let mut candidate_next = self.allocator.peek_next();
        for id in requested.iter().flatten() {
            candidate_next = candidate_next.max(id + 1);
        }

        let mut plan = Vec::with_capacity(bodies.len());
        let mut auto_next = candidate_next;
        for (body, requested_id) in bodies.into_iter().zip(requested) {
            let id = match requested_id {
                Some(id) => id,
                None => {
                    let id = auto_next;
                    auto_next += 1;
                    id
                }
            };
            plan.push((id, body));
        }

        let mut bulk = std::collections::BTreeMap::new();
        for (id, body) in &plan {
            bulk.insert(*id, Document::new(*id, body.clone()).storage_body().clone());
        }
        self.storage
            .lock()
            .update_documents_bulk(&self.name, bulk)?;

        self.allocator.fast_forward(auto_next);
        let mut ids = Vec::with_capacity(plan.len());
        for (id, body) in plan {
            let doc = Document::new(id, body);
            self.allocator.observe(id);
            self.index_manager.record_insert(&doc);
            ids.push(id);
        }
        self.index_manager
            .set_total_docs(self.index_manager.total_docs() + ids.len() as u64);
        self.cache.invalidate();
        Ok(ids)
    }

    fn reserve_id(&mut self, body: &Value) -> Result<u64> {
        match extract_requested_id(body) {
            Some(id) => {
                if self.storage.lock().read_document(&self.name, id)?.is_some() {
                    return Err(Error::DuplicateDocId { doc_id: id });
                }
                self.allocator.observe(id);
                Ok(id)
            }
            None => Ok(self.allocator.allocate()),
        }
    }

    /// Fetch a single document by id.
    pub fn get_by_id(&mut self, doc_id: u64) -> Result<Option<Document>> {
        let body = self.storage.lock().read_document(&self.name, doc_id)?;
        Ok(body.map(|b| Document::new(doc_id, b)))
    }

    /// Fetch the first document matching a predicate, if any.
    pub fn get_one(&mut self, predicate: &Predicate) -> Result<Option<Document>> {
        Ok(self.search(predicate)?.into_iter().next())
    }

    /// Every document in the table, in doc-id order.
    pub fn all(&mut self) -> Result<Vec<Document>> {
        let snapshot = self.storage.lock().read_table(&self.name)?;
        Ok(snapshot
            .into_iter()
            .map(|(id, body)| Document::new(id, body))
            .collect())
    }

    /// Number of documents in the table.
    pub fn len(&mut self) -> Result<usize> {
        Ok(self.storage.lock().read_table(&self.name)?.len())
    }

    /// Whether the table has no documents.
    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Documents matching a predicate, planned via the index manager and
    /// cached by the predicate's stable hash when it has one.
    pub fn search(&mut self, predicate: &Predicate) -> Result<Vec<Document>> {
        if let Some(hash) = predicate.stable_hash() {
            if let Some(cached) = self.cache.get(hash) {
                return Ok(cached);
            }
        }
        let plan = self.index_manager.plan(predicate);
        let docs = self.execute_plan(&plan, predicate)?;
        if let Some(hash) = predicate.stable_hash() {
            self.cache.put(hash, docs.clone());
        }
        Ok(docs)
    }

    /// Count of documents matching a predicate.
    pub fn count(&mut self, predicate: &Predicate) -> Result<usize> {
        Ok(self.search(predicate)?.len())
    }

    /// Explain how `search` would execute a predicate, without running it.
    pub fn explain(&self, predicate: &Predicate) -> QueryPlan {
        self.index_manager.plan(predicate)
    }

    fn execute_plan(&mut self, plan: &QueryPlan, predicate: &Predicate) -> Result<Vec<Document>> {
        match plan.strategy {
            Strategy::FullScan => {
                let snapshot = self.storage.lock().read_table(&self.name)?;
                Ok(snapshot
                    .into_iter()
                    .map(|(id, body)| Document::new(id, body))
                    .filter(|doc| predicate.eval(&doc.body))
                    .collect())
            }
            Strategy::IndexScan | Strategy::Hybrid => {
                let mut candidates: Option<bmdb_btree::DocIdBitmap> = None;
                for cond in &plan.conditions {
                    if let Some(bitmap) = self.index_manager.bitmap_for(cond) {
                        candidates = Some(match candidates {
                            Some(existing) => existing.intersect(&bitmap),
                            None => bitmap,
                        });
                    }
                }
                let Some(candidates) = candidates else {
                    let full = QueryPlan {
                        strategy: Strategy::FullScan,
                        ..plan.clone()
                    };
                    return self.execute_plan(&full, predicate);
                };
                let ids: Vec<u64> = candidates.iter().collect();
                let bodies = self.storage.lock().read_documents_bulk(&self.name, &ids)?;
                Ok(ids
                    .into_iter()
                    .filter_map(|id| bodies.get(&id).map(|body| Document::new(id, body.clone())))
                    .filter(|doc| predicate.eval(&doc.body))
                    .collect())
            }
        }
    }

    fn resolve_selector(&mut self, selector: Selector<'_>) -> Result<Vec<u64>> {
        match selector {
            Selector::All => Ok(self.all()?.into_iter().map(|d| d.doc_id).collect()),
            Selector::Ids(ids) => Ok(ids.to_vec()),
            Selector::Query(predicate) => {
                Ok(self.search(predicate)?.into_iter().map(|d| d.doc_id).collect())
            }
        }
    }

    /// Update every document the selector resolves to, returning the ids
    /// actually modified (ids with no matching document are skipped).
    pub fn update(&mut self, updater: &mut Updater, selector: Selector<'_>) -> Result<Vec<u64>> {
        let ids = self.resolve_selector(selector)?;
        let mut updated = Vec::new();
        for id in ids {
            let old_body = self.storage.lock().read_document(&self.name, id)?;
            let Some(old_body) = old_body else { continue };
            let old_doc = Document::new(id, old_body.clone());
            let mut new_body = old_body;
            match updater {
                Updater::Fields(fields) => merge_fields(&mut new_body, fields),
                Updater::Patch(f) => f(&mut new_body),
            }
            self.storage
                .lock()
                .write_document(&self.name, id, new_body.clone())?;
            let new_doc = Document::new(id, new_body);
            self.index_manager.record_remove(&old_doc);
            self.index_manager.record_insert(&new_doc);
            updated.push(id);
        }
        if !updated.is_empty() {
            self.cache.invalidate();
        }
        Ok(updated)
    }

    /// Apply a list of independent `(updater, predicate)` pairs in order.
    pub fn update_multiple(&mut self, updates: Vec<(Updater, Predicate)>) -> Result<Vec<u64>> {
        let mut all_updated = Vec::new();
        for (mut updater, predicate) in updates {
            let ids = self.update(&mut updater, Selector::Query(&predicate))?;
            all_updated.extend(ids);
        }
        Ok(all_updated)
    }

    /// Update the document matching `predicate` if exactly one matches,
    /// otherwise insert `body` as a new document. `None` always inserts.
    pub fn upsert(&mut self, body: Value, predicate: Option<&Predicate>) -> Result<u64> {
        let Some(predicate) = predicate else {
            return self.insert(body);
        };
        let matches = self.search(predicate)?;
        match matches.len() {
            0 => self.insert(body),
            1 => {
                let id = matches[0].doc_id;
                let mut updater = Updater::Fields(body);
                self.update(&mut updater, Selector::Ids(&[id]))?;
                Ok(id)
            }
            _ => Err(Error::Validation {
                path: "upsert.query".into(),
                reason: "predicate matched more than one document".into(),
            }),
        }
    }

    /// Remove every document the selector resolves to, returning the ids
    /// actually removed.
    pub fn remove(&mut self, selector: Selector<'_>) -> Result<Vec<u64>> {
        let ids = self.resolve_selector(selector)?;
        let mut removed = Vec::new();
        for id in ids {
            let body = self.storage.lock().read_document(&self.name, id)?;
            let Some(body) = body else { continue };
            self.storage.lock().delete_document(&self.name, id)?;
            removed.push(Document::new(id, body));
        }
        for doc in &removed {
            self.index_manager.record_remove(doc);
        }
        if !removed.is_empty() {
            self.index_manager.set_total_docs(
                self.index_manager
                    .total_docs()
                    .saturating_sub(removed.len() as u64),
            );
            self.cache.invalidate();
        }
        Ok(removed.into_iter().map(|d| d.doc_id).collect())
    }

    /// Remove every document in the table and reset its indexes.
    pub fn truncate(&mut self) -> Result<()> {
        self.storage.lock().truncate_table(&self.name)?;
        self.index_manager = IndexManager::new();
        self.allocator = DocIdAllocator::default();
        self.cache.invalidate();
        Ok(())
    }

    /// Overwrite one document's body outright, reindexing and invalidating
    /// the cache. Used by [`crate::schema::SchemaTable`], which computes
    /// (and validates) the merged/patched body itself before committing it,
    /// rather than going through [`Updater`] a second time. Returns `false`
    /// if `id` has no document.
    pub fn replace_body(&mut self, id: u64, new_body: Value) -> Result<bool> {
        let old_body = self.storage.lock().read_document(&self.name, id)?;
        let Some(old_body) = old_body else {
            return Ok(false);
        };
        self.storage
            .lock()
            .write_document(&self.name, id, new_body.clone())?;
        self.index_manager.record_remove(&Document::new(id, old_body));
        self.index_manager.record_insert(&Document::new(id, new_body));
        self.cache.invalidate();
        Ok(true)
    }
}

pub(crate) fn merge_fields(body: &mut Value, patch: &Value) {
    if let (Some(body_map), Some(patch_map)) = (body.as_map_mut(), patch.as_map()) {
        for (key, value) in patch_map.iter() {
            body_map.insert(key, value.clone());
        }
    }
}

/// Pull a caller-supplied positive doc-id out of an about-to-be-inserted
/// body, if present.
pub(crate) fn extract_requested_id(body: &Value) -> Option<u64> {
    let map = body.as_map()?;
    let v = map.get(DOC_ID_FIELD).or_else(|| map.get(DOC_ID_FIELD_CAMEL))?;
    match v {
        Value::Int(i) if *i > 0 => Some(*i as u64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmdb_core::OrderedMap;
    use bmdb_query::Op;
    use bmdb_storage::InMemoryStorage;

    fn new_table() -> Table<InMemoryStorage> {
        let storage = Arc::new(Mutex::new(InMemoryStorage::new()));
        Table::open(storage, "people", 32).unwrap()
    }

    fn person(dept: &str, age: i64) -> Value {
        let mut m = OrderedMap::new();
        m.insert("dept", Value::String(dept.into()));
        m.insert("age", Value::Int(age));
        Value::Map(m)
    }

    #[test]
    fn insert_allocates_sequential_ids() {
        let mut t = new_table();
        assert_eq!(t.insert(person("eng", 30)).unwrap(), 1);
        assert_eq!(t.insert(person("sales", 40)).unwrap(), 2);
        assert_eq!(t.len().unwrap(), 2);
    }

    #[test]
    fn explicit_id_collision_is_rejected() {
        let mut t = new_table();
        let mut m = OrderedMap::new();
        m.insert("doc_id", Value::Int(5));
        m.insert("dept", Value::String("eng".into()));
        t.insert(Value::Map(m.clone())).unwrap();
        let err = t.insert(Value::Map(m)).unwrap_err();
        assert!(matches!(err, Error::DuplicateDocId { doc_id: 5 }));
    }

    #[test]
    fn insert_multiple_is_all_or_nothing_on_collision() {
        let mut t = new_table();
        let mut dup = OrderedMap::new();
        dup.insert("doc_id", Value::Int(1));
        dup.insert("dept", Value::String("eng".into()));
        let bodies = vec![Value::Map(dup.clone()), Value::Map(dup)];
        assert!(t.insert_multiple(bodies).is_err());
        assert_eq!(t.len().unwrap(), 0);
    }

    #[test]
    fn search_uses_predicate_and_cache() {
        let mut t = new_table();
        t.insert(person("eng", 30)).unwrap();
        t.insert(person("sales", 40)).unwrap();
        let predicate = Predicate::field_op("dept", Op::Eq, Value::String("eng".into()));
        let first = t.search(&predicate).unwrap();
        assert_eq!(first.len(), 1);
        let second = t.search(&predicate).unwrap();
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn update_invalidates_cache_and_reindexes() {
        let mut t = new_table();
        let id = t.insert(person("eng", 30)).unwrap();
        let predicate = Predicate::field_op("dept", Op::Eq, Value::String("eng".into()));
        assert_eq!(t.search(&predicate).unwrap().len(), 1);

        let mut patch = OrderedMap::new();
        patch.insert("dept", Value::String("sales".into()));
        let mut updater = Updater::Fields(Value::Map(patch));
        t.update(&mut updater, Selector::Ids(&[id])).unwrap();

        assert_eq!(t.search(&predicate).unwrap().len(), 0);
        let sales = Predicate::field_op("dept", Op::Eq, Value::String("sales".into()));
        assert_eq!(t.search(&sales).unwrap().len(), 1);
    }

    #[test]
    fn upsert_inserts_when_nothing_matches() {
        let mut t = new_table();
        let predicate = Predicate::field_op("dept", Op::Eq, Value::String("eng".into()));
        let id = t.upsert(person("eng", 30), Some(&predicate)).unwrap();
        assert_eq!(t.get_by_id(id).unwrap().unwrap().field("age"), Some(&Value::Int(30)));
    }

    #[test]
    fn upsert_updates_single_match() {
        let mut t = new_table();
        t.insert(person("eng", 30)).unwrap();
        let predicate = Predicate::field_op("dept", Op::Eq, Value::String("eng".into()));
        t.upsert(person("eng", 99), Some(&predicate)).unwrap();
        assert_eq!(t.len().unwrap(), 1);
    }

    #[test]
    fn upsert_rejects_multiple_matches() {
        let mut t = new_table();
        t.insert(person("eng", 30)).unwrap();
        t.insert(person("eng", 31)).unwrap();
        let predicate = Predicate::field_op("dept", Op::Eq, Value::String("eng".into()));
        let err = t.upsert(person("eng", 99), Some(&predicate)).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn remove_by_query_and_truncate() {
        let mut t = new_table();
        t.insert(person("eng", 30)).unwrap();
        t.insert(person("sales", 40)).unwrap();
        let predicate = Predicate::field_op("dept", Op::Eq, Value::String("eng".into()));
        let removed = t.remove(Selector::Query(&predicate)).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(t.len().unwrap(), 1);

        t.truncate().unwrap();
        assert_eq!(t.len().unwrap(), 0);
    }

    #[test]
    fn reopening_a_table_rebuilds_allocator_and_indexes() {
        let storage = Arc::new(Mutex::new(InMemoryStorage::new()));
        {
            let mut t = Table::open(storage.clone(), "people", 32).unwrap();
            t.insert(person("eng", 30)).unwrap();
            t.insert(person("eng", 31)).unwrap();
        }
        let mut reopened = Table::open(storage, "people", 32).unwrap();
        assert_eq!(reopened.insert(person("eng", 32)).unwrap(), 3);
        let predicate = Predicate::field_op("dept", Op::Eq, Value::String("eng".into()));
        assert_eq!(reopened.search(&predicate).unwrap().len(), 3);
    }
}
