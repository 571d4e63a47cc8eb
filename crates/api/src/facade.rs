//! [`Bmdb`]: the `Config`-driven entry point that picks a concrete
//! [`bmdb_storage::Storage`] backend (optionally WAL-wrapped) and exposes
//! the table/schema-table/relationship surface over it without the host
//! application ever naming a generic storage type parameter.
use crate::config::{Config, StorageKind};
use bmdb_core::{Document, Error, Result, Value};
use bmdb_durability::WalStorage;
use bmdb_engine::{Database, Relationship, Schema, SchemaTable, Selector, Updater};
use bmdb_query::{Predicate, QueryPlan};
use bmdb_storage::{BinaryFileStore, InMemoryStorage, JsonFileStore, Storage};

fn build_storage(config: &Config) -> Result<Box<dyn Storage>> {
    let base: Box<dyn Storage> = match config.storage_kind {
        StorageKind::Memory => Box::new(InMemoryStorage::new()),
        StorageKind::Json => Box::new(JsonFileStore::open(require_path(config, "Config::json")?)?),
        StorageKind::Binary => Box::new(BinaryFileStore::open(require_path(config, "Config::binary")?)?),
    };
    match &config.wal {
        None => Ok(base),
        Some(options) => {
            let wal_path = require_path(config, "Config::with_wal")?.with_extension("wal");
            Ok(Box::new(WalStorage::open(base, wal_path, options.clone())?))
        }
    }
}

fn require_path<'a>(config: &'a Config, who: &str) -> Result<&'a std::path::Path> {
    config
        .path
        .as_deref()
        .ok_or_else(|| Error::InvalidOperation(format!("{who} requires Config::path to be set")))
}

/// The embedded database: every table lives under one storage backend
/// chosen once at [`Bmdb::open`] time.
pub struct Bmdb {
    db: Database<Box<dyn Storage>>,
    indexing_enabled: bool,
}

impl Bmdb {
    /// Open (or create) a database per `config`.
    pub fn open(config: Config) -> Result<Self> {
        let storage = build_storage(&config)?;
        let db = Database::open(storage, config.cache_size)?;
        Ok(Bmdb {
            db,
            indexing_enabled: config.indexing_enabled,
        })
    }

    /// Attach (or replace) a schema on a table, opening it first if needed.
    pub fn schema_table(&mut self, table: &str, schema: Schema) -> Result<&mut SchemaTable<Box<dyn Storage>>> {
        self.db.schema_table(table, schema)
    }

    /// Borrow a table's schema-enforcing handle directly, for callers that
    /// want the full `SchemaTable` surface rather than this facade's
    /// forwarding methods.
    pub fn table(&mut self, table: &str) -> Result<&mut SchemaTable<Box<dyn Storage>>> {
        self.db.table(table)
    }

    /// Insert one document, returning its doc-id.
    pub fn insert(&mut self, table: &str, body: Value) -> Result<u64> {
        self.db.insert(table, body)
    }

    /// Insert several documents as one all-or-nothing write.
    pub fn insert_multiple(&mut self, table: &str, bodies: Vec<Value>) -> Result<Vec<u64>> {
        self.db.insert_multiple(table, bodies)
    }

    /// Fetch a single document by id.
    pub fn get(&mut self, table: &str, doc_id: u64) -> Result<Option<Document>> {
        self.db.table(table)?.table().get_by_id(doc_id)
    }

    /// Every document in a table, in doc-id order.
    pub fn all(&mut self, table: &str) -> Result<Vec<Document>> {
        self.db.table(table)?.table().all()
    }

    /// Number of documents in a table.
    pub fn len(&mut self, table: &str) -> Result<usize> {
        self.db.table(table)?.table().len()
    }

    /// Whether a table has no documents.
    pub fn is_empty(&mut self, table: &str) -> Result<bool> {
        self.db.table(table)?.table().is_empty()
    }

    /// Documents matching a predicate. Honors `Config::indexing_enabled`:
    /// when the caller has disabled it, every call here is a predicate-
    /// filtered full scan instead of going through the planner/cache.
    pub fn search(&mut self, table: &str, predicate: &Predicate) -> Result<Vec<Document>> {
        let handle = self.db.table(table)?.table();
        if self.indexing_enabled {
            handle.search(predicate)
        } else {
            Ok(handle
                .all()?
                .into_iter()
                .filter(|doc| predicate.eval(&doc.body))
                .collect())
        }
    }

    /// Count of documents matching a predicate.
    pub fn count(&mut self, table: &str, predicate: &Predicate) -> Result<usize> {
        Ok(self.search(table, predicate)?.len())
    }

    /// Explain how `search` would execute a predicate, without running it.
    pub fn explain(&mut self, table: &str, predicate: &Predicate) -> Result<QueryPlan> {
        Ok(self.db.table(table)?.table().explain(predicate))
    }

    /// Apply an update to every document a selector resolves to.
    pub fn update(&mut self, table: &str, updater: &mut Updater, selector: Selector<'_>) -> Result<Vec<u64>> {
        self.db.update(table, updater, selector)
    }

    /// Shallow-merge `fields` into every document a selector resolves to.
    pub fn update_fields(&mut self, table: &str, fields: Value, selector: Selector<'_>) -> Result<Vec<u64>> {
        let mut updater = Updater::Fields(fields);
        self.db.update(table, &mut updater, selector)
    }

    /// Update the document matching `predicate` if exactly one matches,
    /// otherwise insert `body`.
    pub fn upsert(&mut self, table: &str, body: Value, predicate: Option<&Predicate>) -> Result<u64> {
        self.db.upsert(table, body, predicate)
    }

    /// Remove every document a selector resolves to, cascading to any
    /// `cascade=true` child relationships.
    pub fn remove(&mut self, table: &str, selector: Selector<'_>) -> Result<Vec<u64>> {
        self.db.remove(table, selector)
    }

    /// Remove every document in a table, cascading as [`Self::remove`] would.
    pub fn truncate(&mut self, table: &str) -> Result<()> {
        self.db.truncate(table)
    }

    /// Register a `hasMany(parentField, childTable, childField, cascade)`
    /// relationship.
    pub fn add_relationship(&mut self, relationship: Relationship) -> Result<()> {
        self.db.add_relationship(relationship)
    }

    /// Drop a specific relationship, returning whether one was removed.
    pub fn remove_relationship(
        &mut self,
        parent_table: &str,
        parent_field: &str,
        child_table: &str,
        child_field: &str,
    ) -> Result<bool> {
        self.db
            .remove_relationship(parent_table, parent_field, child_table, child_field)
    }

    /// Drop every registered relationship.
    pub fn clear_relationships(&mut self) -> Result<()> {
        self.db.clear_relationships()
    }

    /// Every registered relationship, in no particular order.
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.db.relationships()
    }

    /// Documents related to `parent_id` via a registered relationship.
    pub fn find_children(&mut self, parent_table: &str, parent_id: u64, child_table: Option<&str>) -> Result<Vec<Document>> {
        self.db.find_children(parent_table, parent_id, child_table)
    }

    /// Count of [`Self::find_children`] without materializing documents.
    pub fn count_children(&mut self, parent_table: &str, parent_id: u64, child_table: Option<&str>) -> Result<usize> {
        self.db.count_children(parent_table, parent_id, child_table)
    }

    /// Whether [`Self::find_children`] would return anything.
    pub fn has_children(&mut self, parent_table: &str, parent_id: u64, child_table: Option<&str>) -> Result<bool> {
        self.db.has_children(parent_table, parent_id, child_table)
    }

    /// Every table name with at least one stored document.
    pub fn list_tables(&mut self) -> Result<Vec<String>> {
        self.db.list_tables()
    }

    /// Flush the backing storage (WAL group-commit flush, chunk-cache
    /// fsync, or a no-op for in-memory storage).
    pub fn sync(&mut self) -> Result<()> {
        self.db.sync()
    }
}
