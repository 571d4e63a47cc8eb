//! Public entry point for bmdb.
//!
//! [`Bmdb::open`] takes a [`Config`] (storage backend, optional WAL, cache
//! size, indexing toggle) and hands back a single facade over the table,
//! schema-table, and relationship layers — no generic storage parameter
//! for a caller to name.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bmdb_api::{Bmdb, Config};
//! use bmdb_core::{OrderedMap, Value};
//!
//! fn main() -> bmdb_core::Result<()> {
//! let mut db = Bmdb::open(Config::binary("./data.bmdb"))?;
//!
//! let mut body = OrderedMap::new();
//! body.insert("name", Value::String("Ada".into()));
//! let id = db.insert("people", Value::Map(body))?;
//!
//! assert!(db.get("people", id)?.is_some());
//! db.sync()?;
//! Ok(())
//! }
//! ```

mod config;
mod facade;

pub use config::{Config, StorageKind};
pub use facade::Bmdb;

pub use bmdb_concurrency::ConflictPolicy;
pub use bmdb_core::{Document, Error, OrderedMap, Path, Result, Value};
pub use bmdb_durability::DurabilityOptions;
pub use bmdb_engine::{
    CompoundUnique, FieldValidator, Relationship, Schema, SchemaTable, Selector, Table, Updater,
    UniqueConstraint,
};
pub use bmdb_query::{Op, Predicate, QueryPlan, Strategy};
pub use bmdb_storage::Storage;
