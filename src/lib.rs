//! # bmdb
//!
//! An embedded, single-process document database: a MessagePack codec, a
//! persistent B-tree, a single-file binary store, a write-ahead log with
//! MVCC version chains, and a cost-based query planner, all wrapped in a
//! table and schema-table layer with relationships and cascade delete.
//!
//! # Quick Start
//!
//! ```no_run
//! use bmdb::{Bmdb, Config, OrderedMap, Value};
//!
//! fn main() -> bmdb::Result<()> {
//! let mut db = Bmdb::open(Config::binary("./data.bmdb"))?;
//!
//! let mut body = OrderedMap::new();
//! body.insert("name", Value::String("Ada".into()));
//! body.insert("age", Value::Int(30));
//! let id = db.insert("people", Value::Map(body))?;
//!
//! let found = db.get("people", id)?;
//! assert!(found.is_some());
//!
//! db.sync()?;
//! Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! [`Bmdb`] is the single entry point; it picks a storage backend from a
//! [`Config`] (in-memory, JSON reference file, or the production binary
//! file format, each optionally wrapped in a write-ahead log) and exposes
//! the table/schema-table/relationship surface over it. The lower-level
//! crates (codec, B-tree, storage, concurrency, durability, query, engine)
//! are internal implementation detail; only this crate's re-exported
//! surface is the stable public API.

pub use bmdb_api::*;
