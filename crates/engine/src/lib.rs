//! Table and schema-table layers, doc-id allocation, query cache, and the
//! cross-table database facade.
//!
//! [`Table`] is the unvalidated CRUD surface over one named collection.
//! [`SchemaTable`] wraps it with field validation and uniqueness
//! constraints. Relationships span tables, so they are not attached to
//! any single table: [`Database`] owns every table plus the relationship
//! registry and is the only place that can walk a cascade delete.

#![warn(missing_docs)]

mod database;
mod doc_id;
mod query_cache;
mod relationships;
mod schema;
mod table;

pub use database::{Database, SCHEMA_TABLE_NAME};
pub use doc_id::DocIdAllocator;
pub use query_cache::QueryCache;
pub use relationships::{Relationship, RelationshipRegistry};
pub use schema::{CompoundUnique, FieldValidator, Schema, SchemaTable, UniqueConstraint};
pub use table::{Selector, Table, Updater};
