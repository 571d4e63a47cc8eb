//! The `Value` type and the `Document` wrapper around it.
//!
//! `Value` is the tagged variant every other crate in this workspace builds
//! on: the MessagePack codec encodes/decodes it, the B-tree indexes compare
//! it, and the query predicate evaluates against it. A `Document` is a
//! `Value::Map` plus a `doc_id` that is never part of the serialized body.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Field name a stored document body must never contain; synthesized on read.
pub const DOC_ID_FIELD: &str = "doc_id";
/// Legacy camelCase alias some callers use; also rejected in stored bodies.
pub const DOC_ID_FIELD_CAMEL: &str = "docId";

/// Tagged value type for primitives, arrays, and maps.
///
/// Maps use a `BTreeMap` rather than a `HashMap` so that two structurally
/// equal documents produce byte-equal MessagePack encodings regardless of
/// insertion order history in memory. Field order as written by a caller is
/// preserved separately by [`OrderedMap`], which wraps a map-shaped value
/// before it reaches a `BTreeMap`-keyed structure like this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer. Values outside i32/u32 range are encoded as
    /// float64 on the wire (see `bmdb-codec`); kept as `I64` in memory.
    Int(i64),
    /// 64-bit IEEE-754 float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Map with string keys. Order of insertion is preserved.
    Map(OrderedMap),
}

/// A string-keyed map that preserves insertion order.
///
/// Plain `BTreeMap<String, Value>` would silently reorder keys
/// lexicographically, which breaks the codec's "preserve insertion order"
/// contract for round-trips through tools that care about field
/// order. `OrderedMap` keeps a `Vec<(String, Value)>` internally and
/// provides map-like accessors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderedMap(Vec<(String, Value)>);

impl OrderedMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up a key, returning the first match in insertion order.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Mutable lookup.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert or replace a key, preserving the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    /// Remove a key, returning its value if present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(idx).1)
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Build from a standard `BTreeMap`, sorted by key (used where no
    /// original insertion order exists, e.g. constructed from JSON).
    pub fn from_btree(map: BTreeMap<String, Value>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl PartialEq for OrderedMap {
    fn eq(&self, other: &Self) -> bool {
        // Map semantics: key set and values equal regardless of order.
        if self.0.len() != other.0.len() {
            return false;
        }
        self.0.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl FromIterator<(String, Value)> for OrderedMap {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut map = OrderedMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Value {
    /// True for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Return this value as a `Value::Map`'s entries, if it is one.
    pub fn as_map(&self) -> Option<&OrderedMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Mutable access to a `Value::Map`'s entries, if it is one.
    pub fn as_map_mut(&mut self) -> Option<&mut OrderedMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Return this value's array entries, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Whether this value is a primitive indexable by the field index.
    /// Null, arrays, and maps are skipped by indexing.
    pub fn is_indexable_primitive(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_)
        )
    }

    /// Numeric magnitude as `f64`, for cross-int/float comparisons. `None`
    /// for non-numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(_) => write!(f, "[array]"),
            Value::Map(_) => write!(f, "{{map}}"),
        }
    }
}

/// A document: a map-shaped `Value` plus its table-assigned id.
///
/// `doc_id` is never serialized as part of the body; it
/// is synthesized from the storage key on read and stripped before write.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Positive, table-unique identifier.
    pub doc_id: u64,
    /// The document body. Always `Value::Map` in practice; kept as `Value`
    /// so callers constructing documents can reuse generic `Value` helpers.
    pub body: Value,
}

impl Document {
    /// Wrap a body with its doc id, stripping any `doc_id`/`docId` fields
    /// that might already be present (defensive — callers should not set
    /// these, but a body round-tripped through JSON could carry them).
    pub fn new(doc_id: u64, mut body: Value) -> Self {
        if let Some(map) = body.as_map_mut() {
            map.remove(DOC_ID_FIELD);
            map.remove(DOC_ID_FIELD_CAMEL);
        }
        Self { doc_id, body }
    }

    /// Field accessor on the body, `None` if the body isn't a map or the
    /// field is absent.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.as_map()?.get(name)
    }

    /// The body as stored on disk: the map without a synthesized id field.
    pub fn storage_body(&self) -> &Value {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_map_preserves_insertion_order() {
        let mut m = OrderedMap::new();
        m.insert("z", Value::Int(1));
        m.insert("a", Value::Int(2));
        let keys: Vec<&str> = m.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn ordered_map_equality_ignores_order() {
        let mut a = OrderedMap::new();
        a.insert("x", Value::Int(1));
        a.insert("y", Value::Int(2));
        let mut b = OrderedMap::new();
        b.insert("y", Value::Int(2));
        b.insert("x", Value::Int(1));
        assert_eq!(a, b);
    }

    #[test]
    fn document_strips_doc_id_fields() {
        let mut body = OrderedMap::new();
        body.insert("doc_id", Value::Int(999));
        body.insert("name", Value::String("a".into()));
        let doc = Document::new(1, Value::Map(body));
        assert!(doc.field("doc_id").is_none());
        assert_eq!(doc.field("name"), Some(&Value::String("a".into())));
    }

    #[test]
    fn indexable_primitive_excludes_containers() {
        assert!(Value::Int(1).is_indexable_primitive());
        assert!(Value::String("s".into()).is_indexable_primitive());
        assert!(!Value::Null.is_indexable_primitive());
        assert!(!Value::Array(vec![]).is_indexable_primitive());
        assert!(!Value::Map(OrderedMap::new()).is_indexable_primitive());
    }
}
