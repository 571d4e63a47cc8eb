//! JSON reference document file.
//!
//! On-disk shape: `{ <tableName>: { <docIdStr>: <body>, ... }, ... }` —
//! an RFC 8259 JSON object with decimal numeric keys. Used as the simplest
//! on-disk `Storage` for callers that don't need the B-tree/compaction
//! machinery, and as `bmdb-durability`'s default WAL base storage in tests.
use crate::{Storage, TableSnapshot};
use bmdb_core::{Error, OrderedMap, Result, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A `Storage` backed by a single human-readable JSON file, rewritten in
/// full (via a temp-file-then-rename, matching the binary store's
/// atomic-rename compaction pattern) on every mutating call.
pub struct JsonFileStore {
    path: PathBuf,
    tables: BTreeMap<String, TableSnapshot>,
}

impl JsonFileStore {
    /// Open (or create) a JSON document file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| Error::io("read", e))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                let parsed: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
                    Error::Corruption {
                        location: path.display().to_string(),
                        detail: e.to_string(),
                    }
                })?;
                parse_top_level(&parsed)?
            }
        } else {
            BTreeMap::new()
        };
        Ok(JsonFileStore { path, tables })
    }

    fn persist(&self) -> Result<()> {
        let mut top = serde_json::Map::new();
        for (table, docs) in &self.tables {
            let mut table_obj = serde_json::Map::new();
            for (id, body) in docs {
                table_obj.insert(id.to_string(), value_to_json(body));
            }
            top.insert(table.clone(), serde_json::Value::Object(table_obj));
        }
        let rendered =
            serde_json::to_string_pretty(&serde_json::Value::Object(top)).expect("json encode");

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut f = fs::File::create(&tmp_path).map_err(|e| Error::io("create", e))?;
            f.write_all(rendered.as_bytes())
                .map_err(|e| Error::io("write", e))?;
            f.sync_all().map_err(|e| Error::io("fsync", e))?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|e| Error::io("rename", e))?;
        Ok(())
    }
}

fn parse_top_level(v: &serde_json::Value) -> Result<BTreeMap<String, TableSnapshot>> {
    let obj = v.as_object().ok_or_else(|| Error::Corruption {
        location: "json store".into(),
        detail: "top level is not an object".into(),
    })?;
    let mut tables = BTreeMap::new();
    for (table, docs) in obj {
        let docs_obj = docs.as_object().ok_or_else(|| Error::Corruption {
            location: format!("json store/{table}"),
            detail: "table value is not an object".into(),
        })?;
        let mut snapshot = TableSnapshot::new();
        for (id_str, body) in docs_obj {
            let id: u64 = id_str.parse().map_err(|_| Error::Corruption {
                location: format!("json store/{table}"),
                detail: format!("non-numeric doc id key {id_str:?}"),
            })?;
            snapshot.insert(id, json_to_value(body));
        }
        tables.insert(table.clone(), snapshot);
    }
    Ok(tables)
}

fn value_to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in map.iter() {
                obj.insert(k.to_string(), value_to_json(v));
            }
            serde_json::Value::Object(obj)
        }
    }
}

fn json_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => Value::Array(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            let mut map = OrderedMap::new();
            for (k, v) in obj {
                map.insert(k.clone(), json_to_value(v));
            }
            Value::Map(map)
        }
    }
}

impl Storage for JsonFileStore {
    fn read_table(&mut self, table: &str) -> Result<TableSnapshot> {
        Ok(self.tables.get(table).cloned().unwrap_or_default())
    }

    fn write_table(&mut self, table: &str, docs: TableSnapshot) -> Result<()> {
        self.tables.insert(table.to_string(), docs);
        self.persist()
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
            .insert(doc_id, body);
        self.persist()
    }

    fn delete_document(&mut self, table: &str, doc_id: u64) -> Result<bool> {
        let removed = self
            .tables
            .get_mut(table)
            .map(|t| t.remove(&doc_id).is_some())
            .unwrap_or(false);
        if removed {
            self.persist()?;
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
        let entry = self.tables.entry(table.to_string()).or_default();
        for (id, body) in docs {
            entry.insert(id, body);
        }
        self.persist()
    }

    fn truncate_table(&mut self, table: &str) -> Result<()> {
        self.tables.remove(table);
        self.persist()
    }

    fn list_tables(&mut self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    fn sync(&mut self) -> Result<()> {
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn persists_and_reopens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs.json");
        {
            let mut s = JsonFileStore::open(&path).unwrap();
            s.write_document("users", 1, Value::String("Alice".into()))
                .unwrap();
        }
        let mut reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(
            reopened.read_document("users", 1).unwrap(),
            Some(Value::String("Alice".into()))
        );
    }

    #[test]
    fn rejects_non_numeric_doc_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"users": {"abc": {}}}"#).unwrap();
        assert!(JsonFileStore::open(&path).is_err());
    }
}
