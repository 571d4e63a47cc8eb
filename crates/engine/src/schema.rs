//! Schema-validated tables: wraps [`Table`] with synchronous
//! field validation and uniqueness constraints. Relationship bookkeeping
//! (which spans tables) lives one level up, in [`crate::database`].
use crate::table::{Selector, Table, Updater};
use bmdb_core::{Error, Path, Result, Value};
use bmdb_storage::Storage;
use std::sync::Arc;

/// A single-field validator: returns `Err(reason)` on failure.
pub type FieldValidator = Arc<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;

/// A single-field unique (optionally primary-key) constraint.
#[derive(Clone)]
pub struct UniqueConstraint {
    pub field: String,
    pub primary_key: bool,
}

/// A compound-unique constraint: the tuple of these fields' values must be
/// distinct across documents. A tuple with any null/missing component is
/// exempt.
#[derive(Clone)]
pub struct CompoundUnique {
    pub name: String,
    pub fields: Vec<String>,
}

/// Validation rules and uniqueness constraints for one table.
#[derive(Clone, Default)]
pub struct Schema {
    validators: Vec<(String, FieldValidator)>,
    unique: Vec<UniqueConstraint>,
    compound: Vec<CompoundUnique>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validator for a dotted field path, run on every
    /// insert/update.
    pub fn validate_field(
        mut self,
        path: impl Into<String>,
        f: impl Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validators.push((path.into(), Arc::new(f)));
        self
    }

    /// Declare a field unique (not a primary key).
    pub fn unique(mut self, field: impl Into<String>) -> Self {
        self.unique.push(UniqueConstraint {
            field: field.into(),
            primary_key: false,
        });
        self
    }

    /// Declare a field a unique primary key.
    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.unique.push(UniqueConstraint {
            field: field.into(),
            primary_key: true,
        });
        self
    }

    /// Declare a named compound-unique constraint over several fields.
    pub fn compound_unique(mut self, name: impl Into<String>, fields: Vec<String>) -> Self {
        self.compound.push(CompoundUnique {
            name: name.into(),
            fields,
        });
        self
    }
}

/// Wraps [`Table`] with schema validation.
pub struct SchemaTable<S: Storage> {
    table: Table<S>,
    schema: Schema,
}

impl<S: Storage> SchemaTable<S> {
    pub fn new(table: Table<S>, schema: Schema) -> Self {
        SchemaTable { table, schema }
    }

    /// Borrow the underlying unvalidated table (used for reads that don't
    /// need schema enforcement: `get`, `search`, `all`, `count`, `len`).
    pub fn table(&mut self) -> &mut Table<S> {
        &mut self.table
    }

    /// Replace the active schema, e.g. when a caller registers constraints
    /// on a table [`crate::Database`] already opened lazily with an empty
    /// one.
    pub fn set_schema(&mut self, schema: Schema) {
        self.schema = schema;
    }

    /// The active schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn validate(&self, body: &Value) -> Result<()> {
        for (path, validator) in &self.schema.validators {
            let value = Path::parse(path).resolve(body);
            if let Err(reason) = validator(value.unwrap_or(&Value::Null)) {
                return Err(Error::Validation {
                    path: path.clone(),
                    reason,
                });
            }
        }
        Ok(())
    }

    fn check_unique(&mut self, body: &Value, ignore_id: Option<u64>) -> Result<()> {
        for constraint in &self.schema.unique {
            let Some(value) = Path::parse(&constraint.field).resolve(body) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let predicate = bmdb_query::Predicate::field_op(
                constraint.field.as_str(),
                bmdb_query::Op::Eq,
                value.clone(),
            );
            let collision = self
                .table
                .search(&predicate)?
                .into_iter()
                .any(|doc| Some(doc.doc_id) != ignore_id);
            if collision {
                return Err(Error::UniqueConstraint {
                    field: constraint.field.clone(),
                    value: value.to_string(),
                });
            }
        }

        for group in &self.schema.compound {
            let values: Vec<Option<&Value>> = group
                .fields
                .iter()
                .map(|f| Path::parse(f).resolve(body))
                .collect();
            if values.iter().any(|v| v.is_none() || v.unwrap().is_null()) {
                continue; // any-null component exempts the tuple
            }
            let values: Vec<&Value> = values.into_iter().map(Option::unwrap).collect();
            let conditions: Vec<_> = group
                .fields
                .iter()
                .zip(values.iter())
                .map(|(f, v)| bmdb_query::Predicate::field_op(f.as_str(), bmdb_query::Op::Eq, (*v).clone()))
                .collect();
            let predicate = bmdb_query::Predicate::and(conditions);
            let collision = self
                .table
                .search(&predicate)?
                .into_iter()
                .any(|doc| Some(doc.doc_id) != ignore_id);
            if collision {
                return Err(Error::CompoundUnique {
                    group_name: group.name.clone(),
                    fields: group.fields.clone(),
                    values: values.iter().map(|v| v.to_string()).collect(),
                });
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, body: Value) -> Result<u64> {
        self.validate(&body)?;
        self.check_unique(&body, None)?;
        self.table.insert(body)
    }

    pub fn insert_multiple(&mut self, bodies: Vec<Value>) -> Result<Vec<u64>> {
        for body in &bodies {
            self.validate(body)?;
            self.check_unique(body, None)?;
        }
        self.table.insert_multiple(bodies)
    }

    pub fn update(&mut self, updater: &mut Updater, selector: Selector<'_>) -> Result<Vec<u64>> {
        let ids = match selector {
            Selector::All => self.table.all()?.into_iter().map(|d| d.doc_id).collect(),
            Selector::Ids(ids) => ids.to_vec(),
            Selector::Query(predicate) => self
                .table
                .search(predicate)?
                .into_iter()
                .map(|d| d.doc_id)
                .collect::<Vec<_>>(),
        };

        let mut candidates = Vec::with_capacity(ids.len());
        for id in &ids {
            let Some(old) = self.table.get_by_id(*id)? else {
                continue;
            };
            let mut new_body = old.body.clone();
            match updater {
                Updater::Fields(fields) => crate::table::merge_fields(&mut new_body, fields),
                Updater::Patch(f) => f(&mut new_body),
            }
            self.validate(&new_body)?;
            self.check_unique(&new_body, Some(*id))?;
            candidates.push((*id, new_body));
        }

        let mut updated = Vec::with_capacity(candidates.len());
        for (id, new_body) in candidates {
            if self.table.replace_body(id, new_body)? {
                updated.push(id);
            }
        }
        Ok(updated)
    }

    pub fn upsert(&mut self, body: Value, predicate: Option<&bmdb_query::Predicate>) -> Result<u64> {
        let Some(predicate) = predicate else {
            return self.insert(body);
        };
        let matches = self.table.search(predicate)?;
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

    pub fn remove(&mut self, selector: Selector<'_>) -> Result<Vec<u64>> {
        self.table.remove(selector)
    }

    pub fn truncate(&mut self) -> Result<()> {
        self.table.truncate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmdb_core::OrderedMap;
    use bmdb_storage::InMemoryStorage;
    use parking_lot::Mutex;
    use std::sync::Arc as StdArc;

    fn new_schema_table(schema: Schema) -> SchemaTable<InMemoryStorage> {
        let storage = StdArc::new(Mutex::new(InMemoryStorage::new()));
        let table = Table::open(storage, "users", 32).unwrap();
        SchemaTable::new(table, schema)
    }

    fn user(email: &str, age: i64) -> Value {
        let mut m = OrderedMap::new();
        m.insert("email", Value::String(email.into()));
        m.insert("age", Value::Int(age));
        Value::Map(m)
    }

    #[test]
    fn validation_rejects_bad_field() {
        let schema = Schema::new().validate_field("age", |v| match v {
            Value::Int(n) if *n >= 0 => Ok(()),
            _ => Err("age must be a non-negative integer".into()),
        });
        let mut t = new_schema_table(schema);
        let err = t.insert(user("a@example.com", -1)).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn unique_constraint_rejects_duplicate() {
        let schema = Schema::new().unique("email");
        let mut t = new_schema_table(schema);
        t.insert(user("a@example.com", 20)).unwrap();
        let err = t.insert(user("a@example.com", 30)).unwrap_err();
        assert!(matches!(err, Error::UniqueConstraint { .. }));
    }

    #[test]
    fn compound_unique_exempts_null_component() {
        let schema = Schema::new().compound_unique("email_age", vec!["email".into(), "age".into()]);
        let mut t = new_schema_table(schema);
        let mut nullish = OrderedMap::new();
        nullish.insert("email", Value::Null);
        nullish.insert("age", Value::Int(1));
        t.insert(Value::Map(nullish.clone())).unwrap();
        // a second row with the same null component is exempt, not a collision
        t.insert(Value::Map(nullish)).unwrap();
    }

    #[test]
    fn compound_unique_rejects_duplicate_tuple() {
        let schema = Schema::new().compound_unique("email_age", vec!["email".into(), "age".into()]);
        let mut t = new_schema_table(schema);
        t.insert(user("a@example.com", 20)).unwrap();
        let err = t.insert(user("a@example.com", 20)).unwrap_err();
        assert!(matches!(err, Error::CompoundUnique { .. }));
    }

    #[test]
    fn update_revalidates_merged_body() {
        let schema = Schema::new().validate_field("age", |v| match v {
            Value::Int(n) if *n >= 0 => Ok(()),
            _ => Err("age must be a non-negative integer".into()),
        });
        let mut t = new_schema_table(schema);
        let id = t.insert(user("a@example.com", 20)).unwrap();
        let mut patch = OrderedMap::new();
        patch.insert("age", Value::Int(-5));
        let mut updater = Updater::Fields(Value::Map(patch));
        let err = t.update(&mut updater, Selector::Ids(&[id])).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
