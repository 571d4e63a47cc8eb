//! `hasMany` relationship bookkeeping and cascade delete.
//!
//! Relationships are registered and persisted at the database level (they
//! name two tables), so this module holds plain data plus the rules for
//! registering and tearing them down; the cross-table work of walking a
//! cascade happens in [`crate::database`], which is the only place that
//! holds every table at once.
use bmdb_core::{Error, Result};
use std::collections::HashMap;

/// One `parentTable.parentField -> childTable.childField` relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub parent_table: String,
    pub parent_field: String,
    pub child_table: String,
    pub child_field: String,
    pub cascade: bool,
}

/// All registered relationships, indexed by parent table for fast cascade
/// and lookup traversal.
#[derive(Debug, Clone, Default)]
pub struct RelationshipRegistry {
    by_parent: HashMap<String, Vec<Relationship>>,
}

impl RelationshipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relationship. A self-referencing relationship
    /// (`parent_table == child_table`) with `cascade = true` is rejected:
    /// a cascading delete on a table that is its own child would delete the
    /// row that triggered it.
    pub fn add(&mut self, rel: Relationship) -> Result<()> {
        if rel.cascade && rel.parent_table == rel.child_table {
            return Err(Error::Validation {
                path: format!("relationship.{}", rel.parent_table),
                reason: "self-referencing relationship with cascade=true is not allowed".into(),
            });
        }
        self.by_parent.entry(rel.parent_table.clone()).or_default().push(rel);
        Ok(())
    }

    /// Drop a specific relationship, returning whether one was removed.
    pub fn remove(&mut self, parent_table: &str, parent_field: &str, child_table: &str, child_field: &str) -> bool {
        let Some(list) = self.by_parent.get_mut(parent_table) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| {
            !(r.parent_field == parent_field && r.child_table == child_table && r.child_field == child_field)
        });
        let removed = list.len() != before;
        if list.is_empty() {
            self.by_parent.remove(parent_table);
        }
        removed
    }

    /// Drop every registered relationship.
    pub fn clear(&mut self) {
        self.by_parent.clear();
    }

    /// Relationships where `parent_table` is the parent.
    pub fn for_parent(&self, parent_table: &str) -> &[Relationship] {
        self.by_parent.get(parent_table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Relationships where `child_table` is the child, across every parent.
    pub fn for_child<'a>(&'a self, child_table: &'a str) -> impl Iterator<Item = &'a Relationship> {
        self.by_parent.values().flatten().filter(move |r| r.child_table == child_table)
    }

    /// All registered relationships, in no particular order.
    pub fn all(&self) -> impl Iterator<Item = &Relationship> {
        self.by_parent.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.by_parent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(parent: &str, child: &str, cascade: bool) -> Relationship {
        Relationship {
            parent_table: parent.into(),
            parent_field: "id".into(),
            child_table: child.into(),
            child_field: "parent_id".into(),
            cascade,
        }
    }

    #[test]
    fn self_referencing_cascade_is_rejected() {
        let mut reg = RelationshipRegistry::new();
        let err = reg.add(rel("categories", "categories", true)).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn self_referencing_without_cascade_is_allowed() {
        let mut reg = RelationshipRegistry::new();
        reg.add(rel("categories", "categories", false)).unwrap();
        assert_eq!(reg.for_parent("categories").len(), 1);
    }

    #[test]
    fn remove_drops_only_the_named_relationship() {
        let mut reg = RelationshipRegistry::new();
        reg.add(rel("users", "orders", true)).unwrap();
        reg.add(rel("users", "sessions", false)).unwrap();
        assert!(reg.remove("users", "id", "orders", "parent_id"));
        assert_eq!(reg.for_parent("users").len(), 1);
        assert_eq!(reg.for_parent("users")[0].child_table, "sessions");
    }

    #[test]
    fn for_child_finds_relationships_across_parents() {
        let mut reg = RelationshipRegistry::new();
        reg.add(rel("users", "orders", true)).unwrap();
        reg.add(rel("stores", "orders", false)).unwrap();
        let parents: Vec<_> = reg.for_child("orders").map(|r| r.parent_table.as_str()).collect();
        assert_eq!(parents.len(), 2);
    }
}
