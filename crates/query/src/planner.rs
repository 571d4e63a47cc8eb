//! Index manager and cost-based query planner.
use crate::field_index::{FieldIndex, FieldStats};
use crate::predicate::{Op, Predicate};
use bmdb_btree::DocIdBitmap;
use bmdb_core::{Document, Value};
use std::collections::HashMap;

/// One indexable condition extracted from a predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Op,
    pub value: Value,
    pub value2: Option<Value>,
}

/// Chosen execution strategy for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    IndexScan,
    Hybrid,
    FullScan,
}

/// The planner's output.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub strategy: Strategy,
    pub index_field: Option<String>,
    pub conditions: Vec<Condition>,
    pub estimated_cost: f64,
    pub estimated_selectivity: f64,
    pub expected_row_count: u64,
    pub confidence: f64,
    pub use_index: bool,
    pub fallback_to_scan: bool,
}

impl QueryPlan {
    fn full_scan(total_docs: u64, conditions: Vec<Condition>) -> Self {
        QueryPlan {
            strategy: Strategy::FullScan,
            index_field: None,
            conditions,
            estimated_cost: total_docs as f64,
            estimated_selectivity: 1.0,
            expected_row_count: total_docs,
            confidence: 0.0,
            use_index: false,
            fallback_to_scan: false,
        }
    }
}

/// Walk a predicate tree and collect the flat list of indexable conditions
/// it implies. AND subtrees contribute the union
/// of their children's conditions. OR contributes a single combined
/// condition only when every branch names the same field and is itself a
/// single equality/in condition; otherwise that OR subtree yields nothing
/// and is left to residual filtering.
pub fn extract_conditions(predicate: &Predicate) -> Vec<Condition> {
    match predicate {
        Predicate::FieldOp {
            path,
            op,
            value,
            value2,
        } => {
            let Some(field) = path.as_single_field() else {
                return vec![];
            };
            if !matches!(op, Op::Eq | Op::In | Op::Between | Op::Lt | Op::Le | Op::Gt | Op::Ge) {
                return vec![];
            }
            let Some(value) = value.clone() else {
                return vec![];
            };
            vec![Condition {
                field: field.to_string(),
                op: op.clone(),
                value,
                value2: value2.clone(),
            }]
        }
        Predicate::And(children) => children.iter().flat_map(extract_conditions).collect(),
        Predicate::Or(children) => {
            let per_child: Vec<Vec<Condition>> = children.iter().map(extract_conditions).collect();
            if per_child.iter().any(|c| c.len() != 1) {
                return vec![];
            }
            let singles: Vec<&Condition> = per_child.iter().map(|c| &c[0]).collect();
            let field = &singles[0].field;
            if !singles.iter().all(|c| &c.field == field) {
                return vec![];
            }
            if singles.iter().all(|c| c.op == Op::Eq) {
                vec![Condition {
                    field: field.clone(),
                    op: Op::In,
                    value: Value::Array(singles.iter().map(|c| c.value.clone()).collect()),
                    value2: None,
                }]
            } else {
                vec![]
            }
        }
        _ => vec![],
    }
}

fn selectivity_for(cond: &Condition, stats: Option<FieldStats>) -> f64 {
    let Some(stats) = stats else { return 1.0 };
    let distinct = stats.distinct_values.max(1);
    match cond.op {
        Op::Eq => 1.0 / distinct as f64,
        Op::In => {
            let k = match &cond.value {
                Value::Array(items) => items.len(),
                _ => 1,
            };
            (k as f64 / distinct as f64).min(1.0)
        }
        Op::Lt | Op::Le | Op::Gt | Op::Ge => 0.3,
        Op::Between => 0.2,
        _ => 1.0,
    }
}

/// Maintains per-field indexes, their statistics, and the total document
/// count for the cost model.
#[derive(Debug, Default)]
pub struct IndexManager {
    indexes: HashMap<String, FieldIndex>,
    total_docs: u64,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_docs(&self) -> u64 {
        self.total_docs
    }

    pub fn set_total_docs(&mut self, n: u64) {
        self.total_docs = n;
    }

    /// Update indexes for every indexable top-level field of a newly
    /// inserted document.
    pub fn record_insert(&mut self, doc: &Document) {
        let Some(map) = doc.body.as_map() else { return };
        for (field, value) in map.iter() {
            if value.is_indexable_primitive() {
                self.indexes
                    .entry(field.to_string())
                    .or_default()
                    .insert(value, doc.doc_id);
            }
        }
    }

    /// Remove a document's index entries (called before delete / on update
    /// of the old value).
    pub fn record_remove(&mut self, doc: &Document) {
        let Some(map) = doc.body.as_map() else { return };
        for (field, value) in map.iter() {
            if value.is_indexable_primitive() {
                if let Some(idx) = self.indexes.get_mut(field) {
                    idx.remove(value, doc.doc_id);
                }
            }
        }
    }

    pub fn stats_for(&self, field: &str) -> Option<FieldStats> {
        self.indexes.get(field).map(FieldIndex::stats)
    }

    pub fn index_for(&self, field: &str) -> Option<&FieldIndex> {
        self.indexes.get(field)
    }

    /// Produce the bitmap an indexed condition resolves to.
    pub fn bitmap_for(&self, cond: &Condition) -> Option<DocIdBitmap> {
        let idx = self.indexes.get(&cond.field)?;
        Some(match cond.op {
            Op::Eq => idx.get_exact(&cond.value),
            Op::In => match &cond.value {
                Value::Array(items) => idx.get_in(items),
                other => idx.get_exact(other),
            },
            Op::Between => {
                let hi = cond.value2.as_ref().unwrap_or(&cond.value);
                idx.get_range(&cond.value, hi, true)
            }
            Op::Gt => idx.get_greater_than(&cond.value, false),
            Op::Ge => idx.get_greater_than(&cond.value, true),
            Op::Lt => idx.get_less_than(&cond.value, false),
            Op::Le => idx.get_less_than(&cond.value, true),
            _ => return None,
        })
    }

    /// Build a cost-based plan for a predicate.
    pub fn plan(&self, predicate: &Predicate) -> QueryPlan {
        let conditions = extract_conditions(predicate);
        if conditions.is_empty() {
            return QueryPlan::full_scan(self.total_docs, conditions);
        }

        let mut has_stats = 0usize;
        let mut best: Option<(usize, f64)> = None; // (index into conditions, selectivity)
        for (i, cond) in conditions.iter().enumerate() {
            let stats = self.indexes.get(&cond.field).map(FieldIndex::stats);
            if stats.is_some() {
                has_stats += 1;
            }
            if self.indexes.contains_key(&cond.field) {
                let sel = selectivity_for(cond, stats);
                let better = match &best {
                    Some((_, b)) => sel < *b,
                    None => true,
                };
                if better {
                    best = Some((i, sel));
                }
            }
        }

        let Some((best_idx, selectivity)) = best else {
            return QueryPlan::full_scan(self.total_docs, conditions);
        };

        let confidence = has_stats as f64 / conditions.len() as f64;
        let total_docs = self.total_docs as f64;
        let expected_rows = (total_docs * selectivity).ceil().max(0.0);
        let cost_index = 0.1 + expected_rows * 0.05 + expected_rows * 0.2 + expected_rows * 0.1;
        let cost_hybrid = cost_index + total_docs * selectivity * 0.1;
        let cost_full = total_docs;
        let residual_remains = conditions.len() > 1;

        let mut strategy = if cost_index <= cost_full && cost_index <= cost_hybrid {
            Strategy::IndexScan
        } else if residual_remains && cost_hybrid < cost_full {
            Strategy::Hybrid
        } else {
            Strategy::FullScan
        };

        let chosen_cost = match strategy {
            Strategy::IndexScan => cost_index,
            Strategy::Hybrid => cost_hybrid,
            Strategy::FullScan => cost_full,
        };

        let mut fallback_to_scan = false;
        if confidence < 0.5 && strategy != Strategy::FullScan {
            let improvement = if cost_full > 0.0 {
                (cost_full - chosen_cost) / cost_full
            } else {
                1.0
            };
            if improvement < 0.3 {
                tracing::debug!(confidence, improvement, "planner falling back to full scan");
                strategy = Strategy::FullScan;
                fallback_to_scan = true;
            }
        }

        let (estimated_cost, use_index) = match strategy {
            Strategy::FullScan => (cost_full, false),
            Strategy::IndexScan => (cost_index, true),
            Strategy::Hybrid => (cost_hybrid, true),
        };

        QueryPlan {
            strategy,
            index_field: if strategy == Strategy::FullScan {
                None
            } else {
                Some(conditions[best_idx].field.clone())
            },
            conditions,
            estimated_cost,
            estimated_selectivity: selectivity,
            expected_row_count: expected_rows as u64,
            confidence,
            use_index,
            fallback_to_scan,
        }
    }
}
