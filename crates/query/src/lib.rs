//! Query predicates, field indexes, and the cost-based planner.
//!
//! A predicate evaluates against a [`bmdb_core::Value`] rather than a
//! `Document` directly, which lets `any`/`all` recurse through the same
//! leaf evaluator used at the document root. The planner never touches
//! storage: it only consumes the statistics [`IndexManager`] maintains and
//! returns a [`planner::QueryPlan`] describing how a caller (the table
//! layer) should execute the query.

mod compare;
mod field_index;
mod planner;
mod predicate;

pub use compare::{compare_values, IndexKey, NumKey};
pub use field_index::{FieldIndex, FieldStats};
pub use planner::{extract_conditions, Condition, IndexManager, QueryPlan, Strategy};
pub use predicate::{Op, Predicate, SeqCond};
