//! The query predicate tree.
//!
//! Every node evaluates against a [`Value`], not a `Document`, so `any`/`all`
//! over an array element can recurse through the very same leaf ops used at
//! the document root — a document is just the `Value::Map` the predicate
//! starts descending from.

use bmdb_core::{Path, Value};
use regex::Regex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Comparison/membership operator for a `field_op` leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Between,
    Matches,
    Exists,
}

/// How an `any`/`all` leaf tests each sequence element.
#[derive(Debug, Clone)]
pub enum SeqCond {
    /// Each element must equal this constant.
    Value(Value),
    /// Each element must appear in this set.
    In(Vec<Value>),
    /// Each element must satisfy a nested predicate.
    Predicate(Box<Predicate>),
}

/// A node in the predicate tree. `eval` takes the *value currently under
/// consideration* (the document root, or an array element reached through
/// `any`/`all`), so every leaf kind shares one evaluation path.
#[derive(Clone)]
pub enum Predicate {
    FieldOp {
        path: Path,
        op: Op,
        value: Option<Value>,
        value2: Option<Value>,
    },
    Any {
        path: Path,
        cond: SeqCond,
    },
    All {
        path: Path,
        cond: SeqCond,
    },
    Fragment {
        object: Value,
    },
    Raw {
        name: String,
        f: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::FieldOp {
                path, op, value, ..
            } => write!(f, "FieldOp({path}, {op:?}, {value:?})"),
            Predicate::Any { path, .. } => write!(f, "Any({path})"),
            Predicate::All { path, .. } => write!(f, "All({path})"),
            Predicate::Fragment { .. } => write!(f, "Fragment(..)"),
            Predicate::Raw { name, .. } => write!(f, "Raw({name})"),
            Predicate::And(children) => write!(f, "And({children:?})"),
            Predicate::Or(children) => write!(f, "Or({children:?})"),
            Predicate::Not(child) => write!(f, "Not({child:?})"),
        }
    }
}

impl Predicate {
    /// `field op value`.
    pub fn field_op(path: impl Into<Path>, op: Op, value: Value) -> Self {
        Predicate::FieldOp {
            path: path.into(),
            op,
            value: Some(value),
            value2: None,
        }
    }

    /// `field between lo and hi`.
    pub fn between(path: impl Into<Path>, lo: Value, hi: Value) -> Self {
        Predicate::FieldOp {
            path: path.into(),
            op: Op::Between,
            value: Some(lo),
            value2: Some(hi),
        }
    }

    /// `field in [values]`.
    pub fn in_list(path: impl Into<Path>, values: Vec<Value>) -> Self {
        Predicate::FieldOp {
            path: path.into(),
            op: Op::In,
            value: Some(Value::Array(values)),
            value2: None,
        }
    }

    /// `field exists`.
    pub fn exists(path: impl Into<Path>) -> Self {
        Predicate::FieldOp {
            path: path.into(),
            op: Op::Exists,
            value: None,
            value2: None,
        }
    }

    /// `field matches regex`.
    pub fn matches(path: impl Into<Path>, pattern: impl Into<String>) -> Self {
        Predicate::FieldOp {
            path: path.into(),
            op: Op::Matches,
            value: Some(Value::String(pattern.into())),
            value2: None,
        }
    }

    /// `fragment(obj)`: document contains the given sub-object.
    pub fn fragment(object: Value) -> Self {
        Predicate::Fragment { object }
    }

    /// `raw(fn)`: arbitrary predicate function, hashed as uncacheable.
    pub fn raw(
        name: impl Into<String>,
        f: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Predicate::Raw {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    pub fn and(children: Vec<Predicate>) -> Self {
        Predicate::And(children)
    }

    pub fn or(children: Vec<Predicate>) -> Self {
        Predicate::Or(children)
    }

    pub fn not(child: Predicate) -> Self {
        Predicate::Not(Box::new(child))
    }

    /// Evaluate against a root value (typically a document body).
    pub fn eval(&self, root: &Value) -> bool {
        match self {
            Predicate::FieldOp {
                path,
                op,
                value,
                value2,
            } => eval_field_op(path, op, value.as_ref(), value2.as_ref(), root),
            Predicate::Any { path, cond } => match path.resolve(root).and_then(Value::as_array) {
                Some(items) => items.iter().any(|item| eval_seq_cond(cond, item)),
                None => false,
            },
            Predicate::All { path, cond } => match path.resolve(root).and_then(Value::as_array) {
                Some(items) => !items.is_empty() && items.iter().all(|item| eval_seq_cond(cond, item)),
                None => false,
            },
            Predicate::Fragment { object } => contains_fragment(root, object),
            Predicate::Raw { f, .. } => {
                let f: &(dyn Fn(&Value) -> bool + Send + Sync) = f.as_ref();
                catch_unwind(AssertUnwindSafe(|| f(root))).unwrap_or(false)
            }
            Predicate::And(children) => children.iter().all(|c| c.eval(root)),
            Predicate::Or(children) => children.iter().any(|c| c.eval(root)),
            Predicate::Not(child) => !child.eval(root),
        }
    }

    /// Whether the structural hash of this predicate is defined. A `raw`
    /// leaf anywhere in the tree makes the whole tree uncacheable: cacheability
    /// is the conjunction of its children's cacheability.
    pub fn is_cacheable(&self) -> bool {
        match self {
            Predicate::Raw { .. } => false,
            Predicate::And(children) | Predicate::Or(children) => {
                children.iter().all(Predicate::is_cacheable)
            }
            Predicate::Not(child) => child.is_cacheable(),
            _ => true,
        }
    }

    /// Stable structural hash, `None` when any `raw` leaf is
    /// present. AND/OR fold their children's hashes with XOR so operand
    /// construction order never changes the result.
    pub fn stable_hash(&self) -> Option<u64> {
        if !self.is_cacheable() {
            return None;
        }
        Some(self.hash_unchecked())
    }

    fn hash_unchecked(&self) -> u64 {
        match self {
            Predicate::FieldOp {
                path,
                op,
                value,
                value2,
            } => {
                let mut bytes = Vec::new();
                bytes.extend_from_slice(b"field_op");
                bytes.extend_from_slice(path.to_string().as_bytes());
                bytes.push(op_tag(op));
                if let Some(v) = value {
                    bytes.extend_from_slice(&encode_for_hash(v));
                }
                if let Some(v) = value2 {
                    bytes.extend_from_slice(&encode_for_hash(v));
                }
                fnv1a(&bytes)
            }
            Predicate::Any { path, cond } => hash_seq_node(b"any", path, cond),
            Predicate::All { path, cond } => hash_seq_node(b"all", path, cond),
            Predicate::Fragment { object } => {
                let mut bytes = b"fragment".to_vec();
                bytes.extend_from_slice(&encode_for_hash(object));
                fnv1a(&bytes)
            }
            Predicate::Raw { .. } => unreachable!("raw predicates are filtered by is_cacheable"),
            Predicate::And(children) => combine_unordered(b"and", children),
            Predicate::Or(children) => combine_unordered(b"or", children),
            Predicate::Not(child) => {
                let inner = child.hash_unchecked();
                fnv1a(&[b"not".as_slice(), &inner.to_le_bytes()].concat())
            }
        }
    }
}

fn hash_seq_node(tag: &[u8], path: &Path, cond: &SeqCond) -> u64 {
    let mut bytes = tag.to_vec();
    bytes.extend_from_slice(path.to_string().as_bytes());
    match cond {
        SeqCond::Value(v) => {
            bytes.push(0);
            bytes.extend_from_slice(&encode_for_hash(v));
        }
        SeqCond::In(values) => {
            bytes.push(1);
            for v in values {
                bytes.extend_from_slice(&encode_for_hash(v));
            }
        }
        SeqCond::Predicate(p) => {
            bytes.push(2);
            bytes.extend_from_slice(&p.hash_unchecked().to_le_bytes());
        }
    }
    fnv1a(&bytes)
}

/// Hash the sorted set of child hashes so `and(a, b)` and `and(b, a)`
/// produce the same combined hash.
fn combine_unordered(tag: &[u8], children: &[Predicate]) -> u64 {
    let mut child_hashes: Vec<u64> = children.iter().map(Predicate::hash_unchecked).collect();
    child_hashes.sort_unstable();
    let mut bytes = tag.to_vec();
    for h in child_hashes {
        bytes.extend_from_slice(&h.to_le_bytes());
    }
    fnv1a(&bytes)
}

fn op_tag(op: &Op) -> u8 {
    match op {
        Op::Eq => 0,
        Op::Ne => 1,
        Op::Lt => 2,
        Op::Le => 3,
        Op::Gt => 4,
        Op::Ge => 5,
        Op::In => 6,
        Op::Between => 7,
        Op::Matches => 8,
        Op::Exists => 9,
    }
}

/// Canonical bytes for hashing: MessagePack encoding, since structurally
/// equal `Value`s already produce byte-equal encodings.
fn encode_for_hash(v: &Value) -> Vec<u8> {
    bmdb_codec::encode(v).unwrap_or_else(|_| vec![0xc1])
}

/// FNV-1a, 64-bit.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

fn eval_seq_cond(cond: &SeqCond, item: &Value) -> bool {
    match cond {
        SeqCond::Value(v) => item == v,
        SeqCond::In(values) => values.contains(item),
        SeqCond::Predicate(p) => p.eval(item),
    }
}

fn eval_field_op(
    path: &Path,
    op: &Op,
    value: Option<&Value>,
    value2: Option<&Value>,
    root: &Value,
) -> bool {
    let resolved = path.resolve(root);
    if matches!(op, Op::Exists) {
        return resolved.is_some();
    }
    let Some(actual) = resolved else {
        return false;
    };
    match op {
        Op::Eq => value.is_some_and(|v| actual == v),
        Op::Ne => value.is_some_and(|v| actual != v),
        Op::Lt => value
            .and_then(|v| crate::compare::compare_values(actual, v))
            .is_some_and(|o| o.is_lt()),
        Op::Le => value
            .and_then(|v| crate::compare::compare_values(actual, v))
            .is_some_and(|o| o.is_le()),
        Op::Gt => value
            .and_then(|v| crate::compare::compare_values(actual, v))
            .is_some_and(|o| o.is_gt()),
        Op::Ge => value
            .and_then(|v| crate::compare::compare_values(actual, v))
            .is_some_and(|o| o.is_ge()),
        Op::In => match value {
            Some(Value::Array(items)) => items.contains(actual),
            _ => false,
        },
        Op::Between => match (value, value2) {
            (Some(lo), Some(hi)) => {
                let above_lo = crate::compare::compare_values(actual, lo).is_some_and(|o| o.is_ge());
                let below_hi = crate::compare::compare_values(actual, hi).is_some_and(|o| o.is_le());
                above_lo && below_hi
            }
            _ => false,
        },
        Op::Matches => match (actual, value) {
            (Value::String(s), Some(Value::String(pattern))) => {
                Regex::new(pattern).map(|re| re.is_match(s)).unwrap_or(false)
            }
            _ => false,
        },
        Op::Exists => unreachable!("handled above"),
    }
}

fn contains_fragment(value: &Value, fragment: &Value) -> bool {
    match (value, fragment) {
        (Value::Map(v), Value::Map(f)) => f.iter().all(|(k, fv)| {
            v.get(k).is_some_and(|vv| contains_fragment(vv, fv))
        }),
        (v, f) => v == f,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmdb_core::OrderedMap;

    fn doc(fields: &[(&str, Value)]) -> Value {
        let mut m = OrderedMap::new();
        for (k, v) in fields {
            m.insert(*k, v.clone());
        }
        Value::Map(m)
    }

    #[test]
    fn eq_and_missing_field_is_false() {
        let d = doc(&[("age", Value::Int(30))]);
        assert!(Predicate::field_op("age", Op::Eq, Value::Int(30)).eval(&d));
        assert!(!Predicate::field_op("missing", Op::Eq, Value::Int(1)).eval(&d));
    }

    #[test]
    fn exists_leaf() {
        let d = doc(&[("age", Value::Int(30))]);
        assert!(Predicate::exists("age").eval(&d));
        assert!(!Predicate::exists("missing").eval(&d));
    }

    #[test]
    fn between_is_inclusive() {
        let d = doc(&[("age", Value::Int(25))]);
        assert!(Predicate::between("age", Value::Int(25), Value::Int(30)).eval(&d));
        assert!(Predicate::between("age", Value::Int(10), Value::Int(25)).eval(&d));
        assert!(!Predicate::between("age", Value::Int(26), Value::Int(30)).eval(&d));
    }

    #[test]
    fn and_or_not_short_circuit_semantics() {
        let d = doc(&[("a", Value::Int(1)), ("b", Value::Int(2))]);
        let and = Predicate::and(vec![
            Predicate::field_op("a", Op::Eq, Value::Int(1)),
            Predicate::field_op("b", Op::Eq, Value::Int(2)),
        ]);
        assert!(and.eval(&d));
        let or = Predicate::or(vec![
            Predicate::field_op("a", Op::Eq, Value::Int(99)),
            Predicate::field_op("b", Op::Eq, Value::Int(2)),
        ]);
        assert!(or.eval(&d));
        assert!(Predicate::not(Predicate::field_op("a", Op::Eq, Value::Int(99))).eval(&d));
    }

    #[test]
    fn any_and_all_over_array_field() {
        let d = doc(&[(
            "tags",
            Value::Array(vec![Value::String("a".into()), Value::String("b".into())]),
        )]);
        let any = Predicate::Any {
            path: "tags".into(),
            cond: SeqCond::Value(Value::String("a".into())),
        };
        assert!(any.eval(&d));
        let all = Predicate::All {
            path: "tags".into(),
            cond: SeqCond::Predicate(Box::new(Predicate::raw("is_string", |v| {
                matches!(v, Value::String(_))
            }))),
        };
        assert!(all.eval(&d));
    }

    #[test]
    fn all_over_empty_array_is_false() {
        let d = doc(&[("tags", Value::Array(vec![]))]);
        let all = Predicate::All {
            path: "tags".into(),
            cond: SeqCond::Value(Value::Int(1)),
        };
        assert!(!all.eval(&d));
    }

    #[test]
    fn fragment_matches_subobject() {
        let mut address = OrderedMap::new();
        address.insert("city", Value::String("Boston".into()));
        address.insert("zip", Value::String("02108".into()));
        let d = doc(&[("address", Value::Map(address))]);

        let mut frag = OrderedMap::new();
        frag.insert("city", Value::String("Boston".into()));
        let mut frag_outer = OrderedMap::new();
        frag_outer.insert("address", Value::Map(frag));

        assert!(Predicate::fragment(Value::Map(frag_outer)).eval(&d));
    }

    #[test]
    fn raw_predicate_panic_is_treated_as_false() {
        let p = Predicate::raw("boom", |_v| panic!("boom"));
        let d = doc(&[("a", Value::Int(1))]);
        assert!(!p.eval(&d));
    }

    #[test]
    fn raw_predicate_is_uncacheable() {
        let p = Predicate::raw("always_true", |_v| true);
        assert!(!p.is_cacheable());
        assert_eq!(p.stable_hash(), None);

        let and = Predicate::and(vec![Predicate::field_op("a", Op::Eq, Value::Int(1)), p]);
        assert_eq!(and.stable_hash(), None);
    }

    #[test]
    fn and_hash_is_order_independent() {
        let a = Predicate::field_op("x", Op::Eq, Value::Int(1));
        let b = Predicate::field_op("y", Op::Eq, Value::Int(2));
        let ab = Predicate::and(vec![a.clone(), b.clone()]);
        let ba = Predicate::and(vec![b, a]);
        assert_eq!(ab.stable_hash(), ba.stable_hash());
        assert!(ab.stable_hash().is_some());
    }

    #[test]
    fn different_predicates_hash_differently() {
        let a = Predicate::field_op("x", Op::Eq, Value::Int(1));
        let b = Predicate::field_op("x", Op::Eq, Value::Int(2));
        assert_ne!(a.stable_hash(), b.stable_hash());
    }

    #[test]
    fn matches_regex_leaf() {
        let d = doc(&[("email", Value::String("a@example.com".into()))]);
        assert!(Predicate::matches("email", r"^\w+@example\.com$").eval(&d));
        assert!(!Predicate::matches("email", r"^\w+@other\.com$").eval(&d));
    }
}
