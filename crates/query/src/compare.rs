//! Type-aware value ordering shared by the field index and predicate ops.
use bmdb_core::Value;
use std::cmp::Ordering;

/// Compare two values, `None` if they aren't the same comparable family
/// (cross-type comparisons return no rows — callers treat `None`
/// as "never matches" rather than panicking).
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Some(x.total_cmp(&y)),
            _ => None,
        },
    }
}

/// A totally-ordered key for the in-memory field index. Maps
/// `Value::Int`/`Value::Float` onto the same numeric bucket so a field
/// that mixes int and float values still orders correctly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexKey {
    /// `false` sorts before `true`.
    Bool(bool),
    /// Int and float values share one numeric ordering.
    Num(NumKey),
    /// Lexicographic (byte-wise) string ordering.
    Str(String),
}

/// `f64` wrapper with a total order (`f64::total_cmp`), so it can live
/// inside an `Ord` key without NaN breaking `BTreeMap`'s invariants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumKey(pub f64);

impl Eq for NumKey {}

impl PartialOrd for NumKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NumKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl IndexKey {
    /// Build an index key from an indexable primitive. `None` for
    /// null/array/map.
    pub fn from_value(v: &Value) -> Option<IndexKey> {
        match v {
            Value::Bool(b) => Some(IndexKey::Bool(*b)),
            Value::Int(i) => Some(IndexKey::Num(NumKey(*i as f64))),
            Value::Float(f) => Some(IndexKey::Num(NumKey(*f))),
            Value::String(s) => Some(IndexKey::Str(s.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_compare_numerically_across_int_and_float() {
        let a = IndexKey::from_value(&Value::Int(2)).unwrap();
        let b = IndexKey::from_value(&Value::Float(10.5)).unwrap();
        assert!(a < b);
    }

    #[test]
    fn bool_false_before_true() {
        let f = IndexKey::from_value(&Value::Bool(false)).unwrap();
        let t = IndexKey::from_value(&Value::Bool(true)).unwrap();
        assert!(f < t);
    }

    #[test]
    fn strings_are_lexicographic() {
        let a = IndexKey::from_value(&Value::String("apple".into())).unwrap();
        let b = IndexKey::from_value(&Value::String("banana".into())).unwrap();
        assert!(a < b);
    }

    #[test]
    fn null_and_containers_are_not_indexable() {
        assert!(IndexKey::from_value(&Value::Null).is_none());
        assert!(IndexKey::from_value(&Value::Array(vec![])).is_none());
    }

    #[test]
    fn cross_type_compare_values_is_none() {
        assert_eq!(
            compare_values(&Value::String("1".into()), &Value::Int(1)),
            None
        );
        assert_eq!(compare_values(&Value::Bool(true), &Value::Int(1)), None);
    }
}
