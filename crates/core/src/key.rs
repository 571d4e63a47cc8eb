//! Dotted field paths for resolving nested values inside a document.
//!
//! Modeled as an explicit path type rather than dynamic property
//! interception: the query DSL builds a `Path` with a small fluent API.

use crate::value::Value;
use std::fmt;

/// One segment of a dotted path. Only field access is needed by the query
/// predicate leaves (`any`/`all` iterate a sequence directly rather than
/// addressing elements by index), so `Path` carries field segments only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSegment(pub String);

/// A dotted path such as `"address.city"`, resolved against a `Value::Map`
/// chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path(Vec<PathSegment>);

impl Path {
    /// Parse a dotted string into a path. Empty segments (leading/trailing
    /// or doubled dots) are dropped rather than erroring — a defensive
    /// choice matching how permissive field-path parsers in the pack behave.
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| PathSegment(s.to_string()))
            .collect();
        Path(segments)
    }

    /// Build a single-field path directly, skipping the dotted parse.
    pub fn field(name: impl Into<String>) -> Self {
        Path(vec![PathSegment(name.into())])
    }

    /// Append a field segment, fluent-builder style.
    pub fn push(mut self, name: impl Into<String>) -> Self {
        self.0.push(PathSegment(name.into()));
        self
    }

    /// The top-level field name, if this path has exactly one segment.
    /// Used by the index manager, which only indexes top-level fields.
    pub fn as_single_field(&self) -> Option<&str> {
        if self.0.len() == 1 {
            Some(self.0[0].0.as_str())
        } else {
            None
        }
    }

    /// Resolve this path against a value, descending through maps.
    /// Missing intermediate fields or non-map intermediates yield `None`.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for seg in &self.0 {
            let map = current.as_map()?;
            current = map.get(&seg.0)?;
        }
        Some(current)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|s| s.0.as_str())
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{joined}")
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::parse(s)
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Path::parse(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::OrderedMap;

    fn nested() -> Value {
        let mut inner = OrderedMap::new();
        inner.insert("city", Value::String("Boston".into()));
        let mut outer = OrderedMap::new();
        outer.insert("address", Value::Map(inner));
        Value::Map(outer)
    }

    #[test]
    fn resolves_nested_path() {
        let v = nested();
        let p = Path::parse("address.city");
        assert_eq!(p.resolve(&v), Some(&Value::String("Boston".into())));
    }

    #[test]
    fn missing_intermediate_is_none() {
        let v = nested();
        let p = Path::parse("address.zip.code");
        assert_eq!(p.resolve(&v), None);
    }

    #[test]
    fn single_field_detection() {
        assert_eq!(Path::parse("dept").as_single_field(), Some("dept"));
        assert_eq!(Path::parse("a.b").as_single_field(), None);
    }
}
