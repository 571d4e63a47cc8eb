//! Sorted doc-id set with set-algebra operations.
//!
//! Small sets stay a plain sorted `Vec<u64>` (cheap to build, cheap to
//! iterate); once a set crosses [`DENSE_THRESHOLD`] entries it is rebuilt
//! into a `roaring::RoaringTreemap`, the idiomatic crate for large sparse
//! integer sets.
use roaring::RoaringTreemap;

const DENSE_THRESHOLD: usize = 64;

#[derive(Debug, Clone)]
enum Repr {
    Sparse(Vec<u64>),
    Dense(RoaringTreemap),
}

/// Sorted, de-duplicated set of positive doc-ids.
#[derive(Debug, Clone)]
pub struct DocIdBitmap {
    repr: Repr,
}

impl Default for DocIdBitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl DocIdBitmap {
    /// An empty bitmap.
    pub fn new() -> Self {
        DocIdBitmap {
            repr: Repr::Sparse(Vec::new()),
        }
    }

    /// A bitmap containing a single doc-id.
    pub fn single(id: u64) -> Self {
        DocIdBitmap {
            repr: Repr::Sparse(vec![id]),
        }
    }

    /// Build from an arbitrary (possibly unsorted, possibly duplicated)
    /// iterator of ids.
    pub fn from_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        let mut b = DocIdBitmap::new();
        for id in ids {
            b.insert(id);
        }
        b
    }

    /// Number of ids in the set.
    pub fn size(&self) -> usize {
        match &self.repr {
            Repr::Sparse(v) => v.len(),
            Repr::Dense(r) => r.len() as usize,
        }
    }

    /// Whether the set has no ids.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether `id` is present.
    pub fn contains(&self, id: u64) -> bool {
        match &self.repr {
            Repr::Sparse(v) => v.binary_search(&id).is_ok(),
            Repr::Dense(r) => r.contains(id),
        }
    }

    /// Insert an id, no-op if already present.
    pub fn insert(&mut self, id: u64) {
        match &mut self.repr {
            Repr::Sparse(v) => {
                if let Err(pos) = v.binary_search(&id) {
                    v.insert(pos, id);
                }
                if v.len() > DENSE_THRESHOLD {
                    self.promote();
                }
            }
            Repr::Dense(r) => {
                r.insert(id);
            }
        }
    }

    /// Remove an id, no-op if absent.
    pub fn remove(&mut self, id: u64) {
        match &mut self.repr {
            Repr::Sparse(v) => {
                if let Ok(pos) = v.binary_search(&id) {
                    v.remove(pos);
                }
            }
            Repr::Dense(r) => {
                r.remove(id);
            }
        }
    }

    fn promote(&mut self) {
        if let Repr::Sparse(v) = &self.repr {
            let mut r = RoaringTreemap::new();
            for &id in v {
                r.insert(id);
            }
            self.repr = Repr::Dense(r);
        }
    }

    /// Ascending iterator over the ids in the set.
    pub fn iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        match &self.repr {
            Repr::Sparse(v) => Box::new(v.iter().copied()),
            Repr::Dense(r) => Box::new(r.iter()),
        }
    }

    /// Union of two bitmaps (ids in either).
    pub fn union(&self, other: &DocIdBitmap) -> DocIdBitmap {
        merge_sorted(self.iter(), other.iter(), MergeOp::Union)
    }

    /// Intersection of two bitmaps (ids in both).
    pub fn intersect(&self, other: &DocIdBitmap) -> DocIdBitmap {
        merge_sorted(self.iter(), other.iter(), MergeOp::Intersect)
    }

    /// Difference (ids in `self` but not in `other`).
    pub fn difference(&self, other: &DocIdBitmap) -> DocIdBitmap {
        merge_sorted(self.iter(), other.iter(), MergeOp::Difference)
    }
}

enum MergeOp {
    Union,
    Intersect,
    Difference,
}

/// Linear merge of two ascending iterators — O(|a| + |b|) regardless of
/// representation, keeping union/intersect/difference linear in input size.
fn merge_sorted(
    mut a: Box<dyn Iterator<Item = u64> + '_>,
    mut b: Box<dyn Iterator<Item = u64> + '_>,
    op: MergeOp,
) -> DocIdBitmap {
    let mut out = Vec::new();
    let mut na = a.next();
    let mut nb = b.next();
    loop {
        match (na, nb) {
            (Some(x), Some(y)) => {
                if x < y {
                    if matches!(op, MergeOp::Union | MergeOp::Difference) {
                        out.push(x);
                    }
                    na = a.next();
                } else if y < x {
                    if matches!(op, MergeOp::Union) {
                        out.push(y);
                    }
                    nb = b.next();
                } else {
                    if matches!(op, MergeOp::Union | MergeOp::Intersect) {
                        out.push(x);
                    }
                    na = a.next();
                    nb = b.next();
                }
            }
            (Some(x), None) => {
                if matches!(op, MergeOp::Union | MergeOp::Difference) {
                    out.push(x);
                }
                na = a.next();
                while let Some(rest) = na {
                    if matches!(op, MergeOp::Union | MergeOp::Difference) {
                        out.push(rest);
                    }
                    na = a.next();
                }
                break;
            }
            (None, Some(y)) => {
                if matches!(op, MergeOp::Union) {
                    out.push(y);
                }
                nb = b.next();
                while let Some(rest) = nb {
                    if matches!(op, MergeOp::Union) {
                        out.push(rest);
                    }
                    nb = b.next();
                }
                break;
            }
            (None, None) => break,
        }
    }
    let mut result = DocIdBitmap::new();
    for id in out {
        result.insert(id);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_intersect_difference() {
        let a = DocIdBitmap::from_ids([1, 2, 3, 5]);
        let b = DocIdBitmap::from_ids([2, 3, 4]);
        assert_eq!(a.union(&b).iter().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert_eq!(a.intersect(&b).iter().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(a.difference(&b).iter().collect::<Vec<_>>(), vec![1, 5]);
    }

    #[test]
    fn promotes_past_dense_threshold() {
        let mut b = DocIdBitmap::new();
        for i in 0..200u64 {
            b.insert(i);
        }
        assert_eq!(b.size(), 200);
        assert!(b.contains(150));
        assert!(!b.contains(500));
        b.remove(150);
        assert!(!b.contains(150));
    }

    #[test]
    fn iteration_is_ascending() {
        let b = DocIdBitmap::from_ids([9, 1, 5, 3]);
        assert_eq!(b.iter().collect::<Vec<_>>(), vec![1, 3, 5, 9]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn ids() -> impl Strategy<Value = Vec<u64>> {
        prop::collection::vec(0u64..500, 0..150)
    }

    proptest! {
        #[test]
        fn union_matches_set_union(a in ids(), b in ids()) {
            let (sa, sb): (BTreeSet<u64>, BTreeSet<u64>) = (a.iter().copied().collect(), b.iter().copied().collect());
            let expected: Vec<u64> = sa.union(&sb).copied().collect();
            let got = DocIdBitmap::from_ids(a).union(&DocIdBitmap::from_ids(b)).iter().collect::<Vec<_>>();
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn intersect_matches_set_intersection(a in ids(), b in ids()) {
            let (sa, sb): (BTreeSet<u64>, BTreeSet<u64>) = (a.iter().copied().collect(), b.iter().copied().collect());
            let expected: Vec<u64> = sa.intersection(&sb).copied().collect();
            let got = DocIdBitmap::from_ids(a).intersect(&DocIdBitmap::from_ids(b)).iter().collect::<Vec<_>>();
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn difference_matches_set_difference(a in ids(), b in ids()) {
            let (sa, sb): (BTreeSet<u64>, BTreeSet<u64>) = (a.iter().copied().collect(), b.iter().copied().collect());
            let expected: Vec<u64> = sa.difference(&sb).copied().collect();
            let got = DocIdBitmap::from_ids(a).difference(&DocIdBitmap::from_ids(b)).iter().collect::<Vec<_>>();
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn insert_then_contains(ids in ids()) {
            let mut b = DocIdBitmap::new();
            for &id in &ids {
                b.insert(id);
            }
            for &id in &ids {
                prop_assert!(b.contains(id));
            }
            let unique: BTreeSet<u64> = ids.iter().copied().collect();
            prop_assert_eq!(b.size(), unique.len());
        }
    }
}
