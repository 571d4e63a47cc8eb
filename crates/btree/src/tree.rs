//! B+tree operations over an opaque [`PageStore`].
//!
//! Structurally this is a B+tree: only leaves hold `(key, offset, length)`
//! payloads, internal nodes hold separator keys only, and leaves are
//! chained so a caller can walk the whole tree in sorted order without
//! re-descending from the root. Order 16 (`BTREE_ORDER`), 7..=15 keys per
//! node (`BTREE_MIN_KEYS`/`BTREE_MAX_KEYS`).

use crate::cache::NodeCache;
use crate::node::{Node, NO_OFFSET};
use crate::store::PageStore;
use crate::BtreeError;
use bmdb_core::limits::{BTREE_MAX_KEYS, BTREE_MIN_KEYS};

/// A leaf payload: span of the document region this key's value occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// Byte offset into the document area.
    pub offset: u32,
    /// Length in bytes.
    pub length: u32,
}

/// A B+tree rooted at `root` (or empty, `NO_OFFSET`), running over `S`.
pub struct BTree<S: PageStore> {
    store: S,
    cache: NodeCache,
    root: u32,
}

impl<S: PageStore> BTree<S> {
    /// Open a tree with a known root offset (`NO_OFFSET` for an empty tree).
    pub fn open(store: S, root: u32) -> Self {
        BTree {
            store,
            cache: NodeCache::default(),
            root,
        }
    }

    /// Current root node offset, `NO_OFFSET` if the tree is empty. Callers
    /// persist this into their own header after mutating calls.
    pub fn root_offset(&self) -> u32 {
        self.root
    }

    /// Borrow the underlying store (used by callers that also read/write
    /// the document area the B-tree's entries point into).
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    fn get_node(&mut self, offset: u32) -> Result<Node, BtreeError> {
        if let Some(n) = self.cache.get(offset) {
            return Ok(n);
        }
        let bytes = self.store.read_node(offset)?;
        let node = Node::deserialize(offset, &bytes)?;
        self.cache.put(node.clone());
        Ok(node)
    }

    fn put_node(&mut self, node: Node) -> Result<(), BtreeError> {
        let bytes = node.serialize()?;
        self.store.write_node(node.offset, &bytes)?;
        self.cache.put(node);
        Ok(())
    }

    fn free_node(&mut self, offset: u32) {
        self.cache.invalidate(offset);
        self.store.free_node(offset);
    }

    /// Point lookup.
    pub fn find(&mut self, key: &str) -> Result<Option<Entry>, BtreeError> {
        if self.root == NO_OFFSET {
            return Ok(None);
        }
        let mut offset = self.root;
        loop {
            let node = self.get_node(offset)?;
            if node.is_leaf {
                return Ok(node
                    .keys
                    .binary_search_by(|k| k.as_str().cmp(key))
                    .ok()
                    .map(|i| {
                        let (o, l) = node.values[i];
                        Entry {
                            offset: o,
                            length: l,
                        }
                    }));
            }
            offset = node.children[child_index_for_key(&node, key)];
        }
    }

    /// Insert or overwrite `key` with `entry`.
    pub fn insert(&mut self, key: &str, entry: Entry) -> Result<(), BtreeError> {
        if self.root == NO_OFFSET {
            let offset = self.store.allocate_node()?;
            let mut leaf = Node::new_leaf(offset);
            leaf.keys.push(key.to_string());
            leaf.values.push((entry.offset, entry.length));
            self.put_node(leaf)?;
            self.root = offset;
            return Ok(());
        }
        if let Some((median, right_offset)) = self.insert_recursive(self.root, key, entry)? {
            let new_root_offset = self.store.allocate_node()?;
            let mut new_root = Node::new_internal(new_root_offset);
            new_root.keys.push(median);
            new_root.children.push(self.root);
            new_root.children.push(right_offset);

            let mut old_root = self.get_node(self.root)?;
            old_root.parent = new_root_offset;
            self.put_node(old_root)?;
            let mut right = self.get_node(right_offset)?;
            right.parent = new_root_offset;
            self.put_node(right)?;

            self.put_node(new_root)?;
            self.root = new_root_offset;
        }
        Ok(())
    }

    /// Returns `Some((separator, new_right_offset))` if this node split and
    /// the split must propagate to the caller.
    fn insert_recursive(
        &mut self,
        offset: u32,
        key: &str,
        entry: Entry,
    ) -> Result<Option<(String, u32)>, BtreeError> {
        let mut node = self.get_node(offset)?;
        if node.is_leaf {
            match node.keys.binary_search_by(|k| k.as_str().cmp(key)) {
                Ok(i) => {
                    node.values[i] = (entry.offset, entry.length);
                    self.put_node(node)?;
                    Ok(None)
                }
                Err(i) => {
                    node.keys.insert(i, key.to_string());
                    node.values.insert(i, (entry.offset, entry.length));
                    if node.keys.len() > BTREE_MAX_KEYS {
                        let (sep, right_offset) = self.split_leaf(&mut node)?;
                        self.put_node(node)?;
                        Ok(Some((sep, right_offset)))
                    } else {
                        self.put_node(node)?;
                        Ok(None)
                    }
                }
            }
        } else {
            let idx = child_index_for_key(&node, key);
            let child_offset = node.children[idx];
            if let Some((median, right_offset)) = self.insert_recursive(child_offset, key, entry)?
            {
                node.keys.insert(idx, median);
                node.children.insert(idx + 1, right_offset);
                let mut right_child = self.get_node(right_offset)?;
                right_child.parent = node.offset;
                self.put_node(right_child)?;

                if node.keys.len() > BTREE_MAX_KEYS {
                    let (sep, right_offset) = self.split_internal(&mut node)?;
                    self.put_node(node)?;
                    Ok(Some((sep, right_offset)))
                } else {
                    self.put_node(node)?;
                    Ok(None)
                }
            } else {
                Ok(None)
            }
        }
    }

    fn split_leaf(&mut self, node: &mut Node) -> Result<(String, u32), BtreeError> {
        let mid = node.keys.len() / 2;
        let right_offset = self.store.allocate_node()?;
        let mut right = Node::new_leaf(right_offset);
        right.keys = node.keys.split_off(mid);
        right.values = node.values.split_off(mid);
        right.next_leaf = node.next_leaf;
        right.parent = node.parent;
        node.next_leaf = right_offset;
        let separator = right.keys[0].clone();
        self.put_node(right)?;
        Ok((separator, right_offset))
    }

    fn split_internal(&mut self, node: &mut Node) -> Result<(String, u32), BtreeError> {
        let mid = node.keys.len() / 2;
        let promoted = node.keys[mid].clone();
        let right_offset = self.store.allocate_node()?;
        let mut right = Node::new_internal(right_offset);
        right.keys = node.keys.split_off(mid + 1);
        node.keys.truncate(mid);
        right.children = node.children.split_off(mid + 1);
        right.parent = node.parent;
        for &child_offset in &right.children {
            let mut child = self.get_node(child_offset)?;
            child.parent = right_offset;
            self.put_node(child)?;
        }
        self.put_node(right)?;
        Ok((promoted, right_offset))
    }

    /// Remove `key`, returning whether it was present.
    pub fn remove(&mut self, key: &str) -> Result<bool, BtreeError> {
        if self.root == NO_OFFSET {
            return Ok(false);
        }
        let removed = self.remove_recursive(self.root, key)?;
        if removed {
            let root_node = self.get_node(self.root)?;
            if root_node.is_leaf && root_node.keys.is_empty() {
                self.free_node(self.root);
                self.root = NO_OFFSET;
            } else if !root_node.is_leaf && root_node.keys.is_empty() {
                let only_child = root_node.children[0];
                self.free_node(self.root);
                let mut child = self.get_node(only_child)?;
                child.parent = NO_OFFSET;
                self.put_node(child)?;
                self.root = only_child;
            }
        }
        Ok(removed)
    }

    fn remove_recursive(&mut self, offset: u32, key: &str) -> Result<bool, BtreeError> {
        let mut node = self.get_node(offset)?;
        if node.is_leaf {
            match node.keys.binary_search_by(|k| k.as_str().cmp(key)) {
                Ok(i) => {
                    node.keys.remove(i);
                    node.values.remove(i);
                    self.put_node(node)?;
                    Ok(true)
                }
                Err(_) => Ok(false),
            }
        } else {
            let idx = child_index_for_key(&node, key);
            let child_offset = node.children[idx];
            let removed = self.remove_recursive(child_offset, key)?;
            if removed {
                self.rebalance_child(offset, idx)?;
            }
            Ok(removed)
        }
    }

    /// After a removal under `parent.children[idx]`, borrow from a sibling
    /// or merge if that child underflowed.
    fn rebalance_child(&mut self, parent_offset: u32, idx: usize) -> Result<(), BtreeError> {
        let parent = self.get_node(parent_offset)?;
        let child_offset = parent.children[idx];
        let child = self.get_node(child_offset)?;
        if child.keys.len() >= BTREE_MIN_KEYS {
            return Ok(());
        }

        let has_left = idx > 0;
        let has_right = idx + 1 < parent.children.len();

        if has_left {
            let left_offset = parent.children[idx - 1];
            let left = self.get_node(left_offset)?;
            if left.keys.len() > BTREE_MIN_KEYS {
                return self.borrow_from_left(parent_offset, idx);
            }
        }
        if has_right {
            let right_offset = parent.children[idx + 1];
            let right = self.get_node(right_offset)?;
            if right.keys.len() > BTREE_MIN_KEYS {
                return self.borrow_from_right(parent_offset, idx);
            }
        }
        if has_left {
            self.merge_with_left(parent_offset, idx)
        } else {
            self.merge_with_right(parent_offset, idx)
        }
    }

    fn borrow_from_left(&mut self, parent_offset: u32, idx: usize) -> Result<(), BtreeError> {
        let mut parent = self.get_node(parent_offset)?;
        let mut child = self.get_node(parent.children[idx])?;
        let mut left = self.get_node(parent.children[idx - 1])?;

        if child.is_leaf {
            let key = left.keys.pop().expect("left has > min keys");
            let val = left.values.pop().expect("left has > min values");
            child.keys.insert(0, key.clone());
            child.values.insert(0, val);
            parent.keys[idx - 1] = key;
        } else {
            let moved_child = left.children.pop().expect("left has spare child");
            let moved_key = left.keys.pop().expect("left has > min keys");
            child.keys.insert(0, parent.keys[idx - 1].clone());
            child.children.insert(0, moved_child);
            parent.keys[idx - 1] = moved_key;
            let mut m = self.get_node(moved_child)?;
            m.parent = child.offset;
            self.put_node(m)?;
        }
        self.put_node(left)?;
        self.put_node(child)?;
        self.put_node(parent)?;
        Ok(())
    }

    fn borrow_from_right(&mut self, parent_offset: u32, idx: usize) -> Result<(), BtreeError> {
        let mut parent = self.get_node(parent_offset)?;
        let mut child = self.get_node(parent.children[idx])?;
        let mut right = self.get_node(parent.children[idx + 1])?;

        if child.is_leaf {
            let key = right.keys.remove(0);
            let val = right.values.remove(0);
            child.keys.push(key);
            child.values.push(val);
            parent.keys[idx] = right.keys[0].clone();
        } else {
            let moved_child = right.children.remove(0);
            let moved_key = right.keys.remove(0);
            child.keys.push(parent.keys[idx].clone());
            child.children.push(moved_child);
            parent.keys[idx] = moved_key;
            let mut m = self.get_node(moved_child)?;
            m.parent = child.offset;
            self.put_node(m)?;
        }
        self.put_node(right)?;
        self.put_node(child)?;
        self.put_node(parent)?;
        Ok(())
    }

    fn merge_with_left(&mut self, parent_offset: u32, idx: usize) -> Result<(), BtreeError> {
        let mut parent = self.get_node(parent_offset)?;
        let child = self.get_node(parent.children[idx])?;
        let mut left = self.get_node(parent.children[idx - 1])?;

        if child.is_leaf {
            left.keys.extend(child.keys);
            left.values.extend(child.values);
            left.next_leaf = child.next_leaf;
        } else {
            left.keys.push(parent.keys[idx - 1].clone());
            left.keys.extend(child.keys);
            left.children.extend(child.children.clone());
            for &c in &child.children {
                let mut m = self.get_node(c)?;
                m.parent = left.offset;
                self.put_node(m)?;
            }
        }
        parent.keys.remove(idx - 1);
        parent.children.remove(idx);
        self.free_node(child.offset);
        self.put_node(left)?;
        self.put_node(parent)?;
        Ok(())
    }

    fn merge_with_right(&mut self, parent_offset: u32, idx: usize) -> Result<(), BtreeError> {
        let mut parent = self.get_node(parent_offset)?;
        let mut child = self.get_node(parent.children[idx])?;
        let right = self.get_node(parent.children[idx + 1])?;

        if child.is_leaf {
            child.keys.extend(right.keys);
            child.values.extend(right.values);
            child.next_leaf = right.next_leaf;
        } else {
            child.keys.push(parent.keys[idx].clone());
            child.keys.extend(right.keys);
            child.children.extend(right.children.clone());
            for &c in &right.children {
                let mut m = self.get_node(c)?;
                m.parent = child.offset;
                self.put_node(m)?;
            }
        }
        parent.keys.remove(idx);
        parent.children.remove(idx + 1);
        self.free_node(right.offset);
        self.put_node(child)?;
        self.put_node(parent)?;
        Ok(())
    }

    /// Ordered full scan via leaf-chain traversal.
    pub fn scan(&mut self) -> Result<Vec<(String, Entry)>, BtreeError> {
        self.scan_from_prefix("")
    }

    /// Scan keys with the given prefix, exploiting leaf-chaining for
    /// sequential I/O once the first matching leaf is found.
    pub fn scan_from_prefix(&mut self, prefix: &str) -> Result<Vec<(String, Entry)>, BtreeError> {
        let mut out = Vec::new();
        if self.root == NO_OFFSET {
            return Ok(out);
        }
        let mut offset = self.root;
        loop {
            let node = self.get_node(offset)?;
            if node.is_leaf {
                break;
            }
            offset = node.children[child_index_for_key(&node, prefix)];
        }
        let mut leaf_offset = Some(offset);
        // The descent may land one leaf early relative to a prefix that
        // falls strictly between two leaves; walk forward defensively.
        'outer: while let Some(off) = leaf_offset {
            let node = self.get_node(off)?;
            for (i, k) in node.keys.iter().enumerate() {
                if k.as_str() < prefix {
                    continue;
                }
                if !k.starts_with(prefix) {
                    break 'outer;
                }
                let (o, l) = node.values[i];
                out.push((
                    k.clone(),
                    Entry {
                        offset: o,
                        length: l,
                    },
                ));
            }
            leaf_offset = if node.next_leaf == NO_OFFSET {
                None
            } else {
                Some(node.next_leaf)
            };
        }
        Ok(out)
    }

    /// Rebuild the entire tree from a fresh set of `(key, entry)` pairs,
    /// merged with whatever is already present (existing keys are
    /// overwritten by sorting first, then streaming into leaves). Frees every
    /// previously allocated node.
    pub fn bulk_insert(&mut self, items: Vec<(String, Entry)>) -> Result<(), BtreeError> {
        let mut merged: std::collections::BTreeMap<String, Entry> =
            self.scan()?.into_iter().collect();
        for (k, v) in items {
            merged.insert(k, v);
        }
        self.rebuild_from_sorted(merged.into_iter().collect())
    }

    /// Remove a batch of keys, rebuilding the tree once rather than
    /// per-key rebalancing.
    pub fn bulk_remove(&mut self, keys: &[String]) -> Result<usize, BtreeError> {
        let existing = self.scan()?;
        let before = existing.len();
        let remaining: Vec<(String, Entry)> = existing
            .into_iter()
            .filter(|(k, _)| !keys.contains(k))
            .collect();
        let removed = before - remaining.len();
        self.rebuild_from_sorted(remaining)?;
        Ok(removed)
    }

    fn rebuild_from_sorted(&mut self, sorted: Vec<(String, Entry)>) -> Result<(), BtreeError> {
        // Free every node currently reachable, then stream fresh leaves.
        self.free_all_nodes()?;
        self.cache.clear();
        if sorted.is_empty() {
            self.root = NO_OFFSET;
            return Ok(());
        }

        let leaf_capacity = BTREE_MAX_KEYS; // pack leaves up to the max fill
        let mut leaf_offsets = Vec::new();
        let mut chunks: Vec<&[(String, Entry)]> = Vec::new();
        let mut rest = sorted.as_slice();
        while !rest.is_empty() {
            let take = rest.len().min(leaf_capacity);
            let (chunk, remainder) = rest.split_at(take);
            chunks.push(chunk);
            rest = remainder;
        }

        for chunk in &chunks {
            let offset = self.store.allocate_node()?;
            leaf_offsets.push(offset);
            let mut leaf = Node::new_leaf(offset);
            leaf.keys = chunk.iter().map(|(k, _)| k.clone()).collect();
            leaf.values = chunk.iter().map(|(_, e)| (e.offset, e.length)).collect();
            self.put_node(leaf)?;
        }
        for i in 0..leaf_offsets.len() {
            let next = if i + 1 < leaf_offsets.len() {
                leaf_offsets[i + 1]
            } else {
                NO_OFFSET
            };
            let mut leaf = self.get_node(leaf_offsets[i])?;
            leaf.next_leaf = next;
            self.put_node(leaf)?;
        }

        // Separators are each leaf's first key (skip the first leaf).
        let separators: Vec<String> = chunks[1..]
            .iter()
            .map(|chunk| chunk[0].0.clone())
            .collect();

        self.root = self.build_internal_level(leaf_offsets, separators)?;
        let mut root = self.get_node(self.root)?;
        root.parent = NO_OFFSET;
        self.put_node(root.clone())?;
        Ok(())
    }

    /// Build one level of internal nodes over `children`, recursing upward
    /// until a single root offset remains.
    fn build_internal_level(
        &mut self,
        children: Vec<u32>,
        separators: Vec<String>,
    ) -> Result<u32, BtreeError> {
        if children.len() == 1 {
            return Ok(children[0]);
        }
        debug_assert_eq!(separators.len(), children.len() - 1);

        let fanout = BTREE_MAX_KEYS + 1; // max children per internal node
        let mut level_offsets = Vec::new();
        let mut level_separators = Vec::new();

        let mut child_iter = children.into_iter().peekable();
        let mut sep_iter = separators.into_iter().peekable();
        while child_iter.peek().is_some() {
            let group_children: Vec<u32> = (0..fanout)
                .filter_map(|_| child_iter.next())
                .collect();
            let group_seps: Vec<String> = (0..group_children.len().saturating_sub(1))
                .filter_map(|_| sep_iter.next())
                .collect();
            let offset = self.store.allocate_node()?;
            let mut node = Node::new_internal(offset);
            node.children = group_children.clone();
            node.keys = group_seps;
            for &c in &group_children {
                let mut child = self.get_node(c)?;
                child.parent = offset;
                self.put_node(child)?;
            }
            self.put_node(node)?;
            level_offsets.push(offset);
            // The separator promoted between this group and the next is
            // whatever separator immediately follows (belongs to the next
            // group's first child) — taken verbatim from the stream.
            if sep_iter.peek().is_some() && child_iter.peek().is_some() {
                level_separators.push(sep_iter.next().unwrap());
            }
        }
        self.build_internal_level(level_offsets, level_separators)
    }

    fn free_all_nodes(&mut self) -> Result<(), BtreeError> {
        if self.root == NO_OFFSET {
            return Ok(());
        }
        let mut stack = vec![self.root];
        while let Some(offset) = stack.pop() {
            let node = self.get_node(offset)?;
            if !node.is_leaf {
                stack.extend(node.children.iter().copied());
            }
            self.free_node(offset);
        }
        Ok(())
    }
}

fn child_index_for_key(node: &Node, key: &str) -> usize {
    let mut idx = 0;
    while idx < node.keys.len() && key >= node.keys[idx].as_str() {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NODE_SIZE;
    use std::collections::HashMap;

    #[derive(Default)]
    pub(super) struct MemPageStore {
        pages: HashMap<u32, [u8; NODE_SIZE]>,
        next: u32,
        free: Vec<u32>,
    }

    impl PageStore for MemPageStore {
        fn read_node(&mut self, offset: u32) -> Result<[u8; NODE_SIZE], BtreeError> {
            self.pages
                .get(&offset)
                .copied()
                .ok_or_else(|| BtreeError::Io(format!("no page at {offset}")))
        }
        fn write_node(&mut self, offset: u32, bytes: &[u8; NODE_SIZE]) -> Result<(), BtreeError> {
            self.pages.insert(offset, *bytes);
            Ok(())
        }
        fn allocate_node(&mut self) -> Result<u32, BtreeError> {
            if let Some(off) = self.free.pop() {
                return Ok(off);
            }
            let off = self.next;
            self.next += 1;
            Ok(off)
        }
        fn free_node(&mut self, offset: u32) {
            self.pages.remove(&offset);
            if self.free.len() < 4096 {
                self.free.push(offset);
            }
        }
    }

    fn tree() -> BTree<MemPageStore> {
        BTree::open(MemPageStore::default(), NO_OFFSET)
    }

    #[test]
    fn insert_and_find() {
        let mut t = tree();
        for i in 0..50 {
            let k = format!("{i:03}");
            t.insert(&k, Entry { offset: i, length: 1 })
                .unwrap();
        }
        for i in 0..50 {
            let k = format!("{i:03}");
            assert_eq!(t.find(&k).unwrap().unwrap().offset, i);
        }
        assert!(t.find("999").unwrap().is_none());
    }

    #[test]
    fn scan_is_sorted_lexicographically() {
        let mut t = tree();
        for i in (0..50).rev() {
            let k = format!("{i:03}");
            t.insert(&k, Entry { offset: i, length: 1 }).unwrap();
        }
        let scanned = t.scan().unwrap();
        let keys: Vec<String> = scanned.iter().map(|(k, _)| k.clone()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(scanned.len(), 50);
    }

    #[test]
    fn remove_then_find_returns_none() {
        let mut t = tree();
        for i in 0..50 {
            let k = format!("{i:03}");
            t.insert(&k, Entry { offset: i, length: 1 }).unwrap();
        }
        assert!(t.remove("025").unwrap());
        assert!(t.find("025").unwrap().is_none());
        assert_eq!(t.scan().unwrap().len(), 49);
        // remaining keys still scan in sorted order
        let keys: Vec<String> = t.scan().unwrap().into_iter().map(|(k, _)| k).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn update_existing_key_overwrites_value() {
        let mut t = tree();
        t.insert("a", Entry { offset: 1, length: 1 }).unwrap();
        t.insert("a", Entry { offset: 2, length: 2 }).unwrap();
        assert_eq!(t.find("a").unwrap().unwrap().offset, 2);
        assert_eq!(t.scan().unwrap().len(), 1);
    }

    #[test]
    fn split_and_merge_across_many_keys() {
        let mut t = tree();
        for i in 0..500u32 {
            t.insert(&format!("{i:05}"), Entry { offset: i, length: 1 })
                .unwrap();
        }
        for i in (0..500u32).step_by(2) {
            assert!(t.remove(&format!("{i:05}")).unwrap());
        }
        assert_eq!(t.scan().unwrap().len(), 250);
        for i in (1..500u32).step_by(2) {
            assert_eq!(t.find(&format!("{i:05}")).unwrap().unwrap().offset, i);
        }
        for i in (0..500u32).step_by(2) {
            assert!(t.find(&format!("{i:05}")).unwrap().is_none());
        }
    }

    #[test]
    fn bulk_insert_then_prefix_scan() {
        let mut t = tree();
        let items: Vec<(String, Entry)> = (0..300)
            .map(|i| {
                (
                    format!("users/{i:04}"),
                    Entry {
                        offset: i,
                        length: 1,
                    },
                )
            })
            .collect();
        t.bulk_insert(items).unwrap();
        let scanned = t.scan_from_prefix("users/").unwrap();
        assert_eq!(scanned.len(), 300);
        let keys: Vec<String> = scanned.iter().map(|(k, _)| k.clone()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn bulk_remove_drops_requested_keys() {
        let mut t = tree();
        let items: Vec<(String, Entry)> = (0..100)
            .map(|i| (format!("{i:03}"), Entry { offset: i, length: 1 }))
            .collect();
        t.bulk_insert(items).unwrap();
        let to_remove: Vec<String> = (0..50).map(|i| format!("{i:03}")).collect();
        let removed = t.bulk_remove(&to_remove).unwrap();
        assert_eq!(removed, 50);
        assert_eq!(t.scan().unwrap().len(), 50);
    }
}

#[cfg(test)]
mod proptests {
    use super::tests::MemPageStore;
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone)]
    enum Op {
        Insert(u8),
        Remove(u8),
    }

    fn ops() -> impl Strategy<Value = Vec<Op>> {
        prop::collection::vec(
            prop_oneof![
                (0u8..40).prop_map(Op::Insert),
                (0u8..40).prop_map(Op::Remove),
            ],
            0..200,
        )
    }

    proptest! {
        // A sequence of inserts/removes on distinct keys must agree with a
        // plain `BTreeMap` model at every point, and a final full scan must
        // come back in sorted key order.
        #[test]
        fn matches_btreemap_model(ops in ops()) {
            let mut t = BTree::open(MemPageStore::default(), NO_OFFSET);
            let mut model: BTreeMap<String, Entry> = BTreeMap::new();
            for op in ops {
                match op {
                    Op::Insert(k) => {
                        let key = format!("{k:03}");
                        let entry = Entry { offset: k as u32, length: 1 };
                        t.insert(&key, entry).unwrap();
                        model.insert(key, entry);
                    }
                    Op::Remove(k) => {
                        let key = format!("{k:03}");
                        let removed = t.remove(&key).unwrap();
                        let was_present = model.remove(&key).is_some();
                        prop_assert_eq!(removed, was_present);
                    }
                }
            }
            for (key, entry) in &model {
                prop_assert_eq!(t.find(key).unwrap(), Some(*entry));
            }
            let scanned = t.scan().unwrap();
            let expected: Vec<(String, Entry)> = model.into_iter().collect();
            prop_assert_eq!(scanned, expected);
        }
    }
}
