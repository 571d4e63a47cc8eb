//! LRU cache of deserialized nodes, keyed by file offset.
use crate::Node;
use std::collections::HashMap;
use std::collections::VecDeque;

/// Bounds the cache's memory use.
const DEFAULT_CAPACITY: usize = 1000;
/// Evict down to this fraction of capacity once the cap is exceeded
/// ("target fill factor of ~80%").
const FILL_FACTOR: f64 = 0.8;

/// Plain LRU of deserialized nodes. Not a write-back cache: callers persist
/// a node via `PageStore::write_node` themselves and then `put` the updated
/// copy here, keeping cache and disk in lockstep.
pub struct NodeCache {
    capacity: usize,
    entries: HashMap<u32, Node>,
    /// Most-recently-used at the back.
    order: VecDeque<u32>,
}

impl Default for NodeCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NodeCache {
    /// A cache holding up to `capacity` nodes.
    pub fn new(capacity: usize) -> Self {
        NodeCache {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Look up a cached node, marking it most-recently-used.
    pub fn get(&mut self, offset: u32) -> Option<Node> {
        if self.entries.contains_key(&offset) {
            self.touch(offset);
            self.entries.get(&offset).cloned()
        } else {
            None
        }
    }

    /// Insert or update a node, evicting the least-recently-used entries
    /// down to ~80% capacity if this insert pushed it over the cap.
    pub fn put(&mut self, node: Node) {
        let offset = node.offset;
        self.entries.insert(offset, node);
        self.touch(offset);
        if self.entries.len() > self.capacity {
            let target = ((self.capacity as f64) * FILL_FACTOR) as usize;
            while self.entries.len() > target.max(1) {
                if let Some(lru) = self.order.pop_front() {
                    self.entries.remove(&lru);
                } else {
                    break;
                }
            }
        }
    }

    /// Drop a node from the cache (used when a node is freed/recycled).
    pub fn invalidate(&mut self, offset: u32) {
        self.entries.remove(&offset);
        self.order.retain(|&o| o != offset);
    }

    /// Drop every cached node (used after bulk operations that bypass the
    /// cache for streaming writes).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn touch(&mut self, offset: u32) {
        self.order.retain(|&o| o != offset);
        self.order.push_back(offset);
    }
}
