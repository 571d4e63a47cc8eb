use crate::node::NODE_SIZE;
use crate::BtreeError;

/// The opaque page-addressed storage the tree runs on: `read_node` and
/// `write_node` are its minimal contract; `allocate_node`/`free_node` extend
/// that so the tree can grow and recycle node offsets itself. A page store
/// backed by a real file (see `bmdb-storage`'s binary file store) implements
/// this against its B-tree node area.
pub trait PageStore {
    /// Read exactly one fixed-size node's bytes at `offset`.
    fn read_node(&mut self, offset: u32) -> Result<[u8; NODE_SIZE], BtreeError>;

    /// Overwrite the node at `offset`.
    fn write_node(&mut self, offset: u32, bytes: &[u8; NODE_SIZE]) -> Result<(), BtreeError>;

    /// Reserve a fresh node offset, preferring a recycled one if the free
    /// list (capped to bound memory) has one available.
    fn allocate_node(&mut self) -> Result<u32, BtreeError>;

    /// Return a node offset to the free list for reuse. Capped; beyond the
    /// cap the offset is simply dropped (the file grows instead of the free
    /// list growing unbounded).
    fn free_node(&mut self, offset: u32);
}
