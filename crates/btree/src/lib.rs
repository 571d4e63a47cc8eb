//! Persistent B-tree and doc-id bitmap.
//!
//! The tree itself never touches a file handle directly: it operates over
//! the opaque [`PageStore`] trait, addressing nodes only through
//! `read(offset)`/`write(offset, bytes)` hooks. `bmdb-storage`'s binary
//! file store is the production `PageStore`; tests use an in-memory one.

mod bitmap;
mod cache;
mod node;
mod store;
mod tree;

pub use bitmap::DocIdBitmap;
pub use node::{Node, NODE_SIZE, NO_OFFSET};
pub use store::PageStore;
pub use tree::{BTree, Entry};

use thiserror::Error;

/// Errors raised by the B-tree layer.
#[derive(Debug, Error)]
pub enum BtreeError {
    /// A node's on-disk bytes failed to parse (bad flag, length, or the
    /// `children.len() == keys.len() + 1` internal-node invariant).
    #[error("corrupt btree node at offset {offset}: {detail}")]
    CorruptNode {
        /// File offset of the offending node.
        offset: u32,
        /// What was wrong with it.
        detail: String,
    },
    /// The underlying page store failed to read or write a node.
    #[error("btree I/O error: {0}")]
    Io(String),
}

impl From<BtreeError> for bmdb_core::Error {
    fn from(e: BtreeError) -> Self {
        match e {
            BtreeError::CorruptNode { offset, detail } => bmdb_core::Error::Corruption {
                location: format!("btree node@{offset}"),
                detail,
            },
            BtreeError::Io(detail) => bmdb_core::Error::io(
                "btree",
                std::io::Error::new(std::io::ErrorKind::Other, detail),
            ),
        }
    }
}
