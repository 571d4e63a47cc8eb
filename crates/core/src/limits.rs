//! Fixed format limits referenced by the codec, B-tree, and file store.
//!
//! These are not user-configurable — they're wire-format constants, kept in
//! one place so every crate agrees on them.

/// MessagePack: strings longer than this many UTF-8 bytes fail to encode.
pub const MAX_STR_LEN: usize = u16::MAX as usize;
/// MessagePack: arrays/maps with more entries than this fail to encode.
pub const MAX_CONTAINER_LEN: usize = u16::MAX as usize;

/// B-tree node size on disk.
pub const BTREE_NODE_SIZE: usize = 1024;
/// B-tree order (max children of an internal node).
pub const BTREE_ORDER: usize = 16;
/// Minimum keys in a non-root node before it underflows.
pub const BTREE_MIN_KEYS: usize = 7;
/// Maximum keys in any node before it must split.
pub const BTREE_MAX_KEYS: usize = 15;

/// Binary file store: magic bytes at offset 0.
pub const FILE_MAGIC: &[u8; 4] = b"BMDB";
/// Binary file store: current on-disk format version.
pub const FILE_FORMAT_VERSION: u32 = 1;
/// Binary file store: header size in bytes.
pub const HEADER_SIZE: u64 = 32;
/// Binary file store: fixed size of the B-tree node area.
pub const BTREE_AREA_SIZE: u64 = 1024 * 1024;
/// Binary file store: chunk cache page size.
pub const CHUNK_SIZE: usize = 4096;

/// WAL: magic bytes at offset 0 of the `.wal` file.
pub const WAL_MAGIC: &[u8; 4] = b"BWAL";
/// WAL: current on-disk format version.
pub const WAL_FORMAT_VERSION: u32 = 1;
