//! Fixed-layout node serialization.
//!
//! ```text
//! byte 0: is_leaf (0 | 1)
//! bytes 1..3: key_count (u16, BE)
//! bytes 3..7: parent offset (u32, BE; NO_OFFSET = no parent)
//! bytes 7..11: next_leaf offset (u32, BE; leaves only, NO_OFFSET = none)
//! bytes 11..: per-key entries: (u16 keyLen, key bytes, payload)
//! payload = (u32 offset, u32 length) for leaves
//! payload = u32 childOffset for internal nodes
//! tail: one extra u32 childOffset for internal nodes
//! ```
use crate::BtreeError;
use byteorder::{BigEndian, ByteOrder};

/// Fixed on-disk node size.
pub const NODE_SIZE: usize = 1024;
/// Sentinel meaning "no offset" (absent parent, absent next-leaf, empty tree).
pub const NO_OFFSET: u32 = u32::MAX;

const HEADER_SIZE: usize = 11;

/// A deserialized B-tree node.
#[derive(Debug, Clone)]
pub struct Node {
    /// This node's own file offset (not serialized; supplied by the caller
    /// that read it, since it's determined by where the node lives).
    pub offset: u32,
    /// Leaf nodes hold `(doc offset, length)` payloads; internal nodes hold
    /// child offsets.
    pub is_leaf: bool,
    /// Parent node offset, `NO_OFFSET` for the root.
    pub parent: u32,
    /// Next-leaf chain pointer (leaves only), `NO_OFFSET` for the last leaf.
    pub next_leaf: u32,
    /// Separator/data keys, always sorted ascending.
    pub keys: Vec<String>,
    /// Leaf only: `(doc offset, length)` parallel to `keys`.
    pub values: Vec<(u32, u32)>,
    /// Internal only: child offsets, `len() == keys.len() + 1`.
    pub children: Vec<u32>,
}

impl Node {
    /// A fresh empty leaf at `offset`.
    pub fn new_leaf(offset: u32) -> Self {
        Node {
            offset,
            is_leaf: true,
            parent: NO_OFFSET,
            next_leaf: NO_OFFSET,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
        }
    }

    /// A fresh empty internal node at `offset`.
    pub fn new_internal(offset: u32) -> Self {
        Node {
            offset,
            is_leaf: false,
            parent: NO_OFFSET,
            next_leaf: NO_OFFSET,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Serialize into a fixed `NODE_SIZE`-byte buffer.
    ///
    /// Rejects internal nodes whose `children.len() != keys.len() + 1`.
    pub fn serialize(&self) -> Result<[u8; NODE_SIZE], BtreeError> {
        if !self.is_leaf && self.children.len() != self.keys.len() + 1 {
            return Err(BtreeError::CorruptNode {
                offset: self.offset,
                detail: format!(
                    "internal node has {} children but {} keys",
                    self.children.len(),
                    self.keys.len()
                ),
            });
        }
        if self.is_leaf && self.values.len() != self.keys.len() {
            return Err(BtreeError::CorruptNode {
                offset: self.offset,
                detail: format!(
                    "leaf node has {} values but {} keys",
                    self.values.len(),
                    self.keys.len()
                ),
            });
        }

        let mut buf = vec![0u8; NODE_SIZE];
        buf[0] = self.is_leaf as u8;
        BigEndian::write_u16(&mut buf[1..3], self.keys.len() as u16);
        BigEndian::write_u32(&mut buf[3..7], self.parent);
        BigEndian::write_u32(&mut buf[7..11], self.next_leaf);

        let mut pos = HEADER_SIZE;
        for (i, key) in self.keys.iter().enumerate() {
            let kbytes = key.as_bytes();
            if kbytes.len() > u16::MAX as usize {
                return Err(BtreeError::CorruptNode {
                    offset: self.offset,
                    detail: "key exceeds u16 length".into(),
                });
            }
            let entry_len = 2 + kbytes.len() + if self.is_leaf { 8 } else { 4 };
            if pos + entry_len > NODE_SIZE {
                return Err(BtreeError::CorruptNode {
                    offset: self.offset,
                    detail: "node overflowed fixed 1024-byte page".into(),
                });
            }
            BigEndian::write_u16(&mut buf[pos..pos + 2], kbytes.len() as u16);
            pos += 2;
            buf[pos..pos + kbytes.len()].copy_from_slice(kbytes);
            pos += kbytes.len();
            if self.is_leaf {
                let (off, len) = self.values[i];
                BigEndian::write_u32(&mut buf[pos..pos + 4], off);
                BigEndian::write_u32(&mut buf[pos + 4..pos + 8], len);
                pos += 8;
            } else {
                BigEndian::write_u32(&mut buf[pos..pos + 4], self.children[i]);
                pos += 4;
            }
        }
        if !self.is_leaf {
            if pos + 4 > NODE_SIZE {
                return Err(BtreeError::CorruptNode {
                    offset: self.offset,
                    detail: "node overflowed fixed 1024-byte page (trailing child)".into(),
                });
            }
            BigEndian::write_u32(
                &mut buf[pos..pos + 4],
                *self.children.last().expect("children.len == keys.len+1"),
            );
        }

        let mut out = [0u8; NODE_SIZE];
        out.copy_from_slice(&buf);
        Ok(out)
    }

    /// Parse a node from its raw bytes, given the offset it was read from.
    pub fn deserialize(offset: u32, bytes: &[u8]) -> Result<Node, BtreeError> {
        if bytes.len() != NODE_SIZE {
            return Err(BtreeError::CorruptNode {
                offset,
                detail: format!("expected {NODE_SIZE} bytes, got {}", bytes.len()),
            });
        }
        let is_leaf = match bytes[0] {
            0 => false,
            1 => true,
            other => {
                return Err(BtreeError::CorruptNode {
                    offset,
                    detail: format!("invalid is_leaf flag {other}"),
                })
            }
        };
        let key_count = BigEndian::read_u16(&bytes[1..3]) as usize;
        let parent = BigEndian::read_u32(&bytes[3..7]);
        let next_leaf = BigEndian::read_u32(&bytes[7..11]);

        let mut keys = Vec::with_capacity(key_count);
        let mut values = Vec::with_capacity(if is_leaf { key_count } else { 0 });
        let mut children = Vec::with_capacity(if is_leaf { 0 } else { key_count + 1 });

        let mut pos = HEADER_SIZE;
        for _ in 0..key_count {
            if pos + 2 > bytes.len() {
                return Err(BtreeError::CorruptNode {
                    offset,
                    detail: "truncated key length".into(),
                });
            }
            let klen = BigEndian::read_u16(&bytes[pos..pos + 2]) as usize;
            pos += 2;
            if pos + klen > bytes.len() {
                return Err(BtreeError::CorruptNode {
                    offset,
                    detail: "truncated key bytes".into(),
                });
            }
            let key = std::str::from_utf8(&bytes[pos..pos + klen])
                .map_err(|_| BtreeError::CorruptNode {
                    offset,
                    detail: "key is not valid UTF-8".into(),
                })?
                .to_string();
            pos += klen;
            keys.push(key);

            if is_leaf {
                if pos + 8 > bytes.len() {
                    return Err(BtreeError::CorruptNode {
                        offset,
                        detail: "truncated leaf payload".into(),
                    });
                }
                let doc_off = BigEndian::read_u32(&bytes[pos..pos + 4]);
                let doc_len = BigEndian::read_u32(&bytes[pos + 4..pos + 8]);
                values.push((doc_off, doc_len));
                pos += 8;
            } else {
                if pos + 4 > bytes.len() {
                    return Err(BtreeError::CorruptNode {
                        offset,
                        detail: "truncated child offset".into(),
                    });
                }
                children.push(BigEndian::read_u32(&bytes[pos..pos + 4]));
                pos += 4;
            }
        }
        if !is_leaf {
            if pos + 4 > bytes.len() {
                return Err(BtreeError::CorruptNode {
                    offset,
                    detail: "missing trailing child offset".into(),
                });
            }
            children.push(BigEndian::read_u32(&bytes[pos..pos + 4]));
        }

        if !is_leaf && children.len() != keys.len() + 1 {
            return Err(BtreeError::CorruptNode {
                offset,
                detail: format!(
                    "internal node has {} children but {} keys",
                    children.len(),
                    keys.len()
                ),
            });
        }

        Ok(Node {
            offset,
            is_leaf,
            parent,
            next_leaf,
            keys,
            values,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_leaf() {
        let mut n = Node::new_leaf(128);
        n.keys = vec!["a".into(), "b".into()];
        n.values = vec![(10, 20), (30, 40)];
        n.next_leaf = 256;
        let bytes = n.serialize().unwrap();
        let back = Node::deserialize(128, &bytes).unwrap();
        assert_eq!(back.keys, n.keys);
        assert_eq!(back.values, n.values);
        assert_eq!(back.next_leaf, 256);
        assert!(back.is_leaf);
    }

    #[test]
    fn roundtrips_internal() {
        let mut n = Node::new_internal(0);
        n.keys = vec!["m".into()];
        n.children = vec![64, 192];
        let bytes = n.serialize().unwrap();
        let back = Node::deserialize(0, &bytes).unwrap();
        assert_eq!(back.children, vec![64, 192]);
        assert!(!back.is_leaf);
    }

    #[test]
    fn rejects_mismatched_children() {
        let mut n = Node::new_internal(0);
        n.keys = vec!["m".into(), "z".into()];
        n.children = vec![64, 192]; // should be 3 children for 2 keys
        assert!(matches!(n.serialize(), Err(BtreeError::CorruptNode { .. })));
    }
}
