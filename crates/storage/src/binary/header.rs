//! 32-byte file header.
use bmdb_btree::NO_OFFSET;
use bmdb_core::{limits, Error, Result};
use byteorder::{BigEndian, ByteOrder};

/// The fixed 32-byte header at the start of every binary file store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// B-tree root node offset, `NO_OFFSET` for an empty tree.
    pub root_offset: u32,
    /// Next free B-tree node offset (monotonic unless recycled via the
    /// free list).
    pub next_node_offset: u32,
    /// Number of documents currently stored.
    pub doc_count: u32,
    /// Offset into the document area where the next record is appended.
    pub free_space_offset: u64,
}

impl Header {
    /// A fresh header for a brand-new file: empty tree, node area starts
    /// right after the header, document area starts right after the
    /// fixed-size B-tree area.
    pub fn fresh() -> Self {
        Header {
            root_offset: NO_OFFSET,
            next_node_offset: limits::HEADER_SIZE as u32,
            doc_count: 0,
            free_space_offset: limits::HEADER_SIZE + limits::BTREE_AREA_SIZE,
        }
    }

    /// Serialize to the fixed 32-byte on-disk layout.
    pub fn serialize(&self) -> [u8; 32] {
        let mut buf = [0u8; 32];
        buf[0..4].copy_from_slice(limits::FILE_MAGIC);
        BigEndian::write_u32(&mut buf[4..8], limits::FILE_FORMAT_VERSION);
        BigEndian::write_u32(&mut buf[8..12], self.root_offset);
        BigEndian::write_u32(&mut buf[12..16], self.next_node_offset);
        BigEndian::write_u32(&mut buf[16..20], self.doc_count);
        // free_space_offset is a file-wide byte offset; the document area
        // can in principle grow past u32::MAX, so it's stored as the low
        // and high 32 bits across the two remaining non-reserved header
        // words.
        BigEndian::write_u32(&mut buf[20..24], (self.free_space_offset >> 32) as u32);
        BigEndian::write_u32(&mut buf[24..28], self.free_space_offset as u32);
        // bytes 28..32 remain reserved/zeroed.
        buf
    }

    /// Parse a header, validating magic and version.
    pub fn deserialize(buf: &[u8; 32]) -> Result<Self> {
        if &buf[0..4] != limits::FILE_MAGIC {
            return Err(Error::Corruption {
                location: "file header".into(),
                detail: format!("bad magic {:?}", &buf[0..4]),
            });
        }
        let version = BigEndian::read_u32(&buf[4..8]);
        if version != limits::FILE_FORMAT_VERSION {
            return Err(Error::Corruption {
                location: "file header".into(),
                detail: format!("unsupported format version {version}"),
            });
        }
        let root_offset = BigEndian::read_u32(&buf[8..12]);
        let next_node_offset = BigEndian::read_u32(&buf[12..16]);
        let doc_count = BigEndian::read_u32(&buf[16..20]);
        let hi = BigEndian::read_u32(&buf[20..24]) as u64;
        let lo = BigEndian::read_u32(&buf[24..28]) as u64;
        Ok(Header {
            root_offset,
            next_node_offset,
            doc_count,
            free_space_offset: (hi << 32) | lo,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let h = Header {
            root_offset: 32,
            next_node_offset: 1056,
            doc_count: 7,
            free_space_offset: limits::HEADER_SIZE + limits::BTREE_AREA_SIZE + 4096,
        };
        let bytes = h.serialize();
        assert_eq!(Header::deserialize(&bytes).unwrap(), h);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = Header::fresh().serialize();
        bytes[0] = b'X';
        assert!(Header::deserialize(&bytes).is_err());
    }
}
