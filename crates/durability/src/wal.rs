//! WAL file format: magic `"BWAL"`, version, next sequence
//! number, then a stream of `kind/txid/seq/payload-len/payload` records.
use bmdb_core::limits::{WAL_FORMAT_VERSION, WAL_MAGIC};
use bmdb_core::{Error, Result, Value};
use byteorder::{BigEndian, ByteOrder};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const HEADER_SIZE: u64 = 16;

/// One logged mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum WalOp {
    /// Insert or overwrite a document.
    Put {
        /// Target table.
        table: String,
        /// Target document id.
        doc_id: u64,
        /// New body.
        body: Value,
    },
    /// Remove a document.
    Delete {
        /// Target table.
        table: String,
        /// Target document id.
        doc_id: u64,
    },
}

/// A record as it appears on disk, including the transaction metadata the
/// ops themselves don't carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// One operation within transaction `txid`.
    Op {
        /// Owning transaction id.
        txid: u64,
        /// Record sequence number.
        seq: u64,
        /// The operation itself.
        op: WalOp,
    },
    /// Marks `txid` as committed; every `Op` record with that txid is now
    /// durable and safe to replay.
    Commit {
        /// The committed transaction id.
        txid: u64,
        /// Record sequence number.
        seq: u64,
    },
    /// Marks `txid` as abandoned; every `Op` record with that txid is
    /// discarded rather than replayed.
    Abort {
        /// The aborted transaction id.
        txid: u64,
        /// Record sequence number.
        seq: u64,
    },
}

impl Record {
    fn kind_byte(&self) -> u8 {
        match self {
            Record::Op {
                op: WalOp::Put { .. },
                ..
            } => 1,
            Record::Op {
                op: WalOp::Delete { .. },
                ..
            } => 2,
            Record::Commit { .. } => 3,
            Record::Abort { .. } => 4,
        }
    }

    fn txid(&self) -> u64 {
        match self {
            Record::Op { txid, .. } | Record::Commit { txid, .. } | Record::Abort { txid, .. } => {
                *txid
            }
        }
    }

    fn seq(&self) -> u64 {
        match self {
            Record::Op { seq, .. } | Record::Commit { seq, .. } | Record::Abort { seq, .. } => {
                *seq
            }
        }
    }

    fn payload(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Record::Op {
                op: WalOp::Put { table, doc_id, body },
                ..
            } => {
                write_table_name(&mut buf, table);
                let mut doc_id_buf = [0u8; 8];
                BigEndian::write_u64(&mut doc_id_buf, *doc_id);
                buf.extend_from_slice(&doc_id_buf);
                buf.extend_from_slice(&bmdb_codec::encode(body).map_err(Error::from)?);
            }
            Record::Op {
                op: WalOp::Delete { table, doc_id },
                ..
            } => {
                write_table_name(&mut buf, table);
                let mut doc_id_buf = [0u8; 8];
                BigEndian::write_u64(&mut doc_id_buf, *doc_id);
                buf.extend_from_slice(&doc_id_buf);
            }
            Record::Commit { .. } | Record::Abort { .. } => {}
        }
        Ok(buf)
    }

    fn from_parts(kind: u8, txid: u64, seq: u64, payload: &[u8]) -> Result<Self> {
        match kind {
            1 => {
                let (table, rest) = read_table_name(payload)?;
                let doc_id = BigEndian::read_u64(&rest[0..8]);
                let (body, _) = bmdb_codec::decode_prefix(&rest[8..]).map_err(Error::from)?;
                Ok(Record::Op {
                    txid,
                    seq,
                    op: WalOp::Put { table, doc_id, body },
                })
            }
            2 => {
                let (table, rest) = read_table_name(payload)?;
                let doc_id = BigEndian::read_u64(&rest[0..8]);
                Ok(Record::Op {
                    txid,
                    seq,
                    op: WalOp::Delete { table, doc_id },
                })
            }
            3 => Ok(Record::Commit { txid, seq }),
            4 => Ok(Record::Abort { txid, seq }),
            other => Err(Error::Corruption {
                location: "wal record".into(),
                detail: format!("unknown record kind {other}"),
            }),
        }
    }
}

fn write_table_name(buf: &mut Vec<u8>, table: &str) {
    let mut len_buf = [0u8; 2];
    BigEndian::write_u16(&mut len_buf, table.len() as u16);
    buf.extend_from_slice(&len_buf);
    buf.extend_from_slice(table.as_bytes());
}

fn read_table_name(payload: &[u8]) -> Result<(String, &[u8])> {
    if payload.len() < 2 {
        return Err(Error::Corruption {
            location: "wal record".into(),
            detail: "truncated table name length".into(),
        });
    }
    let len = BigEndian::read_u16(&payload[0..2]) as usize;
    if payload.len() < 2 + len {
        return Err(Error::Corruption {
            location: "wal record".into(),
            detail: "truncated table name".into(),
        });
    }
    let table = std::str::from_utf8(&payload[2..2 + len])
        .map_err(|_| Error::Corruption {
            location: "wal record".into(),
            detail: "table name is not valid utf-8".into(),
        })?
        .to_string();
    Ok((table, &payload[2 + len..]))
}

/// An append-only WAL file.
pub struct WalFile {
    path: PathBuf,
    file: File,
    next_seq: u64,
}

impl WalFile {
    /// Open (or create) the WAL at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let existed = fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| Error::io("open", e))?;
        let next_seq = if existed {
            let mut header = [0u8; HEADER_SIZE as usize];
            file.read_exact(&mut header).map_err(|e| Error::io("read", e))?;
            if &header[0..4] != WAL_MAGIC {
                return Err(Error::Corruption {
                    location: "wal header".into(),
                    detail: "bad magic".into(),
                });
            }
            let version = BigEndian::read_u32(&header[4..8]);
            if version != WAL_FORMAT_VERSION {
                return Err(Error::Corruption {
                    location: "wal header".into(),
                    detail: format!("unsupported wal version {version}"),
                });
            }
            BigEndian::read_u64(&header[8..16])
        } else {
            let mut wal = WalFile {
                path: path.clone(),
                file,
                next_seq: 0,
            };
            wal.write_header()?;
            file = wal.file;
            0
        };
        Ok(WalFile {
            path,
            file,
            next_seq,
        })
    }

    fn write_header(&mut self) -> Result<()> {
        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..4].copy_from_slice(WAL_MAGIC);
        BigEndian::write_u32(&mut header[4..8], WAL_FORMAT_VERSION);
        BigEndian::write_u64(&mut header[8..16], self.next_seq);
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::io("seek", e))?;
        self.file.write_all(&header).map_err(|e| Error::io("write", e))?;
        Ok(())
    }

    /// Append `record` to the tail of the log. Does not fsync; callers
    /// batch several appends and call [`Self::sync`] once per group.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        let payload = record.payload()?;
        self.file
            .seek(SeekFrom::End(0))
            .map_err(|e| Error::io("seek", e))?;
        let mut head = Vec::with_capacity(1 + 8 + 8 + 4);
        head.push(record.kind_byte());
        let mut txid_buf = [0u8; 8];
        BigEndian::write_u64(&mut txid_buf, record.txid());
        head.extend_from_slice(&txid_buf);
        let mut seq_buf = [0u8; 8];
        BigEndian::write_u64(&mut seq_buf, record.seq());
        head.extend_from_slice(&seq_buf);
        let mut len_buf = [0u8; 4];
        BigEndian::write_u32(&mut len_buf, payload.len() as u32);
        head.extend_from_slice(&len_buf);
        self.file.write_all(&head).map_err(|e| Error::io("write", e))?;
        self.file
            .write_all(&payload)
            .map_err(|e| Error::io("write", e))?;
        self.next_seq = self.next_seq.max(record.seq() + 1);
        Ok(())
    }

    /// Allocate the next sequence number.
    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Flush and fsync: the durability boundary for a group-committed
    /// batch.
    pub fn sync(&mut self) -> Result<()> {
        self.write_header()?;
        self.file.flush().map_err(|e| Error::io("flush", e))?;
        self.file.sync_all().map_err(|e| Error::io("fsync", e))?;
        Ok(())
    }

    /// Read every record currently in the log, in append order.
    pub fn read_all(&mut self) -> Result<Vec<Record>> {
        self.file
            .seek(SeekFrom::Start(HEADER_SIZE))
            .map_err(|e| Error::io("seek", e))?;
        let mut bytes = Vec::new();
        self.file
            .read_to_end(&mut bytes)
            .map_err(|e| Error::io("read", e))?;
        let mut records = Vec::new();
        let mut pos = 0usize;
        while pos + 21 <= bytes.len() {
            let kind = bytes[pos];
            let txid = BigEndian::read_u64(&bytes[pos + 1..pos + 9]);
            let seq = BigEndian::read_u64(&bytes[pos + 9..pos + 17]);
            let payload_len = BigEndian::read_u32(&bytes[pos + 17..pos + 21]) as usize;
            let payload_start = pos + 21;
            if payload_start + payload_len > bytes.len() {
                // trailing partial record from a crash mid-append; stop here.
                break;
            }
            let payload = &bytes[payload_start..payload_start + payload_len];
            records.push(Record::from_parts(kind, txid, seq, payload)?);
            pos = payload_start + payload_len;
        }
        Ok(records)
    }

    /// Truncate the log back to an empty, freshly-headered file — done
    /// once every record has been durably applied to the base store.
    pub fn reset(&mut self) -> Result<()> {
        self.file.set_len(0).map_err(|e| Error::io("truncate", e))?;
        self.write_header()?;
        self.sync()
    }

    /// Path this WAL is backed by (used to derive the advisory lock path).
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmdb_core::Value;
    use tempfile::tempdir;

    #[test]
    fn append_and_read_back() {
        let dir = tempdir().unwrap();
        let mut wal = WalFile::open(dir.path().join("x.wal")).unwrap();
        let seq0 = wal.next_seq();
        wal.append(&Record::Op {
            txid: 1,
            seq: seq0,
            op: WalOp::Put {
                table: "t".into(),
                doc_id: 7,
                body: Value::Int(42),
            },
        })
        .unwrap();
        let seq1 = wal.next_seq();
        wal.append(&Record::Commit { txid: 1, seq: seq1 }).unwrap();
        wal.sync().unwrap();

        let records = wal.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[1], Record::Commit { txid: 1, .. }));
    }

    #[test]
    fn reopen_preserves_records_until_reset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.wal");
        {
            let mut wal = WalFile::open(&path).unwrap();
            let seq = wal.next_seq();
            wal.append(&Record::Commit { txid: 5, seq }).unwrap();
            wal.sync().unwrap();
        }
        let mut reopened = WalFile::open(&path).unwrap();
        assert_eq!(reopened.read_all().unwrap().len(), 1);
        reopened.reset().unwrap();
        assert_eq!(reopened.read_all().unwrap().len(), 0);
    }

    #[test]
    fn abort_record_round_trips() {
        let dir = tempdir().unwrap();
        let mut wal = WalFile::open(dir.path().join("x.wal")).unwrap();
        let seq = wal.next_seq();
        wal.append(&Record::Abort { txid: 9, seq }).unwrap();
        wal.sync().unwrap();
        let records = wal.read_all().unwrap();
        assert!(matches!(records[0], Record::Abort { txid: 9, .. }));
    }

    #[test]
    fn rejects_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.wal");
        fs::write(&path, b"NOPE0000000000000000").unwrap();
        assert!(WalFile::open(&path).is_err());
    }
}
