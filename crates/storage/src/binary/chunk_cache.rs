//! Power-of-two page cache over the raw file.
use bmdb_core::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, SeekFrom, Write};

/// Snapshot of cache activity, exposed for diagnostics/tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkCacheStats {
    /// Page lookups served from the cache.
    pub hits: u64,
    /// Page lookups that required a file read.
    pub misses: u64,
    /// Pages currently dirty (written but not yet synced).
    pub dirty_count: usize,
}

/// A trait object-free alias for "a file-like handle with an explicit
/// fsync", so the cache can run over `std::fs::File` in production and an
/// in-memory `Cursor` in tests.
pub trait SyncFile: Read + Write + Seek {
    /// Flush OS buffers to stable storage.
    fn sync_all(&self) -> std::io::Result<()>;
}

impl SyncFile for std::fs::File {
    fn sync_all(&self) -> std::io::Result<()> {
        std::fs::File::sync_all(self)
    }
}

/// Reads/writes of the raw file go through fixed-size pages to amortize
/// syscalls; writes mark pages dirty and only hit disk on `sync`.
pub struct ChunkCache<F: SyncFile> {
    file: F,
    chunk_size: usize,
    pages: HashMap<u64, Vec<u8>>,
    dirty: HashSet<u64>,
    hits: u64,
    misses: u64,
}

impl<F: SyncFile> ChunkCache<F> {
    /// Wrap `file`, caching in `chunk_size`-byte pages (power-of-two, e.g.
    /// 4 KiB, matching the OS page size).
    pub fn new(file: F, chunk_size: usize) -> Self {
        ChunkCache {
            file,
            chunk_size,
            pages: HashMap::new(),
            dirty: HashSet::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Current cache statistics.
    pub fn stats(&self) -> ChunkCacheStats {
        ChunkCacheStats {
            hits: self.hits,
            misses: self.misses,
            dirty_count: self.dirty.len(),
        }
    }

    fn ensure_page(&mut self, page_idx: u64) -> Result<()> {
        if self.pages.contains_key(&page_idx) {
            self.hits += 1;
            return Ok(());
        }
        self.misses += 1;
        let mut buf = vec![0u8; self.chunk_size];
        self.file
            .seek(SeekFrom::Start(page_idx * self.chunk_size as u64))
            .map_err(|e| Error::io("seek", e))?;
        let mut read_total = 0usize;
        loop {
            match self.file.read(&mut buf[read_total..]) {
                Ok(0) => break,
                Ok(n) => read_total += n,
                Err(e) => return Err(Error::io("read", e)),
            }
            if read_total == buf.len() {
                break;
            }
        }
        self.pages.insert(page_idx, buf);
        Ok(())
    }

    /// Read `len` bytes starting at absolute file `offset`, spanning pages
    /// as needed.
    pub fn read(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        let mut remaining = len;
        let mut pos = offset;
        while remaining > 0 {
            let page_idx = pos / self.chunk_size as u64;
            self.ensure_page(page_idx)?;
            let page = &self.pages[&page_idx];
            let in_page_offset = (pos % self.chunk_size as u64) as usize;
            let take = remaining.min(self.chunk_size - in_page_offset);
            out.extend_from_slice(&page[in_page_offset..in_page_offset + take]);
            remaining -= take;
            pos += take as u64;
        }
        Ok(out)
    }

    /// Overwrite `data` starting at absolute file `offset`. Marks every
    /// touched page dirty; nothing hits disk until [`Self::sync`].
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let mut remaining = data;
        let mut pos = offset;
        while !remaining.is_empty() {
            let page_idx = pos / self.chunk_size as u64;
            self.ensure_page(page_idx)?;
            let in_page_offset = (pos % self.chunk_size as u64) as usize;
            let take = remaining.len().min(self.chunk_size - in_page_offset);
            let page = self.pages.get_mut(&page_idx).expect("just ensured");
            page[in_page_offset..in_page_offset + take].copy_from_slice(&remaining[..take]);
            self.dirty.insert(page_idx);
            remaining = &remaining[take..];
            pos += take as u64;
        }
        Ok(())
    }

    /// Flush dirty pages and fsync the underlying file.
    pub fn sync(&mut self) -> Result<()> {
        let mut dirty: Vec<u64> = self.dirty.iter().copied().collect();
        dirty.sort_unstable();
        for page_idx in dirty {
            let page = &self.pages[&page_idx];
            self.file
                .seek(SeekFrom::Start(page_idx * self.chunk_size as u64))
                .map_err(|e| Error::io("seek", e))?;
            self.file.write_all(page).map_err(|e| Error::io("write", e))?;
        }
        self.dirty.clear();
        self.file.flush().map_err(|e| Error::io("flush", e))?;
        self.file.sync_all().map_err(|e| Error::io("fsync", e))?;
        Ok(())
    }

    /// Borrow the underlying file (used for operations outside the page
    /// abstraction, e.g. truncating after compaction).
    pub fn file_mut(&mut self) -> &mut F {
        &mut self.file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    impl SyncFile for Cursor<Vec<u8>> {
        fn sync_all(&self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_then_read_back_before_sync() {
        let mut cache = ChunkCache::new(Cursor::new(Vec::new()), 16);
        cache.write(0, b"hello world!!!!!").unwrap();
        assert_eq!(cache.read(0, 5).unwrap(), b"hello");
        assert_eq!(cache.stats().dirty_count, 1);
    }

    #[test]
    fn spans_multiple_pages() {
        let mut cache = ChunkCache::new(Cursor::new(Vec::new()), 4);
        cache.write(2, b"abcdef").unwrap(); // spans pages 0,1,2
        assert_eq!(cache.read(2, 6).unwrap(), b"abcdef");
    }

    #[test]
    fn sync_flushes_dirty_and_clears_stats() {
        let mut cache = ChunkCache::new(Cursor::new(Vec::new()), 8);
        cache.write(0, b"01234567").unwrap();
        cache.sync().unwrap();
        assert_eq!(cache.stats().dirty_count, 0);
    }
}
