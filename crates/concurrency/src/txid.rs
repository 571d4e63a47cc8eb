//! Transaction ids: a monotonic counter, stable for the lifetime of a
//! database.
use std::sync::atomic::{AtomicU64, Ordering};

/// A transaction id. Ordered: a higher `TxId` always started later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId(u64);

impl TxId {
    /// The id reserved for data written before any transaction existed
    /// (e.g. bulk-loaded or pre-MVCC documents) — always visible.
    pub const GENESIS: TxId = TxId(0);

    /// The raw counter value.
    pub fn value(self) -> u64 {
        self.0
    }

    /// Reconstruct a `TxId` from a raw value previously obtained via
    /// [`Self::value`] — used by WAL recovery to restore the exact id a
    /// transaction committed under before a crash.
    pub fn from_raw(value: u64) -> Self {
        TxId(value)
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// Hands out strictly increasing [`TxId`]s.
#[derive(Debug, Default)]
pub struct TxIdGenerator {
    next: AtomicU64,
}

impl TxIdGenerator {
    /// A generator starting just after [`TxId::GENESIS`].
    pub fn new() -> Self {
        TxIdGenerator {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next id.
    pub fn next(&self) -> TxId {
        TxId(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// The id that would be handed out next, without allocating it —
    /// used by recovery to resume the counter after replaying a WAL.
    pub fn peek(&self) -> TxId {
        TxId(self.next.load(Ordering::SeqCst))
    }

    /// Fast-forward the counter so the next allocation is at least
    /// `floor + 1`. Used by WAL recovery to avoid reissuing a txid that
    /// already appears in the log.
    pub fn fast_forward(&self, floor: TxId) {
        self.next.fetch_max(floor.value() + 1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_increasing() {
        let gen = TxIdGenerator::new();
        let a = gen.next();
        let b = gen.next();
        assert!(b > a);
    }

    #[test]
    fn fast_forward_never_goes_backwards() {
        let gen = TxIdGenerator::new();
        gen.fast_forward(TxId(100));
        assert_eq!(gen.next(), TxId(101));
        gen.fast_forward(TxId(5));
        assert_eq!(gen.next(), TxId(102));
    }
}
