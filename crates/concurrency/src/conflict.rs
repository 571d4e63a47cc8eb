//! Write-write conflict resolution.

/// How to resolve a write that targets a document modified since the
/// writer's transaction began.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// The later commit wins outright; the earlier transaction's write is
    /// silently superseded. Default — matches most embedded single-process
    /// document stores, where callers serialize writes themselves.
    #[default]
    LastWriterWins,
    /// Reject the later commit with `Error::Conflict` if the document's
    /// latest version differs from the one the transaction last read.
    OptimisticReject,
}

impl ConflictPolicy {
    /// Whether a transaction that read `seen_at` and is now committing a
    /// write should be allowed to proceed, given the document's current
    /// latest version is `current`.
    pub fn allows(self, seen_at: super::TxId, current: super::TxId) -> bool {
        match self {
            ConflictPolicy::LastWriterWins => true,
            ConflictPolicy::OptimisticReject => seen_at >= current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TxId;

    #[test]
    fn last_writer_wins_always_allows() {
        assert!(ConflictPolicy::LastWriterWins.allows(TxId::GENESIS, TxId::GENESIS));
    }

    #[test]
    fn optimistic_reject_rejects_stale_reads() {
        let gen = crate::TxIdGenerator::new();
        let seen = gen.next();
        let current = gen.next();
        assert!(!ConflictPolicy::OptimisticReject.allows(seen, current));
        assert!(ConflictPolicy::OptimisticReject.allows(current, current));
    }
}
