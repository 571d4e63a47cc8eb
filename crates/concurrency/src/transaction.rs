//! Per-document version chains and transaction snapshots.
use crate::conflict::ConflictPolicy;
use crate::txid::TxId;
use bmdb_core::{Error, Result, Value};
use std::collections::HashMap;

/// One committed version of a document: `None` marks a delete (tombstone).
#[derive(Debug, Clone)]
struct Version {
    txid: TxId,
    body: Option<Value>,
}

/// The committed history of a single document, newest last.
#[derive(Debug, Clone, Default)]
struct VersionChain {
    versions: Vec<Version>,
}

impl VersionChain {
    fn latest_txid(&self) -> TxId {
        self.versions.last().map(|v| v.txid).unwrap_or(TxId::GENESIS)
    }

    /// The body visible to a transaction whose snapshot is `as_of`: the
    /// newest committed version with `txid <= as_of`.
    fn visible_at(&self, as_of: TxId) -> Option<&Value> {
        self.versions
            .iter()
            .rev()
            .find(|v| v.txid <= as_of)
            .and_then(|v| v.body.as_ref())
    }

    fn push(&mut self, txid: TxId, body: Option<Value>) {
        self.versions.push(Version { txid, body });
    }
}

/// Per-table MVCC index: a version chain per doc-id, plus the conflict
/// policy applied to every commit.
pub struct MvccIndex {
    policy: ConflictPolicy,
    chains: HashMap<u64, VersionChain>,
}

impl MvccIndex {
    /// A fresh index with no history, applying `policy` to every commit.
    pub fn new(policy: ConflictPolicy) -> Self {
        MvccIndex {
            policy,
            chains: HashMap::new(),
        }
    }

    /// Read `doc_id` as of `snapshot`.
    pub fn read(&self, doc_id: u64, snapshot: TxId) -> Option<Value> {
        self.chains.get(&doc_id)?.visible_at(snapshot).cloned()
    }

    /// The txid of the latest committed version of `doc_id`, `GENESIS` if
    /// it has never been written.
    pub fn latest_txid(&self, doc_id: u64) -> TxId {
        self.chains
            .get(&doc_id)
            .map(|c| c.latest_txid())
            .unwrap_or(TxId::GENESIS)
    }

    /// Commit a write to `doc_id`, checking it against the policy: the
    /// writer last observed `seen_at` (its snapshot's view, or the txid it
    /// read the document at). Returns `Error::Conflict` under
    /// `OptimisticReject` if the document changed since.
    pub fn commit_write(
        &mut self,
        doc_id: u64,
        seen_at: TxId,
        txid: TxId,
        body: Option<Value>,
    ) -> Result<()> {
        let current = self.latest_txid(doc_id);
        if !self.policy.allows(seen_at, current) {
            return Err(Error::Conflict);
        }
        self.chains.entry(doc_id).or_default().push(txid, body);
        Ok(())
    }

    /// Load a document's version directly (used by WAL recovery, which
    /// replays committed records without re-checking conflicts).
    pub fn replay_write(&mut self, doc_id: u64, txid: TxId, body: Option<Value>) {
        self.chains.entry(doc_id).or_default().push(txid, body);
    }
}

/// A transaction's view of the world: a fixed snapshot to read through,
/// and a staged set of writes not yet visible to anyone else.
pub struct Transaction {
    id: TxId,
    snapshot: TxId,
    staged: HashMap<u64, Option<Value>>,
}

impl Transaction {
    /// Begin a transaction with id `id` reading as of `snapshot`.
    pub fn begin(id: TxId, snapshot: TxId) -> Self {
        Transaction {
            id,
            snapshot,
            staged: HashMap::new(),
        }
    }

    /// This transaction's id.
    pub fn id(&self) -> TxId {
        self.id
    }

    /// The snapshot this transaction reads through.
    pub fn snapshot(&self) -> TxId {
        self.snapshot
    }

    /// Stage a write, visible only within this transaction until commit.
    pub fn stage_write(&mut self, doc_id: u64, body: Value) {
        self.staged.insert(doc_id, Some(body));
    }

    /// Stage a delete.
    pub fn stage_delete(&mut self, doc_id: u64) {
        self.staged.insert(doc_id, None);
    }

    /// Read `doc_id` through this transaction: a staged write if present,
    /// else the index's snapshot view.
    pub fn read(&self, doc_id: u64, index: &MvccIndex) -> Option<Value> {
        match self.staged.get(&doc_id) {
            Some(staged) => staged.clone(),
            None => index.read(doc_id, self.snapshot),
        }
    }

    /// Apply every staged write to `index`, committing this transaction.
    /// Stops at the first conflict, leaving later staged writes unapplied.
    pub fn commit(self, index: &mut MvccIndex) -> Result<()> {
        for (doc_id, body) in self.staged {
            index.commit_write(doc_id, self.snapshot, self.id, body)?;
        }
        Ok(())
    }
}
