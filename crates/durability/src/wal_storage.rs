//! Write-ahead-logged storage: wraps any [`Storage`] backend with group
//! commit, MVCC version tracking, and crash recovery.
//!
//! MVCC enforcement has a narrower scope than the `Storage` trait surface:
//! the auto-committing trait methods (`write_document` and friends, used by
//! `Table`/`Database`/`Bmdb` for single-call mutations) apply each write
//! unconditionally — there is no prior reader to conflict with, since the
//! call reads and writes atomically. Snapshot-isolated reads and
//! [`ConflictPolicy::OptimisticReject`] checking only apply to the explicit
//! multi-call transaction API ([`WalStorage::begin`],
//! [`WalStorage::read_in_transaction`], [`WalStorage::write_in_transaction`]/
//! [`WalStorage::delete_in_transaction`], [`WalStorage::commit`]), which is
//! where a caller can actually read a value, decide what to write based on
//! it, and have that decision invalidated by someone else's write in
//! between.
use crate::lock::FileLock;
use crate::wal::{Record, WalFile, WalOp};
use bmdb_concurrency::{ConflictPolicy, MvccIndex, TxId, TxIdGenerator};
use bmdb_core::{Clock, Error, Result, SystemClock, Value};
use bmdb_storage::{Storage, TableSnapshot};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Tuning knobs for group commit and locking, mirroring the subset of
/// `Config` that this layer needs.
#[derive(Debug, Clone)]
pub struct DurabilityOptions {
    /// Fsync the WAL (and the inner store) once this many records have
    /// accumulated since the last flush.
    pub batch_size: usize,
    /// Fsync once this much time has passed since the last flush, checked
    /// on the next call rather than via a background timer.
    pub batch_timeout_ms: i64,
    /// How long to wait for the advisory file lock before giving up.
    pub lock_timeout_ms: u64,
    /// Conflict policy applied to every commit.
    pub conflict_policy: ConflictPolicy,
}

impl Default for DurabilityOptions {
    fn default() -> Self {
        DurabilityOptions {
            batch_size: 100,
            batch_timeout_ms: 50,
            lock_timeout_ms: 5_000,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

/// State for a transaction begun with [`WalStorage::begin`]: the snapshot
/// it reads through, its staged writes (invisible until `commit`), and the
/// set of `(table, doc_id)` pairs it has read or written — checked against
/// [`ConflictPolicy::OptimisticReject`] at commit time.
#[derive(Debug)]
struct OpenTxn {
    snapshot: TxId,
    ops: Vec<WalOp>,
    reads: HashSet<(String, u64)>,
}

/// Wraps an inner [`Storage`] with a WAL: every mutating call is logged as
/// a transaction, optionally batched with others before the WAL (and the
/// inner store) are fsynced.
pub struct WalStorage<S: Storage> {
    inner: S,
    wal: WalFile,
    _lock: FileLock,
    txids: TxIdGenerator,
    mvcc: HashMap<String, MvccIndex>,
    options: DurabilityOptions,
    clock: Arc<dyn Clock>,
    pending: usize,
    last_flush_at: DateTime<Utc>,
    /// The highest txid actually committed so far; new transactions begun
    /// via [`Self::begin`] read as of this snapshot.
    last_committed: TxId,
    /// Transactions begun via [`Self::begin`], not yet committed or rolled
    /// back.
    open_txns: HashMap<u64, OpenTxn>,
}

impl<S: Storage> WalStorage<S> {
    /// Open `inner`, with its WAL at `wal_path`. Runs crash recovery
    /// (replaying any committed records not yet reflected in `inner`)
    /// before returning.
    pub fn open(inner: S, wal_path: impl AsRef<Path>, options: DurabilityOptions) -> Result<Self> {
        Self::open_with_clock(inner, wal_path, options, Arc::new(SystemClock))
    }

    /// Like [`Self::open`], injecting a specific clock (for deterministic
    /// group-commit-timeout tests).
    pub fn open_with_clock(
        mut inner: S,
        wal_path: impl AsRef<Path>,
        options: DurabilityOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let wal_path = wal_path.as_ref();
        let lock = FileLock::acquire(wal_path, Duration::from_millis(options.lock_timeout_ms))?;
        let mut wal = WalFile::open(wal_path)?;
        let mut mvcc: HashMap<String, MvccIndex> = HashMap::new();
        let mut txids = TxIdGenerator::new();

        recover(&mut wal, &mut inner, &mut mvcc, &mut txids, options.conflict_policy)?;
        // every committed txid fast-forwards the counter past itself during
        // recovery, so the id just below the next one to be handed out is
        // the highest txid actually committed (GENESIS if none were).
        let last_committed = TxId::from_raw(txids.peek().value().saturating_sub(1));

        Ok(WalStorage {
            inner,
            wal,
            _lock: lock,
            txids,
            mvcc,
            options,
            last_flush_at: clock.now(),
            clock,
            pending: 0,
            last_committed,
            open_txns: HashMap::new(),
        })
    }

    fn mvcc_for(&mut self, table: &str) -> &mut MvccIndex {
        self.mvcc
            .entry(table.to_string())
            .or_insert_with(|| MvccIndex::new(self.options.conflict_policy))
    }

    /// Apply a batch of operations as one transaction: logged to the WAL,
    /// then applied to the inner store and MVCC index. Group-commits the
    /// WAL (and syncs the inner store) once `batch_size` records have
    /// accumulated or `batch_timeout_ms` has elapsed since the last flush.
    pub fn apply_batch(&mut self, ops: Vec<WalOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let txid = self.txids.next();
        for op in &ops {
            let seq = self.wal.next_seq();
            self.wal.append(&Record::Op {
                txid: txid.value(),
                seq,
                op: op.clone(),
            })?;
        }
        let commit_seq = self.wal.next_seq();
        self.wal.append(&Record::Commit {
            txid: txid.value(),
            seq: commit_seq,
        })?;
        self.pending += ops.len() + 1;

        for op in &ops {
            match op {
                WalOp::Put { table, doc_id, body } => {
                    let seen_at = self.mvcc_for(table).latest_txid(*doc_id);
                    self.inner.write_document(table, *doc_id, body.clone())?;
                    // seen_at is read just above, so this can never conflict with
                    // itself; it still records the version so a concurrently open
                    // explicit transaction's commit-time check sees this write.
                    self.mvcc_for(table)
                        .commit_write(*doc_id, seen_at, txid, Some(body.clone()))?;
                }
                WalOp::Delete { table, doc_id } => {
                    let seen_at = self.mvcc_for(table).latest_txid(*doc_id);
                    self.inner.delete_document(table, *doc_id)?;
                    self.mvcc_for(table).commit_write(*doc_id, seen_at, txid, None)?;
                }
            }
        }
        self.last_committed = txid;

        if self.batch_due() {
            self.flush()?;
        }
        Ok(())
    }

    fn batch_due(&self) -> bool {
        let elapsed = self.clock.now() - self.last_flush_at;
        self.pending >= self.options.batch_size
            || elapsed >= chrono::Duration::milliseconds(self.options.batch_timeout_ms)
    }

    /// Force a group-commit flush regardless of batch size/timeout.
    pub fn flush(&mut self) -> Result<()> {
        self.wal.sync()?;
        self.inner.sync()?;
        self.wal.reset()?;
        self.pending = 0;
        self.last_flush_at = self.clock.now();
        Ok(())
    }

    /// Borrow the inner store (used by callers that need backend-specific
    /// operations like compaction).
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Begin an explicit multi-call transaction. Writes staged under the
    /// returned id via [`Self::write_in_transaction`]/
    /// [`Self::delete_in_transaction`] are invisible to readers and not
    /// durable until [`Self::commit`]; [`Self::rollback`] discards them.
    pub fn begin(&mut self) -> TxId {
        let txid = self.txids.next();
        self.open_txns.insert(
            txid.value(),
            OpenTxn {
                snapshot: self.last_committed,
                ops: Vec::new(),
                reads: HashSet::new(),
            },
        );
        txid
    }

    fn stage_txn_op(&mut self, txid: TxId, op: WalOp) -> Result<()> {
        let seq = self.wal.next_seq();
        self.wal.append(&Record::Op {
            txid: txid.value(),
            seq,
            op: op.clone(),
        })?;
        self.pending += 1;
        let snapshot = self.last_committed;
        self.open_txns
            .entry(txid.value())
            .or_insert_with(|| OpenTxn {
                snapshot,
                ops: Vec::new(),
                reads: HashSet::new(),
            })
            .ops
            .push(op);
        self.maybe_flush_batch()
    }

    /// Read `doc_id` through a transaction begun with [`Self::begin`]: a
    /// write staged under this same transaction wins, otherwise the
    /// document is read as of the transaction's snapshot via
    /// [`MvccIndex::read`]. Records `(table, doc_id)` in the transaction's
    /// read-set, so a concurrent conflicting write can be caught at
    /// [`Self::commit`] under [`ConflictPolicy::OptimisticReject`].
    ///
    /// An unknown `txid` (never begun, or already committed/rolled back)
    /// falls back to a plain, non-snapshot-isolated read.
    pub fn read_in_transaction(
        &mut self,
        txid: TxId,
        table: &str,
        doc_id: u64,
    ) -> Result<Option<Value>> {
        let snapshot = match self.open_txns.get(&txid.value()) {
            Some(open) => open.snapshot,
            None => return self.inner.read_document(table, doc_id),
        };
        if let Some(open) = self.open_txns.get_mut(&txid.value()) {
            open.reads.insert((table.to_string(), doc_id));
            for op in open.ops.iter().rev() {
                match op {
                    WalOp::Put { table: t, doc_id: d, body } if t == table && *d == doc_id => {
                        return Ok(Some(body.clone()));
                    }
                    WalOp::Delete { table: t, doc_id: d } if t == table && *d == doc_id => {
                        return Ok(None);
                    }
                    _ => {}
                }
            }
        }
        // A document with no MVCC history (bulk-loaded, or written before
        // this table was ever touched under MVCC) has no chain entry, so
        // `MvccIndex::read` would wrongly report it missing; fall back to
        // the live value instead.
        if self.mvcc_for(table).latest_txid(doc_id) == TxId::GENESIS {
            self.inner.read_document(table, doc_id)
        } else {
            Ok(self.mvcc_for(table).read(doc_id, snapshot))
        }
    }

    fn check_conflicts(&mut self, open: &OpenTxn) -> Result<()> {
        if self.options.conflict_policy != ConflictPolicy::OptimisticReject {
            return Ok(());
        }
        let mut touched: HashSet<(String, u64)> = open.reads.clone();
        for op in &open.ops {
            match op {
                WalOp::Put { table, doc_id, .. } => {
                    touched.insert((table.clone(), *doc_id));
                }
                WalOp::Delete { table, doc_id } => {
                    touched.insert((table.clone(), *doc_id));
                }
            }
        }
        for (table, doc_id) in touched {
            let current = self.mvcc_for(&table).latest_txid(doc_id);
            if !self.options.conflict_policy.allows(open.snapshot, current) {
                return Err(Error::Conflict);
            }
        }
        Ok(())
    }

    /// Stage a write under `txid`, begun with [`Self::begin`].
    pub fn write_in_transaction(&mut self, txid: TxId, table: &str, doc_id: u64, body: Value) -> Result<()> {
        self.stage_txn_op(
            txid,
            WalOp::Put {
                table: table.to_string(),
                doc_id,
                body,
            },
        )
    }

    /// Stage a delete under `txid`, begun with [`Self::begin`].
    pub fn delete_in_transaction(&mut self, txid: TxId, table: &str, doc_id: u64) -> Result<()> {
        self.stage_txn_op(txid, WalOp::Delete {
            table: table.to_string(),
            doc_id,
        })
    }

    /// Force any WAL records accumulated since the last flush to disk,
    /// without committing or applying their effects. Gives durability to
    /// a long-running, still-open transaction between batch-timeout checks.
    pub fn force_batch_flush(&mut self) -> Result<()> {
        self.wal.sync()?;
        self.pending = 0;
        self.last_flush_at = self.clock.now();
        Ok(())
    }

    fn maybe_flush_batch(&mut self) -> Result<()> {
        if self.batch_due() {
            self.force_batch_flush()?;
        }
        Ok(())
    }

    /// Commit a transaction begun with [`Self::begin`]: checks every read
    /// or written `(table, doc_id)` against [`ConflictPolicy`] (a no-op
    /// under the default `LastWriterWins`), appends a COMMIT record,
    /// fsyncs, and atomically applies every staged write to the base store
    /// and MVCC index. Returns `Error::Conflict` without applying anything
    /// if the check fails. A commit with no prior writes (or an
    /// already-resolved/unknown txid) is a no-op beyond the WAL record.
    pub fn commit(&mut self, txid: TxId) -> Result<()> {
        let open = match self.open_txns.remove(&txid.value()) {
            Some(open) => open,
            None => {
                let seq = self.wal.next_seq();
                self.wal.append(&Record::Commit {
                    txid: txid.value(),
                    seq,
                })?;
                self.pending += 1;
                return self.flush();
            }
        };
        self.check_conflicts(&open)?;
        let seq = self.wal.next_seq();
        self.wal.append(&Record::Commit {
            txid: txid.value(),
            seq,
        })?;
        self.pending += 1;
        for op in open.ops {
            match op {
                WalOp::Put { table, doc_id, body } => {
                    let seen_at = self.mvcc_for(&table).latest_txid(doc_id);
                    self.inner.write_document(&table, doc_id, body.clone())?;
                    self.mvcc_for(&table).commit_write(doc_id, seen_at, txid, Some(body))?;
                }
                WalOp::Delete { table, doc_id } => {
                    let seen_at = self.mvcc_for(&table).latest_txid(doc_id);
                    self.inner.delete_document(&table, doc_id)?;
                    self.mvcc_for(&table).commit_write(doc_id, seen_at, txid, None)?;
                }
            }
        }
        self.last_committed = txid;
        self.flush()
    }

    /// Abandon a transaction begun with [`Self::begin`]: appends an ABORT
    /// record and drops its staged effects. An unknown txid is a no-op.
    pub fn rollback(&mut self, txid: TxId) -> Result<()> {
        self.open_txns.remove(&txid.value());
        let seq = self.wal.next_seq();
        self.wal.append(&Record::Abort {
            txid: txid.value(),
            seq,
        })?;
        Ok(())
    }
}

fn recover<S: Storage>(
    wal: &mut WalFile,
    inner: &mut S,
    mvcc: &mut HashMap<String, MvccIndex>,
    txids: &mut TxIdGenerator,
    policy: ConflictPolicy,
) -> Result<()> {
    let records = wal.read_all()?;
    let mut by_txid: HashMap<u64, Vec<WalOp>> = HashMap::new();
    let mut committed: Vec<u64> = Vec::new();
    for record in records {
        match record {
            Record::Op { txid, op, .. } => by_txid.entry(txid).or_default().push(op),
            Record::Commit { txid, .. } => committed.push(txid),
            // An aborted txid's ops are simply never promoted to `committed`;
            // dropping the entry outright keeps `by_txid` from growing for
            // long-lived WALs with many rolled-back transactions.
            Record::Abort { txid, .. } => {
                by_txid.remove(&txid);
            }
        }
    }
    for txid in committed {
        let ops = match by_txid.remove(&txid) {
            Some(ops) => ops,
            None => continue,
        };
        let recovered_txid = bmdb_concurrency::TxId::from_raw(txid);
        txids.fast_forward(recovered_txid);
        for op in ops {
            match op {
                WalOp::Put { table, doc_id, body } => {
                    inner.write_document(&table, doc_id, body.clone())?;
                    mvcc.entry(table)
                        .or_insert_with(|| MvccIndex::new(policy))
                        .replay_write(doc_id, recovered_txid, Some(body));
                }
                WalOp::Delete { table, doc_id } => {
                    inner.delete_document(&table, doc_id)?;
                    mvcc.entry(table)
                        .or_insert_with(|| MvccIndex::new(policy))
                        .replay_write(doc_id, recovered_txid, None);
                }
            }
        }
        let _ = txid; // the raw WAL txid only orders recovery; the index keeps its own ids after this point
    }
    if !by_txid.is_empty() {
        tracing::warn!(
            incomplete_transactions = by_txid.len(),
            "dropping uncommitted WAL transactions found during recovery"
        );
    }
    inner.sync()?;
    wal.reset()?;
    Ok(())
}

impl<S: Storage> Storage for WalStorage<S> {
    fn read_table(&mut self, table: &str) -> Result<TableSnapshot> {
        self.inner.read_table(table)
    }

    fn write_table(&mut self, table: &str, docs: TableSnapshot) -> Result<()> {
        let current = self.inner.read_table(table)?;
        let mut ops = Vec::new();
        for (&id, body) in &docs {
            if current.get(&id) != Some(body) {
                ops.push(WalOp::Put {
                    table: table.to_string(),
                    doc_id: id,
                    body: body.clone(),
                });
            }
        }
        for &id in current.keys() {
            if !docs.contains_key(&id) {
                ops.push(WalOp::Delete {
                    table: table.to_string(),
                    doc_id: id,
                });
            }
        }
        self.apply_batch(ops)
    }

    fn read_document(&mut self, table: &str, doc_id: u64) -> Result<Option<Value>> {
        self.inner.read_document(table, doc_id)
    }

    fn write_document(&mut self, table: &str, doc_id: u64, body: Value) -> Result<()> {
        self.apply_batch(vec![WalOp::Put {
            table: table.to_string(),
            doc_id,
            body,
        }])
    }

    fn delete_document(&mut self, table: &str, doc_id: u64) -> Result<bool> {
        let existed = self.inner.read_document(table, doc_id)?.is_some();
        if existed {
            self.apply_batch(vec![WalOp::Delete {
                table: table.to_string(),
                doc_id,
            }])?;
        }
        Ok(existed)
    }

    fn read_documents_bulk(&mut self, table: &str, ids: &[u64]) -> Result<TableSnapshot> {
        self.inner.read_documents_bulk(table, ids)
    }

    fn update_documents_bulk(&mut self, table: &str, docs: TableSnapshot) -> Result<()> {
        let ops = docs
            .into_iter()
            .map(|(doc_id, body)| WalOp::Put {
                table: table.to_string(),
                doc_id,
                body,
            })
            .collect();
        self.apply_batch(ops)
    }

    fn truncate_table(&mut self, table: &str) -> Result<()> {
        let current = self.inner.read_table(table)?;
        let ops = current
            .into_keys()
            .map(|doc_id| WalOp::Delete {
                table: table.to_string(),
                doc_id,
            })
            .collect();
        self.apply_batch(ops)
    }

    fn list_tables(&mut self) -> Result<Vec<String>> {
        self.inner.list_tables()
    }

    fn sync(&mut self) -> Result<()> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmdb_storage::InMemoryStorage;
    use tempfile::tempdir;

    #[test]
    fn write_is_visible_before_group_commit_flush() {
        let dir = tempdir().unwrap();
        let mut options = DurabilityOptions::default();
        options.batch_size = 1000; // never triggers on its own
        let mut store =
            WalStorage::open(InMemoryStorage::new(), dir.path().join("x.wal"), options).unwrap();
        store.write_document("t", 1, Value::Int(9)).unwrap();
        assert_eq!(store.read_document("t", 1).unwrap(), Some(Value::Int(9)));
    }

    #[test]
    fn flush_resets_wal() {
        let dir = tempdir().unwrap();
        let mut store = WalStorage::open(
            InMemoryStorage::new(),
            dir.path().join("x.wal"),
            DurabilityOptions::default(),
        )
        .unwrap();
        for i in 0..5u64 {
            store.write_document("t", i, Value::Int(i as i64)).unwrap();
        }
        store.flush().unwrap();
        assert_eq!(store.wal.read_all().unwrap().len(), 0);
    }

    #[test]
    fn recovery_replays_committed_transactions_after_reopen() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("x.wal");
        let data_path = dir.path().join("data.bmdb");
        {
            let inner = bmdb_storage::BinaryFileStore::open(&data_path).unwrap();
            let mut options = DurabilityOptions::default();
            options.batch_size = 1_000_000; // never triggers: the inner store's chunk cache stays unsynced
            let mut store = WalStorage::open(inner, &wal_path, options).unwrap();
            store.write_document("t", 1, Value::Int(1)).unwrap();
            store.wal.sync().unwrap(); // WAL durable; inner store never synced, so its page cache is lost on drop
        }
        let inner = bmdb_storage::BinaryFileStore::open(&data_path).unwrap();
        let mut reopened =
            WalStorage::open(inner, &wal_path, DurabilityOptions::default()).unwrap();
        assert_eq!(reopened.read_document("t", 1).unwrap(), Some(Value::Int(1)));
    }

    #[test]
    fn explicit_transaction_writes_are_invisible_until_commit() {
        let dir = tempdir().unwrap();
        let mut store = WalStorage::open(
            InMemoryStorage::new(),
            dir.path().join("x.wal"),
            DurabilityOptions::default(),
        )
        .unwrap();
        let txid = store.begin();
        store
            .write_in_transaction(txid, "t", 1, Value::Int(1))
            .unwrap();
        assert_eq!(store.read_document("t", 1).unwrap(), None);
        store.commit(txid).unwrap();
        assert_eq!(store.read_document("t", 1).unwrap(), Some(Value::Int(1)));
    }

    #[test]
    fn rollback_discards_staged_effects() {
        let dir = tempdir().unwrap();
        let mut store = WalStorage::open(
            InMemoryStorage::new(),
            dir.path().join("x.wal"),
            DurabilityOptions::default(),
        )
        .unwrap();
        let txid = store.begin();
        store
            .write_in_transaction(txid, "t", 1, Value::Int(1))
            .unwrap();
        store.rollback(txid).unwrap();
        assert_eq!(store.read_document("t", 1).unwrap(), None);
        // committing a rolled-back (now-unknown) txid is a no-op, not an error
        store.commit(txid).unwrap();
        assert_eq!(store.read_document("t", 1).unwrap(), None);
    }

    #[test]
    fn commit_with_no_prior_writes_is_a_no_op() {
        let dir = tempdir().unwrap();
        let mut store = WalStorage::open(
            InMemoryStorage::new(),
            dir.path().join("x.wal"),
            DurabilityOptions::default(),
        )
        .unwrap();
        let txid = store.begin();
        store.commit(txid).unwrap(); // no writes staged
        assert_eq!(store.list_tables().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn reopen_after_crash_sees_only_committed_transactions() {
        // Mirrors the end-to-end scenario: T1 writes two docs and commits,
        // T2 writes one doc and never commits before the process is killed.
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("x.wal");
        let data_path = dir.path().join("data.bmdb");
        {
            let inner = bmdb_storage::BinaryFileStore::open(&data_path).unwrap();
            let mut store = WalStorage::open(inner, &wal_path, DurabilityOptions::default()).unwrap();

            let t1 = store.begin();
            store.write_in_transaction(t1, "docs", 1, Value::Int(1)).unwrap();
            store.write_in_transaction(t1, "docs", 2, Value::Int(2)).unwrap();
            store.commit(t1).unwrap();

            let t2 = store.begin();
            store.write_in_transaction(t2, "docs", 3, Value::Int(3)).unwrap();
            store.force_batch_flush().unwrap(); // durable on disk, but never committed
            // process "crashes" here: store is dropped without calling commit(t2)
        }

        let inner = bmdb_storage::BinaryFileStore::open(&data_path).unwrap();
        let mut reopened =
            WalStorage::open(inner, &wal_path, DurabilityOptions::default()).unwrap();
        assert_eq!(reopened.read_document("docs", 1).unwrap(), Some(Value::Int(1)));
        assert_eq!(reopened.read_document("docs", 2).unwrap(), Some(Value::Int(2)));
        assert_eq!(reopened.read_document("docs", 3).unwrap(), None);
    }

    #[test]
    fn read_in_transaction_is_snapshot_isolated() {
        let dir = tempdir().unwrap();
        let mut store = WalStorage::open(
            InMemoryStorage::new(),
            dir.path().join("x.wal"),
            DurabilityOptions::default(),
        )
        .unwrap();
        store.write_document("t", 1, Value::Int(1)).unwrap();

        let txn = store.begin();
        assert_eq!(
            store.read_in_transaction(txn, "t", 1).unwrap(),
            Some(Value::Int(1))
        );

        // committed via the auto-commit path after the snapshot was taken
        store.write_document("t", 1, Value::Int(2)).unwrap();
        assert_eq!(
            store.read_in_transaction(txn, "t", 1).unwrap(),
            Some(Value::Int(1))
        );

        // the generic Storage trait path gives no such isolation
        assert_eq!(store.read_document("t", 1).unwrap(), Some(Value::Int(2)));

        store.rollback(txn).unwrap();
    }

    #[test]
    fn optimistic_reject_rejects_a_conflicting_explicit_transaction() {
        let dir = tempdir().unwrap();
        let mut options = DurabilityOptions::default();
        options.conflict_policy = ConflictPolicy::OptimisticReject;
        let mut store =
            WalStorage::open(InMemoryStorage::new(), dir.path().join("x.wal"), options).unwrap();
        store.write_document("t", 1, Value::Int(1)).unwrap();

        let txn = store.begin();
        assert_eq!(
            store.read_in_transaction(txn, "t", 1).unwrap(),
            Some(Value::Int(1))
        );

        // another writer commits a newer version while txn is still open
        store.write_document("t", 1, Value::Int(2)).unwrap();

        store
            .write_in_transaction(txn, "t", 1, Value::Int(3))
            .unwrap();
        let result = store.commit(txn);
        assert!(matches!(result, Err(Error::Conflict)));
        // the rejected write was never applied
        assert_eq!(store.read_document("t", 1).unwrap(), Some(Value::Int(2)));
    }

    #[test]
    fn optimistic_reject_allows_a_non_conflicting_explicit_transaction() {
        let dir = tempdir().unwrap();
        let mut options = DurabilityOptions::default();
        options.conflict_policy = ConflictPolicy::OptimisticReject;
        let mut store =
            WalStorage::open(InMemoryStorage::new(), dir.path().join("x.wal"), options).unwrap();

        let txn = store.begin();
        store
            .write_in_transaction(txn, "t", 1, Value::Int(1))
            .unwrap();
        store.commit(txn).unwrap();
        assert_eq!(store.read_document("t", 1).unwrap(), Some(Value::Int(1)));
    }
}
