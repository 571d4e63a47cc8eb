//! Write-ahead log, group commit, advisory locking, and crash recovery.
//!
//! [`WalStorage`] wraps any [`bmdb_storage::Storage`] backend: every
//! mutating call is logged to a [`wal::WalFile`] as one transaction before
//! being applied, and the WAL (plus the inner store) is fsynced in
//! batches rather than on every call. On open, [`WalStorage::open`]
//! replays any committed-but-unflushed transactions left behind by a
//! crash. Callers that need multiple writes to share one transaction
//! instead of one-shot auto-commit can drive it explicitly with
//! [`WalStorage::begin`]/`write_in_transaction`/`delete_in_transaction`/
//! `commit`/`rollback`.

#![warn(missing_docs)]

mod lock;
mod wal;
mod wal_storage;

pub use lock::FileLock;
pub use wal::{Record, WalFile, WalOp};
pub use wal_storage::{DurabilityOptions, WalStorage};
