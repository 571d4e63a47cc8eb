//! MVCC version chains, transaction snapshots, and conflict resolution.
//!
//! Every document has a chain of committed versions keyed by the
//! [`TxId`] that wrote them. A [`Transaction`] reads through a fixed
//! snapshot and stages writes privately until [`Transaction::commit`]
//! applies them to an [`MvccIndex`], which enforces the configured
//! [`ConflictPolicy`].

#![warn(missing_docs)]

mod conflict;
mod transaction;
mod txid;

pub use conflict::ConflictPolicy;
pub use transaction::{MvccIndex, Transaction};
pub use txid::{TxId, TxIdGenerator};
