//! Unified error type for bmdb.
//!
//! Every subsystem crate (codec, btree, storage, wal, query, table, schema)
//! defines local error detail where useful and converts into this type at
//! its public boundary, so storage-layer errors flow up into one type
//! callers can match on.

use thiserror::Error;

/// Result alias used across the workspace's public APIs.
pub type Result<T> = std::result::Result<T, Error>;

/// The unified bmdb error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Schema validation failed for a field.
    #[error("validation failed at {path}: {reason}")]
    Validation {
        /// Dotted path of the offending field.
        path: String,
        /// Human-readable reason.
        reason: String,
    },

    /// A single-field unique or primary-key constraint was violated.
    #[error("unique constraint violated on field {field:?}: value {value}")]
    UniqueConstraint {
        /// The field name.
        field: String,
        /// The colliding value, formatted for display.
        value: String,
    },

    /// A compound-unique constraint was violated.
    #[error("compound unique constraint {group_name:?} violated on fields {fields:?}")]
    CompoundUnique {
        /// The constraint's name.
        group_name: String,
        /// The fields in the compound group.
        fields: Vec<String>,
        /// The colliding values, formatted for display, in field order.
        values: Vec<String>,
    },

    /// A foreign-key reference pointed at a non-existent parent row.
    #[error(
        "foreign key violation: {child_table}.{child_field} references missing parent {value}"
    )]
    ForeignKey {
        /// The child table name.
        child_table: String,
        /// The child field name.
        child_field: String,
        /// The missing parent key, formatted for display.
        value: String,
    },

    /// Insert supplied an explicit doc id that already exists in the table.
    #[error("duplicate document id: {doc_id}")]
    DuplicateDocId {
        /// The colliding id.
        doc_id: u64,
    },

    /// On-disk data failed a structural check (bad magic, length, or
    /// truncated node/record).
    #[error("corruption in {location}: {detail}")]
    Corruption {
        /// Where the corruption was detected (e.g. "file header", "btree node@123").
        location: String,
        /// Detail message.
        detail: String,
    },

    /// Advisory file-lock acquisition exceeded its configured timeout.
    #[error("lock timeout acquiring {path}")]
    LockTimeout {
        /// Path of the file that could not be locked.
        path: String,
    },

    /// Underlying I/O failure.
    #[error("I/O error during {op}: {cause}")]
    Io {
        /// The operation being attempted (e.g. "open", "fsync").
        op: String,
        /// The underlying error.
        #[source]
        cause: std::io::Error,
    },

    /// A codec or format feature the core does not support.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Two concurrent writers conflicted under optimistic-reject policy.
    #[error("transaction conflict: read set overlaps a later commit")]
    Conflict,

    /// Generic invalid-operation error for cases with no dedicated variant (e.g.
    /// `upsert` matching more than one document).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    /// Wrap an I/O error with the operation that triggered it.
    pub fn io(op: impl Into<String>, cause: std::io::Error) -> Self {
        Error::Io {
            op: op.into(),
            cause,
        }
    }

    /// Map to the process exit codes a CLI host should use.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation { .. } => 2,
            Error::UniqueConstraint { .. } | Error::CompoundUnique { .. } => 3,
            Error::ForeignKey { .. } => 4,
            Error::Corruption { .. } => 5,
            Error::LockTimeout { .. } => 6,
            Error::Io { .. } => 7,
            Error::DuplicateDocId { .. }
            | Error::Unsupported(_)
            | Error::Conflict
            | Error::InvalidOperation(_) => 1,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(cause: std::io::Error) -> Self {
        Error::Io {
            op: "unspecified".into(),
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_variant() {
        assert_eq!(
            Error::Validation {
                path: "x".into(),
                reason: "y".into()
            }
            .exit_code(),
            2
        );
        assert_eq!(
            Error::UniqueConstraint {
                field: "f".into(),
                value: "v".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(
            Error::ForeignKey {
                child_table: "c".into(),
                child_field: "f".into(),
                value: "v".into()
            }
            .exit_code(),
            4
        );
        assert_eq!(
            Error::Corruption {
                location: "l".into(),
                detail: "d".into()
            }
            .exit_code(),
            5
        );
        assert_eq!(Error::LockTimeout { path: "p".into() }.exit_code(), 6);
        assert_eq!(Error::DuplicateDocId { doc_id: 1 }.exit_code(), 1);
    }
}
