/*!
This module contains error types specific to MistDB as well as wrappers and
`From` implementations for common errors to enable error propagation.

Transaction-level errors ([`MistDbError::ConflictTxn`] in particular) are
recoverable and expected during normal operation; callers retry the
transaction. File-format and I/O errors on the background flush, compaction,
and WAL paths are not recoverable — those paths log and abort rather than
continue from a partial on-disk state.
*/

use std::fmt;
use std::io;

use crate::tables::errors::TableError;

/// Alias for a [`Result`] that wraps a [`MistDbError`].
pub type MistDbResult<T> = Result<T, MistDbError>;

/// Top-level database errors.
#[derive(Debug)]
pub enum MistDbError {
    /// Variant for writes attempted on a read-only transaction.
    ReadOnlyTxn,

    /// Variant for operations on a transaction that was already discarded.
    DiscardedTxn,

    /// Variant for commits rejected by serializable-snapshot conflict detection.
    ConflictTxn,

    /// Variant for operations given an empty user key.
    EmptyKey,

    /// Variant for reads that observed a deletion in the transaction's own
    /// pending writes.
    KeyNotFound,

    /// Variant for operations on a database that has been closed.
    DBClosed,

    /// Variant for failures creating the database directory.
    MkDir(io::Error),

    /// Variant for table files whose footer magic did not match.
    InvalidMagic,

    /// Variant for malformed on-disk data.
    Corrupt(String),

    /// Variant for errors stemming from I/O operations.
    Io(io::Error),
}

impl std::error::Error for MistDbError {}

impl fmt::Display for MistDbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MistDbError::ReadOnlyTxn => write!(f, "transaction is read-only"),
            MistDbError::DiscardedTxn => write!(f, "transaction has been discarded"),
            MistDbError::ConflictTxn => write!(f, "transaction conflict, please retry"),
            MistDbError::EmptyKey => write!(f, "key is empty"),
            MistDbError::KeyNotFound => write!(f, "key not found"),
            MistDbError::DBClosed => write!(f, "database is closed"),
            MistDbError::MkDir(base_err) => {
                write!(f, "failed to create database directory: {}", base_err)
            }
            MistDbError::InvalidMagic => write!(f, "invalid magic, not a table file"),
            MistDbError::Corrupt(reason) => write!(f, "corrupt data: {}", reason),
            MistDbError::Io(base_err) => write!(f, "{}", base_err),
        }
    }
}

impl From<io::Error> for MistDbError {
    fn from(err: io::Error) -> Self {
        MistDbError::Io(err)
    }
}

impl From<TableError> for MistDbError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::InvalidMagic => MistDbError::InvalidMagic,
            TableError::Corrupt(reason) => MistDbError::Corrupt(reason),
            TableError::Io(base_err) => MistDbError::Io(base_err),
        }
    }
}
