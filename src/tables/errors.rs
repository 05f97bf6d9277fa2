//! Error types for reading and building table files.

use std::fmt;
use std::io;

/// Alias for a [`Result`] that wraps a [`TableError`].
pub(crate) type TableResult<T> = Result<T, TableError>;

/// Errors encountered while encoding or decoding table files.
#[derive(Debug)]
pub(crate) enum TableError {
    /// The footer magic did not match; the file is not a table file.
    InvalidMagic,

    /// The block contents could not be parsed.
    Corrupt(String),

    /// Variant for errors stemming from I/O operations.
    Io(io::Error),
}

impl std::error::Error for TableError {}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::InvalidMagic => write!(f, "invalid magic, not a table file"),
            TableError::Corrupt(reason) => write!(f, "corrupt table block: {}", reason),
            TableError::Io(base_err) => write!(f, "{}", base_err),
        }
    }
}

impl From<io::Error> for TableError {
    fn from(err: io::Error) -> Self {
        TableError::Io(err)
    }
}
