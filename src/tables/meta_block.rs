//! The fixed-size meta block recording when a table was created and at which
//! level it was written. Stored uncompressed.

use crate::utils::io::{ErrorReader, ErrorWriter};

use super::errors::{TableError, TableResult};

/// The fixed size of an encoded meta block.
pub(crate) const SIZE_OF_META_BYTES: usize = 8 + 8;

/// A table file's meta block: `created_unix | level`, little-endian.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MetaBlock {
    /// Creation time as unix seconds.
    pub(crate) created_unix: i64,

    /// The level the table was written at.
    pub(crate) level: u64,
}

/// Crate-only methods
impl MetaBlock {
    pub(crate) fn encode(&self) -> TableResult<Vec<u8>> {
        let mut writer = ErrorWriter::new(Vec::with_capacity(SIZE_OF_META_BYTES));
        writer.write_fixed(self.created_unix);
        writer.write_fixed(self.level);
        Ok(writer.finish()?)
    }

    pub(crate) fn decode(data: &[u8]) -> TableResult<MetaBlock> {
        let mut reader = ErrorReader::new(data);
        let created_unix: i64 = reader.read_fixed();
        let level: u64 = reader.read_fixed();
        reader
            .finish()
            .map_err(|error| TableError::Corrupt(format!("short meta block: {error}")))?;

        Ok(MetaBlock {
            created_unix,
            level,
        })
    }
}
