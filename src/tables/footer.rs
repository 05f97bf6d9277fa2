/*!
The fixed-size footer at the end of every table file.

The footer is the entry point for reading a table: it locates the meta and
index blocks and carries the magic number that identifies the file as a
table file at all.
*/

use crate::utils::io::{ErrorReader, ErrorWriter};

use super::errors::{TableError, TableResult};
use super::BlockHandle;

/// The fixed size of a footer: two block handles of 16 bytes plus the magic.
pub(crate) const SIZE_OF_FOOTER_BYTES: usize = 16 + 16 + 8;

/**
The table file magic number.

Derived from the leading 64 bits of a SHA-1 digest; any file whose trailing
8 bytes differ from this value is rejected as not-a-table.
*/
pub(crate) const TABLE_MAGIC_NUMBER: u64 = 0x5bc2aa5766250562;

/**
A table file's footer.

# Serialization

All fields are fixed-width little-endian:

1. Meta block offset and length
1. Index block offset and length
1. The magic number
*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Footer {
    pub(crate) meta_block: BlockHandle,
    pub(crate) index_block: BlockHandle,
}

/// Crate-only methods
impl Footer {
    pub(crate) fn new(meta_block: BlockHandle, index_block: BlockHandle) -> Self {
        Self {
            meta_block,
            index_block,
        }
    }

    /// Serialize the footer into exactly [`SIZE_OF_FOOTER_BYTES`] bytes.
    pub(crate) fn encode(&self) -> TableResult<Vec<u8>> {
        let mut writer = ErrorWriter::new(Vec::with_capacity(SIZE_OF_FOOTER_BYTES));
        writer.write_fixed(self.meta_block.offset);
        writer.write_fixed(self.meta_block.length);
        writer.write_fixed(self.index_block.offset);
        writer.write_fixed(self.index_block.length);
        writer.write_fixed(TABLE_MAGIC_NUMBER);

        let buffer = writer.finish()?;
        debug_assert_eq!(buffer.len(), SIZE_OF_FOOTER_BYTES);
        Ok(buffer)
    }

    /// Parse a footer, rejecting buffers of the wrong size or magic.
    pub(crate) fn decode(data: &[u8]) -> TableResult<Footer> {
        if data.len() != SIZE_OF_FOOTER_BYTES {
            return Err(TableError::Corrupt(format!(
                "footer must be {SIZE_OF_FOOTER_BYTES} bytes, got {}",
                data.len()
            )));
        }

        let mut reader = ErrorReader::new(data);
        let meta_offset: u64 = reader.read_fixed();
        let meta_length: u64 = reader.read_fixed();
        let index_offset: u64 = reader.read_fixed();
        let index_length: u64 = reader.read_fixed();
        let magic: u64 = reader.read_fixed();
        reader
            .finish()
            .map_err(|error| TableError::Corrupt(format!("short footer: {error}")))?;

        if magic != TABLE_MAGIC_NUMBER {
            return Err(TableError::InvalidMagic);
        }

        Ok(Footer {
            meta_block: BlockHandle::new(meta_offset, meta_length),
            index_block: BlockHandle::new(index_offset, index_length),
        })
    }
}
