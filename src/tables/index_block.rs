/*!
The index block maps key ranges to data blocks.

The header is one [`BlockHandle`] covering the byte range of *all* data
blocks; the body holds one record per data block with that block's start key,
end key, and handle, sorted by start key. The encoded index is passed
through the streaming compressor like the data blocks.
*/

use std::cmp::Ordering;

use crate::key;
use crate::utils::bufferpool::BufferPool;
use crate::utils::compress::{compress, decompress};
use crate::utils::io::{ErrorReader, ErrorWriter};

use super::errors::{TableError, TableResult};
use super::BlockHandle;

/// The index record for a single data block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct IndexEntry {
    /// The first key in the data block.
    pub(crate) start_key: Vec<u8>,

    /// The last key in the data block.
    pub(crate) end_key: Vec<u8>,

    /// Offset and length of the data block within the data-block region.
    pub(crate) handle: BlockHandle,
}

/// A decoded index block.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct IndexBlock {
    /// Handle covering the byte range of all data blocks.
    pub(crate) data_block: BlockHandle,

    /// Per-data-block records, sorted by start key.
    pub(crate) entries: Vec<IndexEntry>,
}

/// Crate-only methods
impl IndexBlock {
    /**
    Locate the data block that can contain the smallest key `>= target`:
    the first block whose end key is at or past the target. For a target
    inside some block's `[start_key, end_key]` range this is that block; a
    target falling between two blocks routes to the later one, whose first
    key is the lower bound.

    Returns `None` when the index is empty or `target` is past the last
    block's end key.
    */
    pub(crate) fn search(&self, target: &[u8]) -> Option<BlockHandle> {
        let position = self
            .entries
            .partition_point(|entry| key::compare_keys(&entry.end_key, target) == Ordering::Less);
        self.entries.get(position).map(|entry| entry.handle.clone())
    }

    /// Collect the handles of every block whose `[start_key, end_key]` range
    /// overlaps `[start, end]`.
    pub(crate) fn scan(&self, start: &[u8], end: &[u8]) -> Vec<BlockHandle> {
        self.entries
            .iter()
            .filter(|entry| {
                key::compare_keys(&entry.end_key, start) != Ordering::Less
                    && key::compare_keys(&entry.start_key, end) != Ordering::Greater
            })
            .map(|entry| entry.handle.clone())
            .collect()
    }

    /// The key range `[start_key, end_key]` covered by the whole table.
    pub(crate) fn key_range(&self) -> Option<(&[u8], &[u8])> {
        let first = self.entries.first()?;
        let last = self.entries.last()?;
        Some((first.start_key.as_slice(), last.end_key.as_slice()))
    }

    /// Encode and compress the index block.
    pub(crate) fn encode(&self, pool: &BufferPool) -> TableResult<Vec<u8>> {
        let mut writer = ErrorWriter::new(pool.get());
        writer.write_fixed(self.data_block.offset);
        writer.write_fixed(self.data_block.length);

        for entry in &self.entries {
            writer.write_fixed(entry.start_key.len() as u16);
            writer.write_bytes(&entry.start_key);
            writer.write_fixed(entry.end_key.len() as u16);
            writer.write_bytes(&entry.end_key);
            writer.write_fixed(entry.handle.offset);
            writer.write_fixed(entry.handle.length);
        }

        let buffer = writer.finish()?;
        let mut compressed = vec![];
        compress(&buffer, &mut compressed)?;
        pool.put(buffer);
        Ok(compressed)
    }

    /// Decompress and decode an index block.
    pub(crate) fn decode(data: &[u8], pool: &BufferPool) -> TableResult<IndexBlock> {
        let mut buffer = pool.get();
        decompress(data, &mut buffer)?;

        let mut index = IndexBlock::default();
        {
            let mut reader = ErrorReader::new(buffer.as_slice());
            index.data_block.offset = reader.read_fixed();
            index.data_block.length = reader.read_fixed();

            while reader.remaining() > 0 {
                let start_key_len = reader.read_fixed::<u16>() as usize;
                let start_key = reader.read_bytes(start_key_len);
                let end_key_len = reader.read_fixed::<u16>() as usize;
                let end_key = reader.read_bytes(end_key_len);
                let offset: u64 = reader.read_fixed();
                let length: u64 = reader.read_fixed();

                if let Some(error) = reader.error() {
                    return Err(TableError::Corrupt(format!(
                        "index block cut short mid-record: {error}"
                    )));
                }

                index.entries.push(IndexEntry {
                    start_key,
                    end_key,
                    handle: BlockHandle::new(offset, length),
                });
            }
        }

        pool.put(buffer);
        Ok(index)
    }
}
