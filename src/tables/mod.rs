/*!
Table files are the immutable on-disk runs of sorted entries (SSTables).

# Format

A table file is the concatenation, in order, of:

1. A series of data blocks, each individually stream-compressed
1. The meta block (uncompressed, fixed 16 bytes)
1. The index block (stream-compressed)
1. A fixed 40-byte footer locating the meta and index blocks

Data-block offsets recorded in the index are relative to the start of the
file, which is also the start of the data-block region.
*/

use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Entry;
use crate::utils::bufferpool::BufferPool;

pub(crate) mod data_block;
pub(crate) mod errors;
pub(crate) mod footer;
pub(crate) mod index_block;
pub(crate) mod meta_block;

pub(crate) use data_block::DataBlock;
pub(crate) use errors::{TableError, TableResult};
pub(crate) use footer::Footer;
pub(crate) use index_block::{IndexBlock, IndexEntry};
pub(crate) use meta_block::MetaBlock;

/// The offset and length of a block within a table file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct BlockHandle {
    pub(crate) offset: u64,
    pub(crate) length: u64,
}

impl BlockHandle {
    pub(crate) fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }
}

/**
Build a table file from a sorted stream of entries.

Entries are greedily packed into data blocks; a block is cut once its
accumulated entry size passes `data_block_size` (entries are never split
across blocks). Returns the decoded index — kept in memory by the level
manager — together with the raw file bytes.

# Panics

`entries` must be non-empty and sorted by the versioned-key comparator;
table building from nothing is a caller bug.
*/
pub(crate) fn build(
    entries: &[Entry],
    data_block_size: usize,
    level: u64,
    pool: &BufferPool,
) -> TableResult<(IndexBlock, Vec<u8>)> {
    assert!(
        !entries.is_empty(),
        "attempted to build a table file from zero entries"
    );

    // Pack entries into data blocks.
    let mut blocks: Vec<DataBlock> = vec![];
    let mut current = DataBlock::default();
    let mut current_size = 0_usize;
    for entry in entries {
        if current_size > data_block_size {
            blocks.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current_size += entry.key.len() + entry.value.len() + 1 + 8;
        current.entries.push(entry.clone());
    }
    if !current.entries.is_empty() {
        blocks.push(current);
    }

    // Encode the data blocks and build up the index.
    let mut file_bytes = pool.get();
    let mut index = IndexBlock::default();
    let mut offset = 0_u64;
    for block in &blocks {
        let encoded = block.encode(pool)?;
        let length = encoded.len() as u64;

        index.entries.push(IndexEntry {
            start_key: block.entries[0].key.clone(),
            end_key: block.entries[block.entries.len() - 1].key.clone(),
            handle: BlockHandle::new(offset, length),
        });

        file_bytes.extend_from_slice(&encoded);
        offset += length;
    }
    index.data_block = BlockHandle::new(0, offset);

    // Meta block.
    let meta = MetaBlock {
        created_unix: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or(0),
        level,
    };
    let meta_bytes = meta.encode()?;
    let meta_handle = BlockHandle::new(offset, meta_bytes.len() as u64);
    file_bytes.extend_from_slice(&meta_bytes);

    // Index block.
    let index_bytes = index.encode(pool)?;
    let index_handle = BlockHandle::new(
        meta_handle.offset + meta_handle.length,
        index_bytes.len() as u64,
    );
    file_bytes.extend_from_slice(&index_bytes);

    // Footer.
    let footer = Footer::new(meta_handle, index_handle);
    file_bytes.extend_from_slice(&footer.encode()?);

    let result = file_bytes.clone();
    pool.put(file_bytes);
    Ok((index, result))
}
