/*!
Data blocks hold the sorted entries of a table file.

# Serialization

Keys are prefix-compressed against the previous key in the block: each entry
stores only the suffix that differs, preceded by the length of the shared
prefix. Per entry the layout is

```text
u16 lcp | u16 suffix_len | suffix | u16 value_len | value | u8 tombstone | u64 version
```

with every integer little-endian. The first entry of a block has an `lcp` of
zero, so a block is self-contained. The encoded block is then passed through
the streaming compressor before being written to the file.
*/

use std::cmp::Ordering;

use crate::key;
use crate::types::Entry;
use crate::utils::bufferpool::BufferPool;
use crate::utils::compress::{compress, decompress};
use crate::utils::io::{ErrorReader, ErrorWriter};

use super::errors::{TableError, TableResult};

/// A decoded data block.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct DataBlock {
    pub(crate) entries: Vec<Entry>,
}

/// Crate-only methods
impl DataBlock {
    /// Binary-search for the entry whose versioned key equals `target`.
    pub(crate) fn search(&self, target: &[u8]) -> Option<Entry> {
        self.entries
            .binary_search_by(|entry| key::compare_keys(&entry.key, target))
            .ok()
            .map(|index| self.entries[index].clone())
    }

    /// Binary-search for the smallest entry whose versioned key is `>= target`.
    pub(crate) fn lower_bound(&self, target: &[u8]) -> Option<Entry> {
        let index = self
            .entries
            .partition_point(|entry| key::compare_keys(&entry.key, target) == Ordering::Less);
        self.entries.get(index).cloned()
    }

    /// Collect the entries with keys in `[start, end)`.
    pub(crate) fn scan(&self, start: &[u8], end: &[u8]) -> Vec<Entry> {
        let from = self
            .entries
            .partition_point(|entry| key::compare_keys(&entry.key, start) == Ordering::Less);

        self.entries[from..]
            .iter()
            .take_while(|entry| key::compare_keys(&entry.key, end) == Ordering::Less)
            .cloned()
            .collect()
    }

    /// Encode and compress the block.
    pub(crate) fn encode(&self, pool: &BufferPool) -> TableResult<Vec<u8>> {
        let mut writer = ErrorWriter::new(pool.get());

        let mut previous_key: &[u8] = &[];
        for entry in &self.entries {
            let lcp = longest_common_prefix(previous_key, &entry.key);
            let suffix = &entry.key[lcp..];

            writer.write_fixed(lcp as u16);
            writer.write_fixed(suffix.len() as u16);
            writer.write_bytes(suffix);
            writer.write_fixed(entry.value.len() as u16);
            writer.write_bytes(&entry.value);
            writer.write_bytes(&[entry.tombstone as u8]);
            writer.write_fixed(entry.version);

            previous_key = &entry.key;
        }

        let buffer = writer.finish()?;
        let mut compressed = vec![];
        compress(&buffer, &mut compressed)?;
        pool.put(buffer);
        Ok(compressed)
    }

    /// Decompress and decode a block.
    pub(crate) fn decode(data: &[u8], pool: &BufferPool) -> TableResult<DataBlock> {
        let mut buffer = pool.get();
        decompress(data, &mut buffer)?;

        let mut entries = vec![];
        let mut previous_key: Vec<u8> = vec![];
        {
            let mut reader = ErrorReader::new(buffer.as_slice());
            while reader.remaining() > 0 {
                let lcp = reader.read_fixed::<u16>() as usize;
                let suffix_len = reader.read_fixed::<u16>() as usize;
                let suffix = reader.read_bytes(suffix_len);
                let value_len = reader.read_fixed::<u16>() as usize;
                let value = reader.read_bytes(value_len);
                let tombstone = reader.read_bytes(1);
                let version = reader.read_fixed::<u64>();

                if let Some(error) = reader.error() {
                    return Err(TableError::Corrupt(format!(
                        "data block cut short mid-entry: {error}"
                    )));
                }
                if lcp > previous_key.len() {
                    return Err(TableError::Corrupt(format!(
                        "prefix length {lcp} exceeds previous key length {}",
                        previous_key.len()
                    )));
                }

                let mut entry_key = Vec::with_capacity(lcp + suffix.len());
                entry_key.extend_from_slice(&previous_key[..lcp]);
                entry_key.extend_from_slice(&suffix);
                previous_key = entry_key.clone();

                entries.push(Entry {
                    key: entry_key,
                    value,
                    tombstone: tombstone == [1],
                    version,
                });
            }
        }

        pool.put(buffer);
        Ok(DataBlock { entries })
    }
}

/// Length of the longest common prefix of two byte strings.
fn longest_common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
