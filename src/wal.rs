/*!
The write-ahead log (WAL) persists writes to disk to enable recovery of
in-memory information in the event of a crash.

One log file exists per memtable generation. The file name encodes a
strictly monotone version, zero-padded so that lexicographic file-name order
equals chronological order. Versions come from a process-wide counter seeded
from the wall clock; the counter guarantees two logs created within the same
clock tick still order correctly.

# Serialization

Records are framed as:

1. A masked 32-bit checksum of the payload
1. The payload length as a 4-byte fixed-size integer
1. The payload: one [`Entry`] serialized with fixed-int `bincode`

A torn write leaves a partial record at the tail of the file. Recovery
validates the length and checksum of every record and drops the tail at the
first failure; this is a recoverable condition, not corruption of the
preceding records.
*/

use std::cmp::Ordering;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{SystemTime, UNIX_EPOCH};

use bincode::Options;
use crc::{Crc, CRC_32_ISCSI};
use integer_encoding::FixedInt;

use crate::errors::{MistDbError, MistDbResult};
use crate::types::Entry;
use crate::utils::crc::{mask_checksum, unmask_checksum};

/// Suffix for write-ahead log files.
pub(crate) const WAL_EXT: &str = "log";

/// The length of a record header: masked checksum plus payload length.
const HEADER_LENGTH_BYTES: usize = 4 + 4;

/// CRC calculator using the iSCSI polynomial.
const CRC_CALCULATOR: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Process-wide source of strictly increasing log versions.
static NEXT_VERSION: AtomicU64 = AtomicU64::new(0);

/// Return a version strictly greater than any returned before, seeded from
/// the wall clock so fresh processes sort after old files.
fn next_version() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0);

    let previous = NEXT_VERSION
        .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |last| {
            Some(std::cmp::max(now, last + 1))
        })
        .unwrap_or(0);

    std::cmp::max(now, previous + 1)
}

/// Handles all read and write activity for one log file.
#[derive(Debug)]
pub(crate) struct Wal {
    path: PathBuf,
    version: u64,
    file: File,
}

/// Crate-only methods
impl Wal {
    /// Create a new log file in `dir` and return a handle carrying its version.
    pub(crate) fn create(dir: &Path) -> MistDbResult<Wal> {
        let version = next_version();
        let path = dir.join(format!("{version:020}.{WAL_EXT}"));
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)?;

        log::debug!("created wal file at {:?}", path);
        Ok(Wal {
            path,
            version,
            file,
        })
    }

    /// Open an existing log file for read-then-extend.
    pub(crate) fn open(path: &Path) -> MistDbResult<Wal> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let version = Wal::parse_version(file_name).ok_or_else(|| {
            MistDbError::Corrupt(format!("wal file name {file_name:?} has no version"))
        })?;

        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Wal {
            path: path.to_path_buf(),
            version,
            file,
        })
    }

    /**
    Append entries to the log.

    All entries are framed into one buffer and written with a single append,
    then synced so the records survive a process crash.
    */
    pub(crate) fn write(&mut self, entries: &[Entry]) -> MistDbResult<()> {
        let mut buffer = vec![];
        for entry in entries {
            let payload = bincode::DefaultOptions::new()
                .with_fixint_encoding()
                .serialize(entry)
                .map_err(|error| {
                    MistDbError::Corrupt(format!("failed to serialize wal entry: {error}"))
                })?;

            let checksum = mask_checksum(CRC_CALCULATOR.checksum(&payload));
            buffer.extend_from_slice(&checksum.encode_fixed_vec());
            buffer.extend_from_slice(&(payload.len() as u32).encode_fixed_vec());
            buffer.extend_from_slice(&payload);
        }

        self.file.write_all(&buffer)?;
        self.file.sync_data()?;
        Ok(())
    }

    /**
    Read back every entry in append order.

    A truncated or checksum-failing tail is dropped with a warning; entries
    before it are returned.
    */
    pub(crate) fn read(&self) -> MistDbResult<Vec<Entry>> {
        let data = fs::read(&self.path)?;
        let mut entries = vec![];
        let mut offset = 0;

        while data.len() - offset >= HEADER_LENGTH_BYTES {
            let masked_checksum = u32::decode_fixed(&data[offset..offset + 4]);
            let length = u32::decode_fixed(&data[offset + 4..offset + 8]) as usize;
            let payload_start = offset + HEADER_LENGTH_BYTES;

            if data.len() - payload_start < length {
                log::warn!(
                    "wal {:?}: truncated record at offset {}, dropping tail",
                    self.path,
                    offset
                );
                return Ok(entries);
            }

            let payload = &data[payload_start..payload_start + length];
            if CRC_CALCULATOR.checksum(payload) != unmask_checksum(masked_checksum) {
                log::warn!(
                    "wal {:?}: checksum mismatch at offset {}, dropping tail",
                    self.path,
                    offset
                );
                return Ok(entries);
            }

            let entry: Entry = bincode::DefaultOptions::new()
                .with_fixint_encoding()
                .deserialize(payload)
                .map_err(|error| {
                    MistDbError::Corrupt(format!(
                        "wal {:?}: undecodable record at offset {offset}: {error}",
                        self.path
                    ))
                })?;

            entries.push(entry);
            offset = payload_start + length;
        }

        if offset < data.len() {
            log::warn!(
                "wal {:?}: {} trailing bytes after last full record, dropping",
                self.path,
                data.len() - offset
            );
        }

        Ok(entries)
    }

    /// Sync and close out the current file, and create a fresh log with a
    /// strictly greater version in the same directory.
    pub(crate) fn reset(&mut self) -> MistDbResult<Wal> {
        self.close()?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        Wal::create(dir)
    }

    /// Flush the file to durable storage. The handle may still be deleted
    /// afterwards.
    pub(crate) fn close(&mut self) -> MistDbResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Remove the log file from disk.
    pub(crate) fn delete(&self) -> MistDbResult<()> {
        fs::remove_file(&self.path)?;
        log::debug!("deleted wal file at {:?}", self.path);
        Ok(())
    }

    /// The version encoded in this log's file name.
    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    /// Total order on log versions; lower versions are chronologically older.
    pub(crate) fn compare_version(a: u64, b: u64) -> Ordering {
        a.cmp(&b)
    }

    /// Parse the version out of a log file name like `00000000000000000042.log`.
    pub(crate) fn parse_version(file_name: &str) -> Option<u64> {
        file_name
            .strip_suffix(&format!(".{WAL_EXT}"))
            .and_then(|stem| stem.parse::<u64>().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    fn sample_entries() -> Vec<Entry> {
        vec![
            Entry::new(b"hello@1".to_vec(), b"world".to_vec(), false, 1),
            Entry::new(b"foo@2".to_vec(), vec![], true, 2),
            Entry::new(b"mist@3".to_vec(), b"db".to_vec(), false, 3),
        ]
    }

    #[test]
    fn create_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::create(dir.path()).unwrap();

        let entries = sample_entries();
        wal.write(&entries).unwrap();

        assert_eq!(wal.read().unwrap(), entries);
    }

    #[test]
    fn appends_accumulate_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::create(dir.path()).unwrap();

        let entries = sample_entries();
        for entry in &entries {
            wal.write(std::slice::from_ref(entry)).unwrap();
        }

        assert_eq!(wal.read().unwrap(), entries);
    }

    #[test]
    fn truncated_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::create(dir.path()).unwrap();
        let entries = sample_entries();
        wal.write(&entries).unwrap();

        // Simulate a torn write: a header promising more bytes than exist.
        let mut file = OpenOptions::new().append(true).open(&wal.path).unwrap();
        file.write_all(&[0xab, 0xcd, 0xef, 0x01, 0xff, 0x00, 0x00, 0x00])
            .unwrap();
        file.sync_all().unwrap();

        assert_eq!(wal.read().unwrap(), entries);
    }

    #[test]
    fn corrupt_tail_checksum_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::create(dir.path()).unwrap();
        let entries = sample_entries();
        wal.write(&entries).unwrap();

        let mut data = fs::read(&wal.path).unwrap();
        // Flip a bit in the last record's payload.
        let last = data.len() - 1;
        data[last] ^= 0x80;
        fs::write(&wal.path, &data).unwrap();

        let recovered = wal.read().unwrap();
        assert_eq!(recovered, entries[..entries.len() - 1].to_vec());
    }

    #[test]
    fn reset_rolls_to_a_strictly_greater_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::create(dir.path()).unwrap();
        let old_version = wal.version();
        let old_path = wal.path.clone();

        let fresh = wal.reset().unwrap();
        assert!(fresh.version() > old_version);
        assert!(old_path.exists());
        assert_eq!(fresh.read().unwrap(), vec![]);
    }

    #[test]
    fn delete_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::create(dir.path()).unwrap();
        let path = wal.path.clone();

        wal.delete().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn file_names_sort_chronologically() {
        let dir = tempfile::tempdir().unwrap();
        let first = Wal::create(dir.path()).unwrap();
        let second = Wal::create(dir.path()).unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        assert_eq!(
            Wal::parse_version(&names[0]).unwrap(),
            first.version()
        );
        assert_eq!(
            Wal::parse_version(&names[1]).unwrap(),
            second.version()
        );
        assert_eq!(
            Wal::compare_version(first.version(), second.version()),
            Ordering::Less
        );
    }
}
