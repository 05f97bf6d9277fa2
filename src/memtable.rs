/*!
The memtable is the mutable in-memory level fronting all reads and writes.

It bundles one skip list with one write-ahead log generation behind a
reader/writer lock. Writes insert into the skip list and then append to the
WAL; a WAL append failure is fatal because the write would otherwise be
acknowledged without durability.

A memtable is frozen exactly once when it crosses the flush threshold (or at
shutdown): freezing closes its WAL and marks it read-only. The frozen
memtable stays shared between foreground reads and the flush worker until the
worker has turned it into a level-0 table and deleted its WAL.
*/

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use parking_lot::RwLock;

use crate::errors::MistDbResult;
use crate::skiplist::SkipList;
use crate::types::Entry;
use crate::wal::{Wal, WAL_EXT};

/// A skip list + WAL bundle with a freeze/reset lifecycle.
pub(crate) struct Memtable {
    inner: RwLock<MemtableInner>,
    dir: PathBuf,
}

struct MemtableInner {
    skiplist: SkipList,
    wal: Wal,
    read_only: bool,
}

/// Crate-only methods
impl Memtable {
    /// Create a fresh memtable with a new WAL generation in `dir`.
    pub(crate) fn new(dir: &Path, max_level: usize, p: f64) -> MistDbResult<Memtable> {
        let wal = Wal::create(dir)?;
        Ok(Memtable {
            inner: RwLock::new(MemtableInner {
                skiplist: SkipList::new(max_level, p),
                wal,
                read_only: false,
            }),
            dir: dir.to_path_buf(),
        })
    }

    /**
    Replay WAL generations older than this memtable's own into the skip list,
    coalescing them into the current WAL and deleting the replayed files.

    Returns the maximum version observed among replayed entries; the DB uses
    it to restore the oracle's horizon.
    */
    pub(crate) fn recover(&self) -> MistDbResult<u64> {
        let start = Instant::now();
        let mut inner = self.inner.write();

        let mut wal_paths: Vec<PathBuf> = vec![];
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(WAL_EXT) {
                continue;
            }
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default();
            match Wal::parse_version(file_name) {
                Some(version)
                    if Wal::compare_version(version, inner.wal.version()).is_lt() =>
                {
                    wal_paths.push(path);
                }
                _ => {}
            }
        }

        if wal_paths.is_empty() {
            return Ok(0);
        }

        // File-name order is chronological order.
        wal_paths.sort();

        log::info!(
            "found {} wal file(s), starting memtable recovery",
            wal_paths.len()
        );
        let mut max_version = 0;
        for path in wal_paths {
            let old_wal = Wal::open(&path)?;
            let entries = old_wal.read()?;
            for entry in entries {
                max_version = max_version.max(entry.version);
                inner.skiplist.set(entry.clone());
                inner.wal.write(std::slice::from_ref(&entry))?;
            }
            old_wal.delete()?;
        }

        log::info!(
            "memtable recovery finished, elapsed: {:?}",
            start.elapsed()
        );
        Ok(max_version)
    }

    /**
    Insert an entry, appending it to the WAL for durability.

    # Panics

    Panics if the WAL append fails: the engine cannot continue after losing
    durability for an acknowledged write. Also panics if called on a frozen
    memtable, which is a lifecycle bug.
    */
    pub(crate) fn set(&self, entry: Entry) {
        let mut inner = self.inner.write();
        assert!(!inner.read_only, "attempted to write to a frozen memtable");

        inner.skiplist.set(entry.clone());
        if let Err(error) = inner.wal.write(std::slice::from_ref(&entry)) {
            log::error!("wal write failed: {error}");
            panic!("wal write failed: {error}");
        }
    }

    /// Get the entry whose versioned key equals `key`.
    pub(crate) fn get(&self, key: &[u8]) -> Option<Entry> {
        self.inner.read().skiplist.get(key)
    }

    /// Get the smallest entry with versioned key `>= key`.
    pub(crate) fn lower_bound(&self, key: &[u8]) -> Option<Entry> {
        self.inner.read().skiplist.lower_bound(key)
    }

    /// Collect the entries with keys in `[start, end)`.
    pub(crate) fn scan(&self, start: &[u8], end: &[u8]) -> Vec<Entry> {
        self.inner.read().skiplist.scan(start, end)
    }

    /// Collect every entry in key order.
    pub(crate) fn all(&self) -> Vec<Entry> {
        self.inner.read().skiplist.all()
    }

    /// The estimated byte footprint of the skip list.
    pub(crate) fn size(&self) -> usize {
        self.inner.read().skiplist.size()
    }

    /**
    Freeze the memtable: close out the WAL and mark the table read-only.

    The frozen memtable keeps serving reads (shared through its `Arc`) until
    the flush worker drains it.

    # Panics

    Panics if the WAL cannot be synced; see [`Memtable::set`].
    */
    pub(crate) fn freeze(&self) {
        let mut inner = self.inner.write();
        if let Err(error) = inner.wal.close() {
            log::error!("wal close failed: {error}");
            panic!("wal close failed: {error}");
        }
        inner.read_only = true;
    }

    /// Roll the WAL to a new generation and return a fresh, empty memtable
    /// to take over writes. The old WAL file stays on disk until the frozen
    /// memtable is flushed.
    pub(crate) fn reset(&self) -> MistDbResult<Memtable> {
        let mut inner = self.inner.write();
        let fresh_wal = inner.wal.reset()?;

        Ok(Memtable {
            inner: RwLock::new(MemtableInner {
                skiplist: inner.skiplist.reset(),
                wal: fresh_wal,
                read_only: false,
            }),
            dir: self.dir.clone(),
        })
    }

    /// Delete this memtable's WAL file (the memtable has been flushed or is
    /// empty at shutdown).
    pub(crate) fn delete_wal(&self) -> MistDbResult<()> {
        self.inner.write().wal.delete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key;
    use pretty_assertions::assert_eq;

    fn entry(key: &[u8], value: &[u8]) -> Entry {
        Entry::new(key.to_vec(), value.to_vec(), false, key::parse_ts(key))
    }

    #[test]
    fn set_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let memtable = Memtable::new(dir.path(), 9, 0.5).unwrap();

        memtable.set(entry(b"hello@1", b"world"));
        assert_eq!(memtable.get(b"hello@1").unwrap().value, b"world");
        assert!(memtable.get(b"absent@1").is_none());
        assert!(memtable.size() > 0);
    }

    #[test]
    fn scan_and_all_are_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let memtable = Memtable::new(dir.path(), 9, 0.5).unwrap();

        for k in [b"c@1".as_slice(), b"a@1", b"b@1"] {
            memtable.set(entry(k, b"x"));
        }

        let keys: Vec<Vec<u8>> = memtable.all().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![b"a@1".to_vec(), b"b@1".to_vec(), b"c@1".to_vec()]);

        let scanned = memtable.scan(b"a", b"c");
        assert_eq!(scanned.len(), 2);
    }

    #[test]
    fn reset_rolls_to_an_empty_memtable() {
        let dir = tempfile::tempdir().unwrap();
        let memtable = Memtable::new(dir.path(), 9, 0.5).unwrap();
        memtable.set(entry(b"k@1", b"v"));
        memtable.freeze();

        let fresh = memtable.reset().unwrap();
        assert_eq!(fresh.size(), 0);
        assert!(fresh.all().is_empty());
        // The frozen memtable still serves reads.
        assert_eq!(memtable.get(b"k@1").unwrap().value, b"v");
    }

    #[test]
    fn recover_replays_older_generations() {
        let dir = tempfile::tempdir().unwrap();

        // Two abandoned WAL generations from a previous incarnation.
        let mut old = Wal::create(dir.path()).unwrap();
        old.write(&[
            entry(b"a@1", b"1"),
            entry(b"b@2", b"2"),
        ])
        .unwrap();
        let mut newer = old.reset().unwrap();
        newer
            .write(&[entry(b"b@4", b"rewritten"), entry(b"c@3", b"3")])
            .unwrap();

        let memtable = Memtable::new(dir.path(), 9, 0.5).unwrap();
        let max_version = memtable.recover().unwrap();

        assert_eq!(max_version, 4);
        assert_eq!(memtable.all().len(), 4);
        assert_eq!(memtable.get(b"b@4").unwrap().value, b"rewritten");

        // The replayed files are gone; only the live WAL remains.
        let remaining: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn recover_with_no_older_wals_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let memtable = Memtable::new(dir.path(), 9, 0.5).unwrap();
        assert_eq!(memtable.recover().unwrap(), 0);
        assert!(memtable.all().is_empty());
    }

    #[test]
    fn latest_write_per_versioned_key_wins_on_recovery() {
        let dir = tempfile::tempdir().unwrap();

        let mut old = Wal::create(dir.path()).unwrap();
        old.write(&[entry(b"k@7", b"first")]).unwrap();
        old.write(&[entry(b"k@7", b"second")]).unwrap();
        old.close().unwrap();

        let memtable = Memtable::new(dir.path(), 9, 0.5).unwrap();
        memtable.recover().unwrap();

        assert_eq!(memtable.get(b"k@7").unwrap().value, b"second");
        assert_eq!(memtable.all().len(), 1);
    }
}
