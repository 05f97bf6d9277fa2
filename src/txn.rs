/*!
Transactions under serializable snapshot isolation.

A transaction reads at the snapshot timestamp handed out by the oracle and
buffers its writes in memory, keyed by user key. Reads first consult the
transaction's own pending writes; reads that fall through to the snapshot
record a fingerprint of the key so the oracle can detect, at commit time,
whether a concurrent transaction rewrote something this one observed.

Commits are serialized by the oracle's write lock: conflict detection, commit
timestamp assignment, and the hand-off of stamped entries to the memtable all
happen before the next committer enters. Entries reach the memtable only
after a commit timestamp is assigned; recovery of transactions that were
mid-commit at a crash is an extension point and not implemented.
*/

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::db::DbInner;
use crate::errors::{MistDbError, MistDbResult};
use crate::key;
use crate::types::Entry;
use crate::utils::hash::fingerprint;

/// A transaction handle. Obtained from [`crate::DB::begin`] or the
/// [`crate::DB::view`] / [`crate::DB::update`] closures.
pub struct Txn {
    pub(crate) read_only: bool,
    pub(crate) discarded: bool,
    pub(crate) done_read: bool,

    pub(crate) db: Arc<DbInner>,

    pub(crate) read_ts: u64,
    pub(crate) commit_ts: u64,

    /// Fingerprints of keys read from the snapshot.
    pub(crate) reads_fp: Vec<u64>,

    /// Fingerprints of keys written by this transaction.
    pub(crate) writes_fp: HashSet<u64>,

    /// Buffered writes, keyed by user key.
    pub(crate) pending_writes: HashMap<Vec<u8>, Entry>,
}

/// Public methods
impl Txn {
    /**
    Get the value of `key` as of this transaction's snapshot.

    A writer that already wrote `key` in this transaction sees its own write;
    observing its own pending tombstone surfaces
    [`MistDbError::KeyNotFound`]. A key absent from the snapshot returns
    `Ok(None)`.
    */
    pub fn get(&mut self, key: &[u8]) -> MistDbResult<Option<Vec<u8>>> {
        if self.discarded {
            return Err(MistDbError::DiscardedTxn);
        }
        if key.is_empty() {
            return Err(MistDbError::EmptyKey);
        }

        if !self.read_only {
            if let Some(pending) = self.pending_writes.get(key) {
                // The transaction observes its own write; no read fingerprint
                // is recorded because it cannot conflict with anyone.
                if pending.tombstone {
                    return Err(MistDbError::KeyNotFound);
                }
                return Ok(Some(pending.value.clone()));
            }

            self.reads_fp.push(fingerprint(key));
        }

        match self.db.get_at(key, self.read_ts) {
            Some(entry) if !entry.tombstone => Ok(Some(entry.value)),
            _ => Ok(None),
        }
    }

    /// Buffer a write of `key = value`.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> MistDbResult<()> {
        self.set_entry(Entry::new(key.to_vec(), value.to_vec(), false, 0))
    }

    /// Buffer a deletion of `key`.
    pub fn delete(&mut self, key: &[u8]) -> MistDbResult<()> {
        self.set_entry(Entry::new(key.to_vec(), vec![], true, 0))
    }

    /// Buffer an entry. The entry's key is the plain user key; the version
    /// is assigned at commit time.
    pub fn set_entry(&mut self, entry: Entry) -> MistDbResult<()> {
        self.modify(entry)
    }

    /**
    Commit the transaction.

    A transaction with nothing to write discards itself and reports success.
    Otherwise the commit runs under the oracle's write lock: conflict
    detection, commit-timestamp assignment, stamping every buffered entry
    with the new timestamp, and handing them to the memtable. Returns
    [`MistDbError::ConflictTxn`] if a concurrent commit invalidated one of
    this transaction's reads; the caller is expected to retry.
    */
    pub fn commit(&mut self) -> MistDbResult<()> {
        if self.discarded {
            return Err(MistDbError::DiscardedTxn);
        }
        if self.pending_writes.is_empty() {
            self.discard();
            return Ok(());
        }

        let db = Arc::clone(&self.db);
        let write_guard = db.oracle.write_lock.lock();

        let (commit_ts, conflict) = db.oracle.new_commit_ts(self);
        if conflict {
            drop(write_guard);
            return Err(MistDbError::ConflictTxn);
        }
        self.commit_ts = commit_ts;

        for (user_key, mut entry) in std::mem::take(&mut self.pending_writes) {
            entry.key = key::key_with_ts(&user_key, commit_ts);
            entry.version = commit_ts;
            db.rawset(entry);
        }

        db.oracle.done_commit(commit_ts);
        drop(write_guard);
        Ok(())
    }

    /**
    Discard the transaction, releasing its snapshot.

    Idempotent; safe to call after a commit or a failed commit. Every
    transaction must end up discarded so the read watermark can advance.
    */
    pub fn discard(&mut self) {
        if self.discarded {
            return;
        }
        self.discarded = true;

        let db = Arc::clone(&self.db);
        db.oracle.done_read(self);
    }
}

/// Crate-only methods
impl Txn {
    pub(crate) fn new(db: Arc<DbInner>, update: bool) -> Txn {
        let read_ts = db.oracle.read_ts();
        Txn {
            read_only: !update,
            discarded: false,
            done_read: false,
            db,
            read_ts,
            commit_ts: 0,
            reads_fp: vec![],
            writes_fp: HashSet::new(),
            pending_writes: HashMap::new(),
        }
    }
}

/// Private methods
impl Txn {
    fn modify(&mut self, entry: Entry) -> MistDbResult<()> {
        if self.read_only {
            return Err(MistDbError::ReadOnlyTxn);
        }
        if self.discarded {
            return Err(MistDbError::DiscardedTxn);
        }
        if entry.key.is_empty() {
            return Err(MistDbError::EmptyKey);
        }

        self.writes_fp.insert(fingerprint(&entry.key));
        self.pending_writes.insert(entry.key.clone(), entry);
        Ok(())
    }
}
