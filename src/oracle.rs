/*!
The oracle hands out timestamps and decides transaction fate.

Reads get a snapshot timestamp of `next_ts - 1` and wait on the commit
watermark so every commit at or below that snapshot is already visible.
Commits serialize on a dedicated write lock, pass serializable-snapshot
conflict detection against the window of recently committed transactions,
and then receive a strictly increasing commit timestamp.

The committed-transaction window is garbage collected against the read
watermark: once no active read transaction can observe a committed
transaction in a conflict check, its fingerprint record is dropped. The same
read watermark doubles as the horizon below which compaction may discard
stale versions — every version above it may still be needed to serve some
active snapshot, and for each user key the newest version at or below it must
survive so later snapshots keep seeing a continuous history.
*/

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::txn::Txn;
use crate::watermark::Watermark;

/// A committed transaction's timestamp and write-set fingerprints, retained
/// while some active transaction might still conflict with it.
struct CommittedTxn {
    ts: u64,
    writes_fp: HashSet<u64>,
}

struct OracleState {
    /// The next timestamp to assign. Strictly monotone.
    next_ts: u64,

    /// The boundary used by the most recent committed-transaction cleanup.
    last_cleanup_ts: u64,

    committed_txns: Vec<CommittedTxn>,
}

/// Timestamp allocator and serializable-snapshot conflict detector.
pub(crate) struct Oracle {
    state: Mutex<OracleState>,

    /// Serializes commits so that transactions enter the commit pipeline in
    /// commit-timestamp order.
    pub(crate) write_lock: Mutex<()>,

    /// Tracks active read transactions; its frontier is the discard horizon.
    read_mark: Watermark,

    /// Tracks committing transactions; readers wait on it for visibility.
    commit_mark: Watermark,
}

/// Crate-only methods
impl Oracle {
    pub(crate) fn new() -> Oracle {
        Oracle {
            state: Mutex::new(OracleState {
                next_ts: 1,
                last_cleanup_ts: 0,
                committed_txns: vec![],
            }),
            write_lock: Mutex::new(()),
            read_mark: Watermark::new("read"),
            commit_mark: Watermark::new("commit"),
        }
    }

    /// Restore the oracle's horizon after recovery: every version at or
    /// below `max_version` is on disk and visible.
    pub(crate) fn recover(&self, max_version: u64) {
        if max_version == 0 {
            return;
        }

        let mut state = self.state.lock();
        state.next_ts = max_version + 1;
        drop(state);

        self.read_mark.begin(max_version);
        self.read_mark.done(max_version);
        self.commit_mark.begin(max_version);
        self.commit_mark.done(max_version);
    }

    /**
    Assign a read (snapshot) timestamp.

    Blocks until every commit at or below the snapshot has finished its
    write to the memtable, so the snapshot is complete when the caller
    starts reading.
    */
    pub(crate) fn read_ts(&self) -> u64 {
        let state = self.state.lock();
        let read_ts = state.next_ts - 1;
        self.read_mark.begin(read_ts);
        drop(state);

        if let Err(error) = self.commit_mark.wait_for_mark(read_ts, None) {
            panic!("failed waiting for commit mark at {read_ts}: {error}");
        }
        read_ts
    }

    /**
    Run conflict detection for `txn` and, if it passes, assign its commit
    timestamp.

    Returns `(0, true)` on conflict. On success the commit is registered
    with the commit watermark and the transaction's write fingerprints are
    recorded for later conflict checks. The caller must hold
    [`Oracle::write_lock`].
    */
    pub(crate) fn new_commit_ts(&self, txn: &mut Txn) -> (u64, bool) {
        let mut state = self.state.lock();

        if conflicts_with(&state.committed_txns, txn.read_ts, &txn.reads_fp) {
            return (0, true);
        }

        self.done_read_locked(txn);
        self.cleanup_committed_txns(&mut state);

        let ts = state.next_ts;
        state.next_ts += 1;
        self.commit_mark.begin(ts);

        state.committed_txns.push(CommittedTxn {
            ts,
            writes_fp: txn.writes_fp.clone(),
        });

        (ts, false)
    }

    /// Release the transaction's read mark exactly once.
    pub(crate) fn done_read(&self, txn: &mut Txn) {
        self.done_read_locked(txn);
    }

    /// Mark a commit's memtable writes as finished and visible.
    pub(crate) fn done_commit(&self, ts: u64) {
        self.commit_mark.done(ts);
    }

    /// The horizon at or below which compaction may discard stale versions.
    pub(crate) fn discard_at_or_below(&self) -> u64 {
        self.read_mark.done_until()
    }

    /// Stop both watermark coordinators.
    pub(crate) fn stop(&self) {
        self.read_mark.stop();
        self.commit_mark.stop();
    }
}

/// Private methods
impl Oracle {
    fn done_read_locked(&self, txn: &mut Txn) {
        if txn.done_read {
            return;
        }
        txn.done_read = true;
        self.read_mark.done(txn.read_ts);
    }

    /**
    Drop committed-transaction records that can no longer participate in any
    conflict check.

    # Panics

    The read watermark is monotone; a retreating boundary is an engine bug.
    */
    fn cleanup_committed_txns(&self, state: &mut OracleState) {
        let max_read_ts = self.read_mark.done_until();

        assert!(
            max_read_ts >= state.last_cleanup_ts,
            "cleanup boundary must be monotone increasing"
        );
        if max_read_ts == state.last_cleanup_ts {
            return;
        }
        state.last_cleanup_ts = max_read_ts;

        state.committed_txns.retain(|committed| committed.ts > max_read_ts);
    }
}

/// True iff any committed transaction newer than `read_ts` wrote a key that
/// the calling transaction read.
fn conflicts_with(committed_txns: &[CommittedTxn], read_ts: u64, reads_fp: &[u64]) -> bool {
    if reads_fp.is_empty() {
        // A transaction that observed nothing cannot have read stale data.
        return false;
    }

    committed_txns
        .iter()
        .filter(|committed| committed.ts > read_ts)
        .any(|committed| reads_fp.iter().any(|fp| committed.writes_fp.contains(fp)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn committed(ts: u64, fps: &[u64]) -> CommittedTxn {
        CommittedTxn {
            ts,
            writes_fp: fps.iter().copied().collect(),
        }
    }

    #[test]
    fn fresh_oracle_hands_out_read_ts_zero() {
        let oracle = Oracle::new();
        assert_eq!(oracle.read_ts(), 0);
        assert_eq!(oracle.discard_at_or_below(), 0);
        oracle.stop();
    }

    #[test]
    fn recover_advances_the_horizon() {
        let oracle = Oracle::new();
        oracle.recover(17);

        // The snapshot equals the recovered horizon and does not block.
        assert_eq!(oracle.read_ts(), 17);
        oracle.stop();
    }

    #[test]
    fn conflict_requires_overlap_and_recency() {
        let window = vec![committed(10, &[1, 2]), committed(20, &[3])];

        // Read at 5 overlapping fingerprint 3 conflicts with the commit at 20.
        assert!(conflicts_with(&window, 5, &[3]));

        // Same overlap but the reader's snapshot already includes ts 20.
        assert!(!conflicts_with(&window, 20, &[3]));

        // Recent commit but disjoint fingerprints.
        assert!(!conflicts_with(&window, 5, &[9]));

        // A transaction with no recorded reads never conflicts.
        assert!(!conflicts_with(&window, 0, &[]));
    }
}
