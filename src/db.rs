/*!
The database facade: opening and recovery, transaction entry points, the
scan path, and the background flush worker.

A database owns exactly one directory. On open, the engine replays any
write-ahead logs left behind by a previous incarnation into a fresh memtable,
rebuilds the level manager's handles from the table files on disk, and
restores the oracle's timestamp horizon to one past the largest version found
in either place.

Writes flow through transactions into the current memtable. Once the
memtable's estimated size crosses the configured threshold it is frozen,
pushed onto a bounded flush queue, and replaced; a dedicated worker thread
turns frozen memtables into level-0 tables, deletes their logs, and triggers
compaction. The bounded queue is what throttles writers when flushing falls
behind.
*/

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::errors::{MistDbError, MistDbResult};
use crate::key;
use crate::kway;
use crate::levels::LevelManager;
use crate::memtable::Memtable;
use crate::oracle::Oracle;
use crate::txn::Txn;
use crate::types::{Entry, KV};
use crate::utils::bufferpool::BufferPool;

/// Name of the background flush worker thread.
const FLUSH_THREAD_NAME: &str = "mistdb-flush";

/// The lifecycle state of a database.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    /// The database is recovering and not yet serving requests.
    Initialize = 1,
    /// The database is serving requests.
    Opened,
    /// The database has been closed and is terminal.
    Closed,
}

impl From<u8> for State {
    fn from(value: u8) -> Self {
        match value {
            1 => State::Initialize,
            2 => State::Opened,
            _ => State::Closed,
        }
    }
}

/// Tasks handled by the flush worker.
enum WorkerTask {
    /// Flush a frozen memtable to level 0 and run the compaction check.
    Flush(Arc<Memtable>),

    /// Drain and shut down. Queued flushes are processed first.
    Terminate,
}

/// The mutable core: the live memtable and the queue of frozen ones.
struct DbCore {
    memtable: Arc<Memtable>,

    /// Frozen memtables awaiting flush, oldest first. Shared with readers
    /// until the worker drains them.
    immutables: VecDeque<Arc<Memtable>>,
}

/// An embedded ordered key-value store with snapshot-isolated transactions.
pub struct DB {
    inner: Arc<DbInner>,
}

pub(crate) struct DbInner {
    config: Config,
    dir: PathBuf,
    state: AtomicU8,

    core: RwLock<DbCore>,
    manager: Arc<LevelManager>,
    pub(crate) oracle: Arc<Oracle>,

    flush_sender: SyncSender<WorkerTask>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Public methods
impl DB {
    /**
    Open (creating if necessary) the database rooted at `dir`.

    Non-positive config fields fall back to their defaults. Recovery replays
    leftover write-ahead logs, rebuilds the level handles, and restores the
    oracle so that new commits are stamped above everything already on disk.
    */
    pub fn open<P: AsRef<Path>>(dir: P, mut config: Config) -> MistDbResult<DB> {
        config.validate();
        let dir = dir.as_ref().to_path_buf();
        create_db_dir(&dir, config.file_mode)?;

        let pool = Arc::new(BufferPool::new());

        let memtable = Memtable::new(&dir, config.skiplist_max_level, config.skiplist_p)?;
        let wal_max_version = memtable.recover()?;

        let manager = Arc::new(LevelManager::new(
            &dir,
            config.l0_target_num,
            config.level_ratio,
            config.data_block_byte_threshold,
            pool,
        ));
        let table_max_version = manager.recover()?;

        let oracle = Arc::new(Oracle::new());
        oracle.recover(wal_max_version.max(table_max_version));

        let (flush_sender, flush_receiver) = mpsc::sync_channel(config.immutable_buffer);

        let inner = Arc::new(DbInner {
            config,
            dir,
            state: AtomicU8::new(State::Initialize as u8),
            core: RwLock::new(DbCore {
                memtable: Arc::new(memtable),
                immutables: VecDeque::new(),
            }),
            manager,
            oracle,
            flush_sender,
            worker: Mutex::new(None),
        });

        let worker_inner = Arc::clone(&inner);
        let worker = thread::Builder::new()
            .name(FLUSH_THREAD_NAME.to_string())
            .spawn(move || run_flush_worker(worker_inner, flush_receiver))?;
        *inner.worker.lock() = Some(worker);

        inner.state.store(State::Opened as u8, Ordering::Release);
        log::info!("database opened at {:?}", inner.dir);
        Ok(DB { inner })
    }

    /**
    Close the database.

    Signals the worker, flushes the live memtable (or just deletes its empty
    log), waits for queued flushes to drain, and stops the oracle. The
    database is terminal afterwards; `view`/`update` return
    [`MistDbError::DBClosed`].
    */
    pub fn close(&self) -> MistDbResult<()> {
        if self.state() == State::Closed {
            return Ok(());
        }

        // The worker drains every queued flush before it sees the terminate
        // message; joining it first keeps level-0 ordinals in age order when
        // the live memtable is flushed below.
        let _ = self.inner.flush_sender.send(WorkerTask::Terminate);
        if let Some(worker) = self.inner.worker.lock().take() {
            let _ = worker.join();
        }

        let memtable = Arc::clone(&self.inner.core.read().memtable);
        memtable.freeze();
        if memtable.size() > 0 {
            self.inner.manager.flush_to_l0(memtable.all())?;
        }
        memtable.delete_wal()?;

        self.inner.oracle.stop();

        self.inner.state.store(State::Closed as u8, Ordering::Release);
        log::info!("database closed at {:?}", self.inner.dir);
        Ok(())
    }

    /// The database's lifecycle state.
    pub fn state(&self) -> State {
        State::from(self.inner.state.load(Ordering::Acquire))
    }

    /// Begin a transaction. Pass `update = true` for a read-write
    /// transaction.
    pub fn begin(&self, update: bool) -> MistDbResult<Txn> {
        if self.state() != State::Opened {
            return Err(MistDbError::DBClosed);
        }
        Ok(Txn::new(Arc::clone(&self.inner), update))
    }

    /// Run `f` in a read-only transaction, discarding it on return.
    pub fn view<F>(&self, f: F) -> MistDbResult<()>
    where
        F: FnOnce(&mut Txn) -> MistDbResult<()>,
    {
        let mut txn = self.begin(false)?;
        let result = f(&mut txn);
        txn.discard();
        result
    }

    /// Run `f` in a read-write transaction; commit if `f` succeeds. The
    /// transaction is discarded on return in every case.
    pub fn update<F>(&self, f: F) -> MistDbResult<()>
    where
        F: FnOnce(&mut Txn) -> MistDbResult<()>,
    {
        let mut txn = self.begin(true)?;
        let result = f(&mut txn).and_then(|()| txn.commit());
        txn.discard();
        result
    }

    /**
    Scan the user-key range `[start, end)` across the whole tree.

    Returns the newest live value per user key; deleted keys are absent.
    */
    pub fn scan(&self, start: &[u8], end: &[u8]) -> Vec<KV> {
        let core = self.inner.core.read();

        // Merge input is ordered oldest source first: tables, then frozen
        // memtables oldest to newest, then the live memtable.
        let mut streams = vec![self.inner.manager.scan(start, end)];
        for immutable in core.immutables.iter() {
            streams.push(immutable.scan(start, end));
        }
        streams.push(core.memtable.scan(start, end));
        drop(core);

        let merged = kway::merge(streams);

        // The comparator puts the newest version of each user key first; a
        // user key whose newest version is a tombstone is deleted and its
        // older versions are skipped with it.
        let mut result: Vec<KV> = vec![];
        let mut last_user_key: Option<Vec<u8>> = None;
        for entry in merged {
            let user_key = key::parse_key(&entry.key).to_vec();
            if last_user_key.as_deref() == Some(user_key.as_slice()) {
                continue;
            }
            if !entry.tombstone {
                result.push(KV {
                    key: user_key.clone(),
                    value: entry.value,
                });
            }
            last_user_key = Some(user_key);
        }
        result
    }
}

/// Crate-only methods
impl DbInner {
    /**
    Look up `user_key` at snapshot `read_ts`.

    Each source is consulted newest-first — live memtable, frozen memtables,
    then the levels — with a lower-bound search on `user_key@read_ts`; the
    first source holding any version of the user key at or below the
    snapshot answers. A tombstone answer means "deleted at this snapshot"
    and is returned as-is for the caller to interpret.
    */
    pub(crate) fn get_at(&self, user_key: &[u8], read_ts: u64) -> Option<Entry> {
        let lookup_key = key::key_with_ts(user_key, read_ts);
        let core = self.core.read();

        if let Some(entry) = core.memtable.lower_bound(&lookup_key) {
            if key::is_same_key(&entry.key, &lookup_key) {
                return Some(entry);
            }
        }

        for immutable in core.immutables.iter().rev() {
            if let Some(entry) = immutable.lower_bound(&lookup_key) {
                if key::is_same_key(&entry.key, &lookup_key) {
                    return Some(entry);
                }
            }
        }

        let entry = self.manager.search_lower_bound(&lookup_key)?;
        if key::is_same_key(&entry.key, &lookup_key) {
            return Some(entry);
        }
        None
    }

    /**
    Insert a committed entry into the live memtable, rotating the memtable
    when it crosses the flush threshold.

    Called with the oracle's write lock held, so entries land in
    commit-timestamp order.

    # Panics

    Rolling to a fresh write-ahead log must succeed; the engine cannot
    accept writes without one.
    */
    pub(crate) fn rawset(&self, entry: Entry) {
        let mut core = self.core.write();
        core.memtable.set(entry);

        if core.memtable.size() < self.config.memtable_byte_threshold {
            return;
        }

        core.memtable.freeze();
        let frozen = Arc::clone(&core.memtable);
        core.immutables.push_back(Arc::clone(&frozen));

        let fresh = match core.memtable.reset() {
            Ok(fresh) => fresh,
            Err(error) => {
                log::error!("failed to roll the write-ahead log: {error}");
                panic!("failed to roll the write-ahead log: {error}");
            }
        };
        core.memtable = Arc::new(fresh);
        drop(core);

        // Blocking send: a full queue throttles committers until the worker
        // catches up. The core lock is already released.
        let _ = self.flush_sender.send(WorkerTask::Flush(frozen));
    }
}

/// The background flush loop: turn frozen memtables into level-0 tables,
/// delete their logs, and keep the levels balanced.
fn run_flush_worker(inner: Arc<DbInner>, receiver: Receiver<WorkerTask>) {
    log::info!("flush worker started");

    while let Ok(task) = receiver.recv() {
        match task {
            WorkerTask::Flush(immutable) => {
                flush_immutable(&inner, &immutable);

                let horizon = inner.oracle.discard_at_or_below();
                if let Err(error) = inner.manager.check_and_compact(horizon) {
                    log::error!("compaction failed: {error}");
                    panic!("compaction failed: {error}");
                }

                inner.core.write().immutables.pop_front();
            }
            WorkerTask::Terminate => break,
        }
    }

    log::info!("flush worker stopped");
}

/// Flush one frozen memtable to level 0 and delete its write-ahead log.
///
/// # Panics
///
/// Failures here abort: a flush that cannot persist its table or clean up
/// its log leaves the engine with no consistent state to continue from.
fn flush_immutable(inner: &DbInner, immutable: &Memtable) {
    if let Err(error) = inner.manager.flush_to_l0(immutable.all()) {
        log::error!("failed to flush immutable memtable: {error}");
        panic!("failed to flush immutable memtable: {error}");
    }
    if let Err(error) = immutable.delete_wal() {
        log::error!("failed to delete immutable wal file: {error}");
        panic!("failed to delete immutable wal file: {error}");
    }
}

/// Create the database directory with the configured permissions.
fn create_db_dir(dir: &Path, file_mode: u32) -> MistDbResult<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(file_mode);
    }
    #[cfg(not(unix))]
    let _ = file_mode;

    builder.create(dir).map_err(MistDbError::MkDir)
}
