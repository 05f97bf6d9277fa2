/*!
A watermark tracks "all marks at or below T have completed".

Clients `begin` a timestamp when work starts and `done` it when the work
finishes; multiple begins at the same timestamp accumulate and must be
matched by as many dones. A single coordinator thread owns a min-heap of
outstanding timestamps and a balance map, applies marks serially from a
bounded channel, and advances the `done_until` frontier whenever the heap's
minimum reaches a zero balance. `done_until` itself is published through an
atomic so readers never touch the coordinator.

`wait_for_mark` parks the caller until the frontier passes a timestamp,
optionally bounded by a deadline; a deadline expiry leaves the watermark
state untouched.
*/

use std::collections::{BinaryHeap, HashMap};
use std::cmp::Reverse;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

/// Queue depth of the coordinator's mailbox.
const MARK_BUFFER_SIZE: usize = 100;

/// Errors surfaced by [`Watermark::wait_for_mark`].
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum WatermarkError {
    /// The deadline expired before the frontier reached the timestamp.
    DeadlineExceeded,

    /// The coordinator has been stopped.
    Stopped,
}

impl std::error::Error for WatermarkError {}

impl fmt::Display for WatermarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatermarkError::DeadlineExceeded => write!(f, "deadline exceeded waiting for mark"),
            WatermarkError::Stopped => write!(f, "watermark has been stopped"),
        }
    }
}

enum Mark {
    Begin(u64),
    Done(u64),
    Wait {
        ts: u64,
        notifier: SyncSender<()>,
    },
    Stop,
}

/// Apply a begin (+1) or done (-1) mark and advance the frontier while the
/// heap's minimum timestamp has no outstanding balance.
fn apply_mark(
    ts: u64,
    delta: i64,
    frontier: &AtomicU64,
    outstanding: &mut BinaryHeap<Reverse<u64>>,
    pending: &mut HashMap<u64, i64>,
    waiters: &mut HashMap<u64, Vec<SyncSender<()>>>,
) {
    let balance = pending.entry(ts).or_insert_with(|| {
        outstanding.push(Reverse(ts));
        0
    });
    *balance += delta;

    let current = frontier.load(Ordering::Acquire);
    let mut advanced = current;
    while let Some(&Reverse(min_ts)) = outstanding.peek() {
        if pending.get(&min_ts).copied().unwrap_or(0) > 0 {
            // Still outstanding work at the minimum.
            break;
        }
        outstanding.pop();
        pending.remove(&min_ts);
        advanced = min_ts;
    }

    if advanced > current {
        frontier.store(advanced, Ordering::Release);
        waiters.retain(|&target, notifiers| {
            if target <= advanced {
                for notifier in notifiers.iter() {
                    let _ = notifier.send(());
                }
                return false;
            }
            true
        });
    }
}

/// A monotone "done-until" tracker with begin/done/wait semantics.
pub(crate) struct Watermark {
    done_until: Arc<AtomicU64>,
    sender: SyncSender<Mark>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

/// Crate-only methods
impl Watermark {
    /// Create a watermark and start its coordinator thread.
    pub(crate) fn new(name: &str) -> Watermark {
        let done_until = Arc::new(AtomicU64::new(0));
        let (sender, receiver) = mpsc::sync_channel(MARK_BUFFER_SIZE);

        let frontier = Arc::clone(&done_until);
        let coordinator = thread::Builder::new()
            .name(format!("mistdb-watermark-{name}"))
            .spawn(move || {
                let mut outstanding: BinaryHeap<Reverse<u64>> = BinaryHeap::new();
                let mut pending: HashMap<u64, i64> = HashMap::new();
                let mut waiters: HashMap<u64, Vec<SyncSender<()>>> = HashMap::new();

                while let Ok(mark) = receiver.recv() {
                    match mark {
                        Mark::Stop => break,
                        Mark::Wait { ts, notifier } => {
                            if frontier.load(Ordering::Acquire) >= ts {
                                let _ = notifier.send(());
                            } else {
                                waiters.entry(ts).or_default().push(notifier);
                            }
                        }
                        Mark::Begin(ts) => apply_mark(
                            ts,
                            1,
                            &frontier,
                            &mut outstanding,
                            &mut pending,
                            &mut waiters,
                        ),
                        Mark::Done(ts) => apply_mark(
                            ts,
                            -1,
                            &frontier,
                            &mut outstanding,
                            &mut pending,
                            &mut waiters,
                        ),
                    }
                }
            })
            .expect("failed to spawn watermark coordinator thread");

        Watermark {
            done_until,
            sender,
            coordinator: Mutex::new(Some(coordinator)),
        }
    }

    /// Record the start of work at `ts`.
    pub(crate) fn begin(&self, ts: u64) {
        let _ = self.sender.send(Mark::Begin(ts));
    }

    /// Record the completion of one unit of work at `ts`.
    pub(crate) fn done(&self, ts: u64) {
        let _ = self.sender.send(Mark::Done(ts));
    }

    /// The largest timestamp at or below which all begun work has completed.
    pub(crate) fn done_until(&self) -> u64 {
        self.done_until.load(Ordering::Acquire)
    }

    /**
    Block until the frontier reaches `ts`, or until `deadline` expires.

    A call that already observes `done_until >= ts` returns immediately.
    Expiry of the deadline does not disturb the watermark's state.
    */
    pub(crate) fn wait_for_mark(
        &self,
        ts: u64,
        deadline: Option<Duration>,
    ) -> Result<(), WatermarkError> {
        if self.done_until() >= ts {
            return Ok(());
        }

        let (notifier, waiter) = mpsc::sync_channel(1);
        self.sender
            .send(Mark::Wait { ts, notifier })
            .map_err(|_| WatermarkError::Stopped)?;

        match deadline {
            Some(duration) => waiter.recv_timeout(duration).map_err(|error| match error {
                RecvTimeoutError::Timeout => WatermarkError::DeadlineExceeded,
                RecvTimeoutError::Disconnected => WatermarkError::Stopped,
            }),
            None => waiter.recv().map_err(|_| WatermarkError::Stopped),
        }
    }

    /// Terminate the coordinator thread. Marks sent afterwards are dropped.
    pub(crate) fn stop(&self) {
        let _ = self.sender.send(Mark::Stop);
        if let Some(handle) = self.coordinator.lock().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Give the coordinator time to drain its mailbox.
    fn settle() {
        thread::sleep(Duration::from_millis(30));
    }

    #[test]
    fn starts_at_zero() {
        let watermark = Watermark::new("test");
        assert_eq!(watermark.done_until(), 0);
        watermark.stop();
    }

    #[test]
    fn out_of_order_dones_advance_in_order() {
        let watermark = Watermark::new("test");
        watermark.begin(300);
        watermark.begin(200);
        watermark.begin(100);

        watermark.done(200);
        settle();
        assert_eq!(watermark.done_until(), 0);

        watermark.done(100);
        watermark.wait_for_mark(200, None).unwrap();
        assert_eq!(watermark.done_until(), 200);

        watermark.done(300);
        watermark.wait_for_mark(300, None).unwrap();
        assert_eq!(watermark.done_until(), 300);

        watermark.stop();
    }

    #[test]
    fn balances_accumulate_per_timestamp() {
        let watermark = Watermark::new("test");
        watermark.begin(10);
        watermark.begin(10);
        watermark.done(10);
        settle();
        assert_eq!(watermark.done_until(), 0);

        watermark.done(10);
        watermark.wait_for_mark(10, None).unwrap();
        assert_eq!(watermark.done_until(), 10);

        watermark.stop();
    }

    #[test]
    fn wait_returns_immediately_when_already_done() {
        let watermark = Watermark::new("test");
        watermark.begin(5);
        watermark.done(5);
        watermark.wait_for_mark(5, None).unwrap();

        // A second wait must not block at all.
        watermark.wait_for_mark(5, Some(Duration::from_millis(1))).unwrap();
        watermark.wait_for_mark(0, None).unwrap();

        watermark.stop();
    }

    #[test]
    fn wait_honors_the_deadline() {
        let watermark = Watermark::new("test");
        watermark.begin(42);

        let result = watermark.wait_for_mark(42, Some(Duration::from_millis(20)));
        assert_eq!(result, Err(WatermarkError::DeadlineExceeded));

        // The expired wait did not damage the watermark.
        watermark.done(42);
        watermark.wait_for_mark(42, None).unwrap();
        assert_eq!(watermark.done_until(), 42);

        watermark.stop();
    }

    #[test]
    fn waiters_are_woken_by_a_later_advance() {
        let watermark = Watermark::new("test");
        watermark.begin(7);

        let frontier = {
            let watermark = Arc::new(watermark);
            let shared = Arc::clone(&watermark);
            let waiter = thread::spawn(move || shared.wait_for_mark(7, None));

            thread::sleep(Duration::from_millis(20));
            watermark.done(7);
            waiter.join().unwrap().unwrap();
            let frontier = watermark.done_until();
            watermark.stop();
            frontier
        };

        assert_eq!(frontier, 7);
    }
}
