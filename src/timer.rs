//! One-shot timers driven by a shared background thread.
//!
//! A [`Scheduler`] owns a min-heap of pending callbacks and a single thread
//! that sleeps until the earliest one is due. Each timer carries an atomic
//! state that both the scheduler and [`TimerHandle::stop`] race to change
//! from `ARMED`, so exactly one side wins: either the callback runs, or the
//! stop reports that it never will.
//!
//! Expired callbacks run on their own short-lived thread, never on the
//! scheduler thread, so a slow or panicking callback cannot delay or kill
//! other timers.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use tracing::{debug, error, trace};

use crate::config::{self, SchedulerConfig};
use crate::error::DeadlineError;

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const STOPPED: u8 = 2;

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Entry {
    state: AtomicU8,
    callback: Mutex<Option<Callback>>,
}

impl Entry {
    fn take_callback(&self) -> Option<Callback> {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn is_stopped(&self) -> bool {
        self.state.load(Ordering::Acquire) == STOPPED
    }
}

struct Pending {
    due: Instant,
    seq: u64,
    entry: Arc<Entry>,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Reverse<Pending>>,
    next_seq: u64,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    wakeup: Condvar,
    // Counted before an entry becomes STOPPED, so it never undercounts the
    // stopped entries still in the heap.
    stopped: AtomicUsize,
    fire_thread_name: String,
    compact_after: usize,
}

impl Shared {
    // No user code runs while the queue is locked, so a poisoned lock still
    // guards a consistent heap.
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn forget_stopped(&self, count: usize) {
        self.stopped.fetch_sub(count, Ordering::Relaxed);
    }

    fn compact(&self, queue: &mut Queue) {
        let stopped = self.stopped.load(Ordering::Relaxed);
        if stopped < self.compact_after || stopped.saturating_mul(2) < queue.heap.len() {
            return;
        }
        let before = queue.heap.len();
        queue.heap.retain(|Reverse(pending)| !pending.entry.is_stopped());
        let removed = before - queue.heap.len();
        self.forget_stopped(removed);
        debug!(
            event = "Scheduler",
            phase = "Compacted",
            removed,
            remaining = queue.heap.len()
        );
    }

    fn fire(&self, entry: Arc<Entry>) {
        if entry
            .state
            .compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.forget_stopped(1);
            return;
        }

        let task = Arc::clone(&entry);
        let spawned = thread::Builder::new()
            .name(self.fire_thread_name.clone())
            .spawn(move || {
                if let Some(callback) = task.take_callback() {
                    callback();
                }
            });

        if let Err(err) = spawned {
            error!(
                event = "Scheduler",
                phase = "Fire",
                error = %err,
                "Failed to spawn expiry thread, running callback on the timer thread"
            );
            if let Some(callback) = entry.take_callback() {
                run_inline(callback);
            }
        }
    }

    fn run(&self) {
        let mut queue = self.lock();
        loop {
            if queue.shutdown {
                debug!(
                    event = "Scheduler",
                    phase = "Shutdown",
                    dropped = queue.heap.len()
                );
                return;
            }
            self.compact(&mut queue);

            let now = Instant::now();
            match queue.heap.peek().map(|Reverse(pending)| pending.due) {
                None => {
                    queue = self
                        .wakeup
                        .wait(queue)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(due) if due <= now => {
                    if let Some(Reverse(pending)) = queue.heap.pop() {
                        drop(queue);
                        self.fire(pending.entry);
                        queue = self.lock();
                    }
                }
                Some(due) => {
                    queue = self
                        .wakeup
                        .wait_timeout(queue, due - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }
}

/// Run a callback on the timer thread without letting it unwind the loop.
fn run_inline(callback: Callback) {
    if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
        error!(
            event = "Scheduler",
            phase = "Fire",
            "Callback panicked on the timer thread"
        );
    }
}

/// Handle to a single scheduled callback.
pub(crate) struct TimerHandle {
    entry: Arc<Entry>,
    shared: Arc<Shared>,
}

impl TimerHandle {
    /// Prevent the callback from running.
    ///
    /// Returns `true` if the callback had not run and now never will, and
    /// `false` if it already fired (or is firing) or was stopped before.
    pub(crate) fn stop(&self) -> bool {
        self.shared.stopped.fetch_add(1, Ordering::Relaxed);
        if self
            .entry
            .state
            .compare_exchange(ARMED, STOPPED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.shared.forget_stopped(1);
            return false;
        }
        drop(self.entry.take_callback());
        true
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.entry.state.load(Ordering::Acquire) == ARMED
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// A background thread running one-shot callbacks.
///
/// Dropping a scheduler stops its thread; callbacks still pending never run.
pub(crate) struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub(crate) fn start(config: &SchedulerConfig) -> Result<Self, DeadlineError> {
        config.validate()?;
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            wakeup: Condvar::new(),
            stopped: AtomicUsize::new(0),
            fire_thread_name: config.fire_thread_name.clone(),
            compact_after: config.compact_after,
        });

        let worker = Arc::clone(&shared);
        thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || worker.run())?;

        debug!(
            event = "Scheduler",
            phase = "Started",
            thread = config.thread_name.as_str()
        );
        Ok(Self { shared })
    }

    /// Run `f` once, on a separate thread, after `delay` has elapsed.
    pub(crate) fn after_fn<F>(&self, delay: Duration, f: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let entry = Arc::new(Entry {
            state: AtomicU8::new(ARMED),
            callback: Mutex::new(Some(Box::new(f))),
        });
        let now = Instant::now();
        // Durations too large to represent are treated as "never"; the
        // timer is parked as far out as the clock allows.
        let due = now
            .checked_add(delay)
            .or_else(|| now.checked_add(Duration::from_secs(u32::MAX as u64)))
            .unwrap_or(now);

        let mut queue = self.shared.lock();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        let is_next = queue
            .heap
            .peek()
            .is_none_or(|Reverse(head)| due < head.due);
        queue.heap.push(Reverse(Pending {
            due,
            seq,
            entry: Arc::clone(&entry),
        }));
        drop(queue);

        if is_next {
            self.shared.wakeup.notify_one();
        }
        trace!(event = "Timer", phase = "Scheduled", seq, delay = ?delay);

        TimerHandle {
            entry,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of entries still held by the queue, stopped ones included.
    #[cfg(test)]
    fn queued(&self) -> usize {
        self.shared.lock().heap.len()
    }

    #[cfg(test)]
    fn stopped_count(&self) -> usize {
        self.shared.stopped.load(Ordering::Relaxed)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.wakeup.notify_one();
    }
}

static GLOBAL: OnceCell<Scheduler> = OnceCell::new();

/// The process-wide scheduler, started on first use with the installed
/// [`SchedulerConfig`].
pub(crate) fn scheduler() -> Result<&'static Scheduler, DeadlineError> {
    GLOBAL.get_or_try_init(|| Scheduler::start(config::installed()))
}
