//! Deadline tracking for a single operation.
//!
//! [`deadline`] starts a [`Stopwatch`] for an operation; resolving the
//! stopwatch (explicitly via [`Stopwatch::done`], or implicitly when it is
//! dropped) decides whether the operation finished late.
//!
//! Two paths exist, chosen once by the handler's capability:
//!
//! * Handlers without [`TimedOutHandler`](crate::TimedOutHandler) arm
//!   nothing. Resolution compares the elapsed time against the deadline.
//! * Handlers with [`TimedOutHandler`](crate::TimedOutHandler) arm a
//!   one-shot timer that calls `timed_out` on a background thread once the
//!   deadline passes.
//!   Resolution stops the timer; if it had already fired the operation was
//!   late.
//!
//! There is no ordering between `timed_out` and `completed`: a handler may
//! hear that an operation is running slowly after it has already finished.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use tracing::{trace, warn};

use crate::error::DeadlineError;
use crate::handler::Handler;
use crate::timer::{self, Scheduler, TimerHandle};

/// Outcome of resolving a [`Stopwatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Resolution {
    /// Finished within the deadline; no notification was delivered.
    InTime,
    /// Finished after the deadline; `completed` was delivered.
    Late,
    /// The stopwatch had already been resolved; nothing happened.
    AlreadyResolved,
}

/// Watches one operation against a deadline.
///
/// A stopwatch resolves exactly once. Calling [`done`](Self::done) again, or
/// dropping it afterwards, does nothing. Dropping an unresolved stopwatch
/// resolves it, so binding it to a local guarantees resolution on every exit
/// path:
///
/// ```rust
/// use std::time::Duration;
///
/// fn should_be_fast(thing: &str) {
///     let _watch = overdue::deadline_log!(Duration::from_secs(1), "getting {thing:?}");
///     // ... work ...
/// }
/// # should_be_fast("x");
/// ```
///
/// Note that `let _ = deadline(...)` drops, and therefore resolves, the
/// stopwatch immediately.
pub struct Stopwatch {
    handler: Arc<dyn Handler>,
    started: Instant,
    deadline: Duration,
    timer: Option<TimerHandle>,
    resolved: bool,
}

impl Stopwatch {
    fn start(
        duration: Duration,
        handler: Arc<dyn Handler>,
        scheduler: Option<&Scheduler>,
    ) -> Self {
        let started = Instant::now();
        let timer = scheduler.map(|scheduler| {
            let notify = Arc::clone(&handler);
            scheduler.after_fn(duration, move || {
                if let Some(handler) = notify.as_timed_out() {
                    handler.timed_out(started);
                }
            })
        });

        trace!(
            event = "Deadline",
            phase = "Armed",
            deadline = ?duration,
            timer = timer.is_some()
        );

        Stopwatch {
            handler,
            started,
            deadline: duration,
            timer,
            resolved: false,
        }
    }

    /// Mark the watched operation as finished.
    ///
    /// Delivers `completed` if, and only if, the deadline had passed. Only
    /// the first call has any effect.
    pub fn done(&mut self) -> Resolution {
        if self.resolved {
            return Resolution::AlreadyResolved;
        }
        self.resolved = true;

        let late = match &self.timer {
            Some(timer) => !timer.stop(),
            None => self.started.elapsed() > self.deadline,
        };

        trace!(
            event = "Deadline",
            phase = "Resolved",
            late,
            elapsed = ?self.started.elapsed(),
            deadline = ?self.deadline
        );

        if late {
            self.handler.completed(self.started);
            Resolution::Late
        } else {
            Resolution::InTime
        }
    }

    /// When the watched operation started.
    pub fn started(&self) -> Instant {
        self.started
    }

    /// The deadline this stopwatch was created with.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Time since the watched operation started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// `true` while a background timer is waiting for the deadline.
    ///
    /// Always `false` for handlers without early warnings, which never arm
    /// a timer.
    pub fn is_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(TimerHandle::is_pending)
    }

    /// `true` once [`done`](Self::done) has run, explicitly or on drop.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }
}

impl Drop for Stopwatch {
    fn drop(&mut self) {
        self.done();
    }
}

impl fmt::Debug for Stopwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stopwatch")
            .field("started", &self.started)
            .field("deadline", &self.deadline)
            .field("timer", &self.timer)
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}

/// Resolution for the `Option<Stopwatch>` returned by [`deadline`].
///
/// A `None` stopwatch (zero deadline) resolves to nothing.
pub trait StopwatchExt {
    /// Resolve the stopwatch if there is one; `None` otherwise.
    fn done(&mut self) -> Option<Resolution>;
}

impl StopwatchExt for Option<Stopwatch> {
    fn done(&mut self) -> Option<Resolution> {
        self.as_mut().map(Stopwatch::done)
    }
}

/// Start watching an operation.
///
/// Returns `None` when `duration` is zero, which disables tracking. If the
/// handler implements [`TimedOutHandler`](crate::TimedOutHandler), a
/// background timer delivers `timed_out(started)` once `duration` has
/// passed.
///
/// Never fails: if the background timer cannot be started, a warning is
/// logged and the stopwatch falls back to checking elapsed time when it is
/// resolved, so `completed` is still delivered. Use [`try_deadline`] to
/// observe that failure instead.
#[must_use = "dropping the stopwatch resolves it immediately"]
pub fn deadline(duration: Duration, handler: Arc<dyn Handler>) -> Option<Stopwatch> {
    arm_or_fallback(duration, handler, timer::scheduler)
}

/// Like [`deadline`], but reports a failure to start the background timer.
#[must_use = "dropping the stopwatch resolves it immediately"]
pub fn try_deadline(
    duration: Duration,
    handler: Arc<dyn Handler>,
) -> Result<Option<Stopwatch>, DeadlineError> {
    try_arm(duration, handler, timer::scheduler)
}

fn wants_timer(handler: &dyn Handler) -> bool {
    handler.as_timed_out().is_some()
}

fn arm_or_fallback<'a>(
    duration: Duration,
    handler: Arc<dyn Handler>,
    scheduler: impl FnOnce() -> Result<&'a Scheduler, DeadlineError>,
) -> Option<Stopwatch> {
    if duration.is_zero() {
        return None;
    }
    let scheduler = if wants_timer(handler.as_ref()) {
        scheduler()
            .inspect_err(|err| {
                warn!(
                    event = "Deadline",
                    phase = "Armed",
                    error = %err,
                    "Timer unavailable, early warnings disabled for this deadline"
                )
            })
            .ok()
    } else {
        None
    };
    Some(Stopwatch::start(duration, handler, scheduler))
}

fn try_arm<'a>(
    duration: Duration,
    handler: Arc<dyn Handler>,
    scheduler: impl FnOnce() -> Result<&'a Scheduler, DeadlineError>,
) -> Result<Option<Stopwatch>, DeadlineError> {
    if duration.is_zero() {
        return Ok(None);
    }
    let scheduler = if wants_timer(handler.as_ref()) {
        Some(scheduler()?)
    } else {
        None
    };
    Ok(Some(Stopwatch::start(duration, handler, scheduler)))
}

/// Start a stopwatch on a caller-provided scheduler.
#[cfg(test)]
pub(crate) fn deadline_on(
    duration: Duration,
    handler: Arc<dyn Handler>,
    scheduler: &Scheduler,
) -> Option<Stopwatch> {
    arm_or_fallback(duration, handler, || Ok(scheduler))
}
