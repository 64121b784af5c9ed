//! Notification targets for [`Stopwatch`](crate::Stopwatch).
//!
//! Every handler implements [`Handler`], which is told when a watched
//! operation finishes after its deadline. Handlers that also want an early
//! warning while the operation is still running implement
//! [`TimedOutHandler`] and advertise it through [`Handler::as_timed_out`].

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Receives notifications when operations complete after their deadline.
///
/// Handlers are shared between the caller and the background timer thread,
/// so they must be `Send + Sync`.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use std::time::Instant;
/// use overdue::Handler;
///
/// struct LateCounter(AtomicU64);
///
/// impl Handler for LateCounter {
///     fn completed(&self, _started: Instant) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait Handler: Send + Sync {
    /// Called when an operation that exceeded its deadline finally completes.
    fn completed(&self, started: Instant);

    /// Capability query for early warnings.
    ///
    /// Returns `None` by default. Types that implement [`TimedOutHandler`]
    /// override this to return `Some(self)`; only then does a stopwatch arm a
    /// background timer.
    fn as_timed_out(&self) -> Option<&dyn TimedOutHandler> {
        None
    }
}

/// Receives a notification as soon as a deadline passes, while the
/// operation is still running.
///
/// `timed_out` is invoked on a background thread. A panic there ends only
/// that thread; it never reaches the caller of the watched operation.
///
/// ```rust
/// use std::time::Instant;
/// use overdue::{Handler, TimedOutHandler};
///
/// struct Pager;
///
/// impl Handler for Pager {
///     fn completed(&self, started: Instant) {
///         println!("recovered after {:?}", started.elapsed());
///     }
///
///     fn as_timed_out(&self) -> Option<&dyn TimedOutHandler> {
///         Some(self)
///     }
/// }
///
/// impl TimedOutHandler for Pager {
///     fn timed_out(&self, started: Instant) {
///         println!("still running after {:?}", started.elapsed());
///     }
/// }
/// ```
pub trait TimedOutHandler: Handler {
    /// Called once when the deadline has passed.
    fn timed_out(&self, started: Instant);
}

/// A closure used as a completion-only [`Handler`].
pub struct HandleFn<F> {
    completed: F,
}

impl<F> Handler for HandleFn<F>
where
    F: Fn(Instant) + Send + Sync,
{
    fn completed(&self, started: Instant) {
        (self.completed)(started)
    }
}

impl<F> fmt::Debug for HandleFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleFn").finish_non_exhaustive()
    }
}

/// Wrap a closure as a [`Handler`] without early warnings.
pub fn handle_fn<F>(completed: F) -> Arc<HandleFn<F>>
where
    F: Fn(Instant) + Send + Sync + 'static,
{
    Arc::new(HandleFn { completed })
}

/// A pair of closures used as a [`TimedOutHandler`].
pub struct HandleFns<C, T> {
    completed: C,
    timed_out: T,
}

impl<C, T> Handler for HandleFns<C, T>
where
    C: Fn(Instant) + Send + Sync,
    T: Fn(Instant) + Send + Sync,
{
    fn completed(&self, started: Instant) {
        (self.completed)(started)
    }

    fn as_timed_out(&self) -> Option<&dyn TimedOutHandler> {
        Some(self)
    }
}

impl<C, T> TimedOutHandler for HandleFns<C, T>
where
    C: Fn(Instant) + Send + Sync,
    T: Fn(Instant) + Send + Sync,
{
    fn timed_out(&self, started: Instant) {
        (self.timed_out)(started)
    }
}

impl<C, T> fmt::Debug for HandleFns<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleFns").finish_non_exhaustive()
    }
}

/// Wrap two closures as a handler that also receives early warnings.
pub fn handle_fns<C, T>(completed: C, timed_out: T) -> Arc<HandleFns<C, T>>
where
    C: Fn(Instant) + Send + Sync + 'static,
    T: Fn(Instant) + Send + Sync + 'static,
{
    Arc::new(HandleFns {
        completed,
        timed_out,
    })
}
