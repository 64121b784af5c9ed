//! Report on abnormally slow operations in production code.
//!
//! Start a [`Stopwatch`] with a deadline and a [`Handler`] at the top of an
//! operation. If the operation finishes after the deadline, the handler's
//! `completed` is called with the start instant. Handlers that also
//! implement [`TimedOutHandler`] are warned from a background thread as soon
//! as the deadline passes, while the operation is still running, which is
//! useful for spotting calls so slow they look hung.
//!
//! ```rust
//! use std::time::Duration;
//!
//! fn should_be_fast(thing: &str, place: &str) {
//!     let _watch = overdue::deadline_log_warn!(
//!         Duration::from_secs(1),
//!         "getting {thing:?} from {place}"
//!     );
//!     // ... do the thing ...
//! }
//! # should_be_fast("x", "db");
//! ```
//!
//! The stopwatch resolves when it is dropped, so every exit path of the
//! function, early returns and panics included, is covered. A zero deadline
//! disables tracking entirely: [`deadline`] returns `None`, and resolving
//! `None` through [`StopwatchExt`] does nothing.
//!
//! There is no ordering between the two notifications. A handler can be
//! told that an operation is taking too long after it has already finished.

pub use config::{SchedulerConfig, configure};
pub use error::DeadlineError;
pub use handler::{HandleFn, HandleFns, Handler, TimedOutHandler, handle_fn, handle_fns};
pub use log_handler::{
    COMPLETED_PREFIX, LogHandler, LogWarnHandler, TIMED_OUT_PREFIX, deadline_log,
    deadline_log_warn,
};
pub use stopwatch::{Resolution, Stopwatch, StopwatchExt, deadline, try_deadline};

mod config;
mod error;
mod handler;
mod log_handler;
mod stopwatch;
mod timer;

#[cfg(test)]
mod tests;
