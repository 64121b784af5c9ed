//! Handlers that report slow operations through `tracing`.
//!
//! [`LogHandler`] logs only late completions; [`LogWarnHandler`] also logs
//! while the operation is still running. Each line is the fixed prefix, the
//! message, and the elapsed time since the operation started:
//!
//! ```text
//! Taking too long: getting "x" from db 1.002s
//! Finally finished: getting "x" from db 1.5s
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{Level, debug, error, info, trace, warn};

use crate::handler::{Handler, TimedOutHandler};
use crate::stopwatch::{Stopwatch, deadline};

/// Prefix of lines logged while an operation is still running.
pub const TIMED_OUT_PREFIX: &str = "Taking too long: ";
/// Prefix of lines logged when a late operation finishes.
pub const COMPLETED_PREFIX: &str = "Finally finished: ";

pub(crate) fn render(prefix: &str, message: &str, elapsed: Duration) -> String {
    format!("{prefix}{message} {elapsed:?}")
}

fn emit(level: Level, event: &'static str, elapsed: Duration, line: &str) {
    let elapsed_ms = elapsed.as_secs_f64() * 1_000.0;
    if level == Level::ERROR {
        error!(event, elapsed_ms, "{line}");
    } else if level == Level::WARN {
        warn!(event, elapsed_ms, "{line}");
    } else if level == Level::INFO {
        info!(event, elapsed_ms, "{line}");
    } else if level == Level::DEBUG {
        debug!(event, elapsed_ms, "{line}");
    } else {
        trace!(event, elapsed_ms, "{line}");
    }
}

/// Logs `"Finally finished: <message> <elapsed>"` when a late operation
/// completes.
#[derive(Debug, Clone)]
pub struct LogHandler {
    message: String,
    level: Level,
}

impl LogHandler {
    /// Log at `WARN` by default.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Level::WARN,
        }
    }

    /// Log at `level` instead.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// The message logged between the prefix and the elapsed time.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The level both lines are logged at.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Add early warnings to this handler.
    pub fn warn_early(self) -> LogWarnHandler {
        LogWarnHandler { inner: self }
    }
}

impl Handler for LogHandler {
    fn completed(&self, started: Instant) {
        let elapsed = started.elapsed();
        let line = render(COMPLETED_PREFIX, &self.message, elapsed);
        emit(self.level, "Completed", elapsed, &line);
    }
}

/// Like [`LogHandler`], and also logs
/// `"Taking too long: <message> <elapsed>"` as soon as the deadline passes.
#[derive(Debug, Clone)]
pub struct LogWarnHandler {
    inner: LogHandler,
}

impl LogWarnHandler {
    /// Log at `WARN` by default.
    pub fn new(message: impl Into<String>) -> Self {
        LogHandler::new(message).warn_early()
    }

    /// Log both lines at `level` instead.
    pub fn with_level(self, level: Level) -> Self {
        self.inner.with_level(level).warn_early()
    }

    /// See [`LogHandler::message`].
    pub fn message(&self) -> &str {
        self.inner.message()
    }

    /// See [`LogHandler::level`].
    pub fn level(&self) -> Level {
        self.inner.level()
    }
}

impl From<LogHandler> for LogWarnHandler {
    fn from(inner: LogHandler) -> Self {
        inner.warn_early()
    }
}

impl Handler for LogWarnHandler {
    fn completed(&self, started: Instant) {
        self.inner.completed(started);
    }

    fn as_timed_out(&self) -> Option<&dyn TimedOutHandler> {
        Some(self)
    }
}

impl TimedOutHandler for LogWarnHandler {
    fn timed_out(&self, started: Instant) {
        let elapsed = started.elapsed();
        let line = render(TIMED_OUT_PREFIX, &self.inner.message, elapsed);
        emit(self.inner.level, "TimedOut", elapsed, &line);
    }
}

/// [`deadline`] with a [`LogHandler`]: logs late completions only.
#[must_use = "dropping the stopwatch resolves it immediately"]
pub fn deadline_log(duration: Duration, message: impl Into<String>) -> Option<Stopwatch> {
    if duration.is_zero() {
        return None;
    }
    deadline(duration, Arc::new(LogHandler::new(message)))
}

/// [`deadline`] with a [`LogWarnHandler`]: logs late completions and
/// operations still running past their deadline.
#[must_use = "dropping the stopwatch resolves it immediately"]
pub fn deadline_log_warn(duration: Duration, message: impl Into<String>) -> Option<Stopwatch> {
    if duration.is_zero() {
        return None;
    }
    deadline(duration, Arc::new(LogWarnHandler::new(message)))
}

/// Format a message and start a [`deadline_log()`] stopwatch.
///
/// The message is not formatted when the duration is zero.
///
/// ```rust
/// use std::time::Duration;
///
/// let place = "cache";
/// let _watch = overdue::deadline_log!(
///     Duration::from_millis(50),
///     "reading {:?} from {place}",
///     "key"
/// );
/// ```
#[macro_export]
macro_rules! deadline_log {
    ($duration:expr, $($arg:tt)+) => {{
        let duration: ::std::time::Duration = $duration;
        if duration.is_zero() {
            ::std::option::Option::None
        } else {
            $crate::deadline_log(duration, ::std::format!($($arg)+))
        }
    }};
}

/// Format a message and start a [`deadline_log_warn()`] stopwatch.
///
/// The message is not formatted when the duration is zero.
#[macro_export]
macro_rules! deadline_log_warn {
    ($duration:expr, $($arg:tt)+) => {{
        let duration: ::std::time::Duration = $duration;
        if duration.is_zero() {
            ::std::option::Option::None
        } else {
            $crate::deadline_log_warn(duration, ::std::format!($($arg)+))
        }
    }};
}
