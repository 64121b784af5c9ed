//! Test doubles shared by the unit tests and the scenario tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Instant;

use tracing::Level;

use crate::handler::{Handler, TimedOutHandler};


/// Records every notification it receives.
///
/// Early warnings are only advertised when constructed with `overrun`.
pub(crate) struct Recorder {
    overrun: bool,
    completions: Mutex<Vec<Instant>>,
    timeouts: Mutex<Vec<Instant>>,
    signal: Mutex<Option<mpsc::Sender<Instant>>>,
}

impl Recorder {
    pub(crate) fn new(overrun: bool) -> Arc<Self> {
        Arc::new(Self {
            overrun,
            completions: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
            signal: Mutex::new(None),
        })
    }

    /// A recorder with early warnings that also sends each `timed_out`
    /// start instant down a channel.
    pub(crate) fn signalling() -> (Arc<Self>, mpsc::Receiver<Instant>) {
        let (tx, rx) = mpsc::channel();
        let recorder = Self::new(true);
        *recorder.signal.lock().unwrap() = Some(tx);
        (recorder, rx)
    }

    pub(crate) fn completions(&self) -> Vec<Instant> {
        self.completions.lock().unwrap().clone()
    }

    pub(crate) fn timeouts(&self) -> Vec<Instant> {
        self.timeouts.lock().unwrap().clone()
    }
}

impl Handler for Recorder {
    fn completed(&self, started: Instant) {
        self.completions.lock().unwrap().push(started);
    }

    fn as_timed_out(&self) -> Option<&dyn TimedOutHandler> {
        if self.overrun { Some(self) } else { None }
    }
}

impl TimedOutHandler for Recorder {
    fn timed_out(&self, started: Instant) {
        self.timeouts.lock().unwrap().push(started);
        if let Some(tx) = self.signal.lock().unwrap().as_ref() {
            let _ = tx.send(started);
        }
    }
}

/// Panics on `completed`; remembers whether `timed_out` ever ran, since a
/// panic on the timer's thread would go unnoticed.
#[derive(Default)]
pub(crate) struct FailHandler {
    timed_out: AtomicBool,
}

impl FailHandler {
    pub(crate) fn timed_out_called(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }
}

impl Handler for FailHandler {
    fn completed(&self, _started: Instant) {
        panic!("Unexpected completed");
    }

    fn as_timed_out(&self) -> Option<&dyn TimedOutHandler> {
        Some(self)
    }
}

impl TimedOutHandler for FailHandler {
    fn timed_out(&self, _started: Instant) {
        self.timed_out.store(true, Ordering::SeqCst);
    }
}

/// In-memory sink for `tracing` output.
#[derive(Clone, Default)]
pub(crate) struct SharedLogBuffer(Arc<Mutex<Vec<u8>>>);

pub(crate) struct SharedLogWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedLogBuffer {
    type Writer = SharedLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SharedLogWriter(Arc::clone(&self.0))
    }
}

impl std::io::Write for SharedLogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedLogBuffer {
    /// Run `f` with a thread-local subscriber writing into this buffer.
    pub(crate) fn capture<R>(&self, max_level: Level, f: impl FnOnce() -> R) -> R {
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_target(false)
            .with_max_level(max_level)
            .with_writer(self.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::callsite::rebuild_interest_cache();
            f()
        })
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}
