//! A custom handler that tallies slow operations by name.
//!
//! Run with: cargo run --example counting_handler

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use overdue::{Handler, Resolution, TimedOutHandler, deadline};

#[derive(Default)]
struct Tally {
    still_running: u64,
    late: u64,
    worst: Duration,
}

/// Counts early warnings and late completions for one named operation.
struct CountingHandler {
    name: String,
    tallies: Arc<Mutex<HashMap<String, Tally>>>,
}

impl CountingHandler {
    fn update(&self, f: impl FnOnce(&mut Tally)) {
        if let Ok(mut tallies) = self.tallies.lock() {
            f(tallies.entry(self.name.clone()).or_default());
        }
    }
}

impl Handler for CountingHandler {
    fn completed(&self, started: Instant) {
        let elapsed = started.elapsed();
        self.update(|tally| {
            tally.late += 1;
            tally.worst = tally.worst.max(elapsed);
        });
    }

    fn as_timed_out(&self) -> Option<&dyn TimedOutHandler> {
        Some(self)
    }
}

impl TimedOutHandler for CountingHandler {
    fn timed_out(&self, _started: Instant) {
        self.update(|tally| tally.still_running += 1);
    }
}

fn main() {
    let tallies = Arc::new(Mutex::new(HashMap::new()));

    let workloads = [
        ("render", Duration::from_millis(5)),
        ("render", Duration::from_millis(40)),
        ("query", Duration::from_millis(60)),
        ("query", Duration::from_millis(2)),
        ("query", Duration::from_millis(45)),
    ];

    for (name, work) in workloads {
        let handler = Arc::new(CountingHandler {
            name: name.to_string(),
            tallies: Arc::clone(&tallies),
        });
        let Some(mut watch) = deadline(Duration::from_millis(20), handler) else {
            continue;
        };
        thread::sleep(work);
        let verdict = match watch.done() {
            Resolution::Late => "LATE",
            _ => "ok",
        };
        println!("{name:>8} took {work:?}: {verdict}");
    }

    // Early warnings arrive on a background thread; give them a moment.
    thread::sleep(Duration::from_millis(10));

    println!("\n=== Slow operation tally ===");
    let tallies = tallies.lock().unwrap();
    let mut names: Vec<_> = tallies.keys().collect();
    names.sort();
    for name in names {
        let tally = &tallies[name];
        println!(
            "  {name}: {} warned while running, {} late, worst {:?}",
            tally.still_running, tally.late, tally.worst
        );
    }
}
