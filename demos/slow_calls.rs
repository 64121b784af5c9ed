//! Logs warnings for calls that run past their deadline.
//!
//! Run with: cargo run --example slow_calls

use std::thread;
use std::time::Duration;

use overdue::{SchedulerConfig, StopwatchExt};

fn fetch(key: &str, place: &str, work: Duration) {
    let _watch = overdue::deadline_log_warn!(
        Duration::from_millis(100),
        "fetching {key:?} from {place}"
    );
    thread::sleep(work);
}

fn flush(work: Duration) {
    // Late completions only, no early warning.
    let mut watch = overdue::deadline_log!(Duration::from_millis(50), "flushing buffers");
    thread::sleep(work);
    if let Some(resolution) = watch.done() {
        println!("flush resolved: {resolution}");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let config = SchedulerConfig::from_json(r#"{ "thread_name": "slow-calls-timer" }"#)
        .expect("demo config is valid");
    overdue::configure(config).expect("configured before first deadline");

    println!("fast fetch: nothing is logged");
    fetch("user:1", "cache", Duration::from_millis(10));

    println!("slow fetch: a warning while running, then a late completion");
    fetch("user:2", "database", Duration::from_millis(250));

    println!("slow flush: a single late completion");
    flush(Duration::from_millis(80));

    println!("disabled tracking: a zero deadline never logs");
    let _watch = overdue::deadline_log_warn!(Duration::ZERO, "never formatted");
}
