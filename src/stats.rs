use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

/// Run-wide counters, updated by every producer and sender.
#[derive(Debug, Default)]
pub struct Stats {
    lines_read: AtomicU64,
    parse_errors: AtomicU64,
    sampled_out: AtomicU64,
    sent: AtomicU64,
    send_errors: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub lines_read: u64,
    pub parse_errors: u64,
    pub sampled_out: u64,
    pub sent: u64,
    pub send_errors: u64,
}

impl Stats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn line_read(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sampled_out(&self) {
        self.sampled_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            sampled_out: self.sampled_out.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    pub fn log(&self, label: &str) {
        info!(
            lines_read = self.lines_read,
            parse_errors = self.parse_errors,
            sampled_out = self.sampled_out,
            sent = self.sent,
            send_errors = self.send_errors,
            "{label}"
        );
    }
}

/// Log a summary every `interval` until `done` flips to true.
pub async fn report(stats: Arc<Stats>, interval: Duration, mut done: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    // the first tick fires immediately
    ticker.tick().await;
    let mut last = stats.snapshot();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = stats.snapshot();
                let rate = (now.lines_read - last.lines_read) as f64 / interval.as_secs_f64();
                info!(lines_per_sec = rate, "throughput");
                now.log("summary");
                last = now;
            }
            changed = done.changed() => {
                if changed.is_err() || *done.borrow() {
                    break;
                }
            }
        }
    }
}
