//! Execution statistics accumulated by the pool.
//!
//! Counters are lock-free atomics; queue-wait and execute durations go into
//! histograms behind an `RwLock`, with `try_write` on the hot path so a
//! contended snapshot never stalls a worker. The collector only accumulates;
//! formatting and reporting are the caller's business.

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// One hour in microseconds; durations are clamped to this when recorded.
const HISTOGRAM_MAX_MICROS: u64 = 3_600_000_000;

pub(crate) struct StatsCollector {
    enabled: bool,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    timed_out: AtomicU64,
    retries: AtomicU64,
    active: AtomicU64,
    queue_wait_us: RwLock<Histogram<u64>>,
    execute_us: RwLock<Histogram<u64>>,
    start_time: Instant,
}

impl StatsCollector {
    pub fn new(enabled: bool) -> Self {
        let histogram = || {
            Histogram::new_with_max(HISTOGRAM_MAX_MICROS, 3)
                .expect("histogram bounds are static and valid")
        };
        Self {
            enabled,
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            active: AtomicU64::new(0),
            queue_wait_us: RwLock::new(histogram()),
            execute_us: RwLock::new(histogram()),
            start_time: Instant::now(),
        }
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_started(&self, queue_wait: Duration) {
        self.active.fetch_add(1, Ordering::Relaxed);
        if self.enabled {
            if let Some(mut hist) = self.queue_wait_us.try_write() {
                let _ = hist.record(clamp_micros(queue_wait));
            }
        }
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        // the item goes back to the queue; it is no longer active
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self, execute: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.finish_active(Some(execute));
    }

    pub fn record_failed(&self, execute: Duration) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.finish_active(Some(execute));
    }

    pub fn record_timed_out(&self, execute: Duration) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
        self.finish_active(Some(execute));
    }

    /// Cancellation observed while the item was still queued carries no
    /// execute duration.
    pub fn record_cancelled(&self, execute: Option<Duration>) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
        if execute.is_some() {
            self.finish_active(execute);
        }
    }

    fn finish_active(&self, execute: Option<Duration>) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        if self.enabled {
            if let Some(execute) = execute {
                if let Some(mut hist) = self.execute_us.try_write() {
                    let _ = hist.record(clamp_micros(execute));
                }
            }
        }
    }

    pub fn snapshot(&self, queued: usize) -> PoolStats {
        let queue_wait = self.queue_wait_us.read();
        let execute = self.execute_us.read();

        PoolStats {
            total: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            queued: queued as u64,
            avg_queue_wait_ms: mean_ms(&queue_wait),
            avg_execute_ms: mean_ms(&execute),
            p99_execute_ms: execute.value_at_quantile(0.99) as f64 / 1_000.0,
            uptime: self.start_time.elapsed(),
        }
    }
}

fn clamp_micros(d: Duration) -> u64 {
    (d.as_micros().min(HISTOGRAM_MAX_MICROS as u128)) as u64
}

fn mean_ms(hist: &Histogram<u64>) -> f64 {
    if hist.is_empty() {
        0.0
    } else {
        hist.mean() / 1_000.0
    }
}

/// Read-only snapshot of pool statistics at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolStats {
    /// Work items ever submitted.
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub timed_out: u64,
    /// Retry attempts across all items.
    pub retries: u64,
    /// Items currently executing.
    pub active: u64,
    /// Items currently pending in the queue.
    pub queued: u64,
    pub avg_queue_wait_ms: f64,
    pub avg_execute_ms: f64,
    pub p99_execute_ms: f64,
    pub uptime: Duration,
}
