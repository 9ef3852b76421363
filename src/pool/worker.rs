//! Worker thread loop: dequeue, execute under the watchdog, apply the retry
//! policy, publish the outcome.

use crate::work::{Computation, StartDecision, WorkFailure, WorkItem, WorkOutcome};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::monitor::DeadlineAction;
use super::PoolShared;

pub(crate) type WorkerId = usize;

pub(crate) struct Worker {
    pub id: WorkerId,
}

impl Worker {
    pub fn new(id: WorkerId) -> Self {
        Self { id }
    }

    /// Main loop. Parks in the queue when idle; exits on pool shutdown.
    pub fn run(&self, shared: Arc<PoolShared>) {
        apply_thread_priority(&shared);

        while let Some(item) = shared.queue.pop_wait() {
            self.process(&shared, item);
        }
        trace!(worker = self.id, "worker exiting");
    }

    fn process(&self, shared: &Arc<PoolShared>, item: Arc<WorkItem>) {
        match item.try_start() {
            StartDecision::Skip => {}
            StartDecision::Cancelled => {
                debug!(id = %item.id, "cancelled before start");
                shared.stats.record_cancelled(None);
            }
            StartDecision::Run {
                mut computation,
                queue_wait,
            } => {
                shared.stats.record_started(queue_wait);

                let attempt = item.attempts();
                let watchdog = shared.effective_timeout(&item.options).map(|timeout| {
                    shared.monitor.register(
                        Instant::now() + timeout,
                        DeadlineAction::Timeout {
                            id: item.id,
                            attempt,
                        },
                    )
                });

                // no lock is held while user code runs
                let started = Instant::now();
                let result = catch_unwind(AssertUnwindSafe(|| computation()));
                let execute = started.elapsed();

                if let Some(key) = watchdog {
                    shared.monitor.cancel(key);
                }

                self.resolve(shared, item, computation, result, execute);
            }
        }
    }

    /// Outcome precedence: cancellation, then an already-fired timeout, then
    /// the retry policy, then Faulted/Completed.
    fn resolve(
        &self,
        shared: &Arc<PoolShared>,
        item: Arc<WorkItem>,
        computation: Computation,
        result: std::thread::Result<
            std::result::Result<Box<dyn std::any::Any + Send>, crate::error::BoxError>,
        >,
        execute: Duration,
    ) {
        // a token signaled during execution wins over every other outcome
        // and is never retried
        if item.options.token().is_some_and(|t| t.is_cancelled()) {
            if item.finish(WorkOutcome::Cancelled) {
                debug!(id = %item.id, "cancelled during execution");
                shared.stats.record_cancelled(Some(execute));
            }
            return;
        }

        match result {
            Ok(Ok(value)) => {
                if item.finish(WorkOutcome::Completed(value)) {
                    shared.stats.record_completed(execute);
                } else {
                    // watchdog fired mid-run; the value is discarded
                    trace!(id = %item.id, "late result discarded");
                }
            }
            Ok(Err(err)) => {
                self.handle_failure(shared, item, computation, WorkFailure::from_error(err), execute);
            }
            Err(payload) => {
                self.handle_failure(
                    shared,
                    item,
                    computation,
                    WorkFailure::from_panic(payload),
                    execute,
                );
            }
        }
    }

    fn handle_failure(
        &self,
        shared: &Arc<PoolShared>,
        item: Arc<WorkItem>,
        computation: Computation,
        mut failure: WorkFailure,
        execute: Duration,
    ) {
        failure.attempts = item.attempts();

        let retry_eligible =
            item.retries() < item.options.max_retries() && item.options.should_retry(&failure);

        if retry_eligible {
            // try_requeue fails iff a watchdog or cancellation already
            // terminated the item, in which case the attempt is discarded
            if item.try_requeue(computation) {
                shared.stats.record_retry();
                let interval = item.options.retry_interval();
                debug!(
                    id = %item.id,
                    retry = item.retries(),
                    ?interval,
                    error = %failure.message,
                    "retrying failed work"
                );
                if interval.is_zero() {
                    shared.queue.push_internal(item);
                } else {
                    shared
                        .monitor
                        .register(Instant::now() + interval, DeadlineAction::Requeue(item.id));
                }
            }
            return;
        }

        if item.finish(WorkOutcome::Faulted(failure)) {
            shared.stats.record_failed(execute);
            warn!(id = %item.id, attempts = item.attempts(), "work faulted");
        }
    }
}

#[cfg(target_os = "linux")]
fn apply_thread_priority(shared: &PoolShared) {
    if let Some(nice) = shared.config.thread_priority.nice_value() {
        // who = 0 targets the calling thread on Linux
        let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
        if rc != 0 {
            warn!(nice, "failed to set worker niceness");
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_thread_priority(_shared: &PoolShared) {}
