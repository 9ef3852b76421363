//! The unit of schedulable work: deferred computation, lifecycle state, and
//! the write-once result slot.

use crate::error::BoxError;
use crate::work::outcome::WorkOutcome;
use crate::work::{WorkId, WorkOptions};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::time::{Duration, Instant};

/// A deferred computation. `FnMut` because the retry path re-invokes it.
pub(crate) type Computation =
    Box<dyn FnMut() -> std::result::Result<Box<dyn Any + Send>, BoxError> + Send>;

/// Lifecycle state of a work item.
///
/// `Cancelled`, `Faulted`, `Completed` and `TimedOut` are terminal; no
/// further transitions occur once one of them is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    Queued,
    Running,
    Cancelled,
    Faulted,
    Completed,
    TimedOut,
}

impl WorkState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkState::Queued | WorkState::Running)
    }
}

struct ItemInner {
    state: WorkState,
    /// Taken while an attempt runs, handed back on retry. The lock is never
    /// held across an invocation of the computation itself.
    computation: Option<Computation>,
    /// Written exactly once, at the terminal transition.
    outcome: Option<WorkOutcome>,
    attempts: u32,
    retries: u32,
    enqueued_at: Instant,
    started_at: Option<Instant>,
}

/// Owned exclusively by the pool from enqueue to terminal state; callers hold
/// only the [`WorkId`] and poll/await the result slot through the pool.
pub(crate) struct WorkItem {
    pub id: WorkId,
    pub options: WorkOptions,
    pub created_at: Instant,
    inner: Mutex<ItemInner>,
    done: Condvar,
}

/// What a worker should do with a freshly dequeued item.
pub(crate) enum StartDecision {
    /// Execute the computation. The queue wait for this attempt is attached.
    Run {
        computation: Computation,
        queue_wait: Duration,
    },
    /// The token was signaled while the item sat in the queue; it has been
    /// moved to `Cancelled` and must not run.
    Cancelled,
    /// Already terminal (raced with `cancel_all` or a watchdog); skip.
    Skip,
}

impl WorkItem {
    pub fn new(id: WorkId, computation: Computation, options: WorkOptions) -> Self {
        let now = Instant::now();
        Self {
            id,
            options,
            created_at: now,
            inner: Mutex::new(ItemInner {
                state: WorkState::Queued,
                computation: Some(computation),
                outcome: None,
                attempts: 0,
                retries: 0,
                enqueued_at: now,
                started_at: None,
            }),
            done: Condvar::new(),
        }
    }

    pub fn state(&self) -> WorkState {
        self.inner.lock().state
    }

    pub fn retries(&self) -> u32 {
        self.inner.lock().retries
    }

    pub fn attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    /// Restarts the queue-wait clock. Used when the scheduler holds an item
    /// past its creation and enqueues it later.
    pub fn mark_enqueued(&self) {
        self.inner.lock().enqueued_at = Instant::now();
    }

    /// Transition Queued -> Running and hand out the computation.
    pub fn try_start(&self) -> StartDecision {
        let mut inner = self.inner.lock();
        if inner.state != WorkState::Queued {
            return StartDecision::Skip;
        }

        if self.options.token().is_some_and(|t| t.is_cancelled()) {
            inner.state = WorkState::Cancelled;
            inner.outcome = Some(WorkOutcome::Cancelled);
            self.done.notify_all();
            return StartDecision::Cancelled;
        }

        let Some(computation) = inner.computation.take() else {
            return StartDecision::Skip;
        };

        let now = Instant::now();
        inner.state = WorkState::Running;
        inner.started_at = Some(now);
        inner.attempts += 1;
        StartDecision::Run {
            computation,
            queue_wait: now.duration_since(inner.enqueued_at),
        }
    }

    /// Publish a terminal outcome and wake waiters. Returns `false` when the
    /// item already reached a terminal state (the late outcome is discarded,
    /// which is how results arriving after a timeout disappear).
    pub fn finish(&self, outcome: WorkOutcome) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return false;
        }
        inner.state = match &outcome {
            WorkOutcome::Completed(_) => WorkState::Completed,
            WorkOutcome::Faulted(_) => WorkState::Faulted,
            WorkOutcome::Cancelled => WorkState::Cancelled,
            WorkOutcome::TimedOut => WorkState::TimedOut,
        };
        inner.outcome = Some(outcome);
        self.done.notify_all();
        true
    }

    /// Running -> Queued for another attempt. Fails when a watchdog or
    /// cancellation already terminated the item; the handed-back computation
    /// is dropped in that case and no retry happens.
    pub fn try_requeue(&self, computation: Computation) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != WorkState::Running {
            return false;
        }
        inner.state = WorkState::Queued;
        inner.computation = Some(computation);
        inner.retries += 1;
        inner.enqueued_at = Instant::now();
        inner.started_at = None;
        true
    }

    /// Watchdog path: force Running -> TimedOut, gated on the attempt the
    /// watchdog was armed for. A deadline popping while its attempt is being
    /// requeued must not terminate the next attempt, which runs under its
    /// own watchdog. Returns the execution duration so far when the
    /// transition applied.
    pub fn force_timeout(&self, attempt: u32) -> Option<Duration> {
        let mut inner = self.inner.lock();
        if inner.state != WorkState::Running || inner.attempts != attempt {
            return None;
        }
        let elapsed = inner.started_at.map(|s| s.elapsed()).unwrap_or_default();
        inner.state = WorkState::TimedOut;
        inner.outcome = Some(WorkOutcome::TimedOut);
        self.done.notify_all();
        Some(elapsed)
    }

    /// Cancel an item that has not started yet.
    pub fn cancel_queued(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != WorkState::Queued {
            return false;
        }
        inner.state = WorkState::Cancelled;
        inner.outcome = Some(WorkOutcome::Cancelled);
        self.done.notify_all();
        true
    }

    /// Block until the item is terminal or the wait timeout elapses.
    /// Returns `true` when terminal.
    pub fn wait_terminal(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock();
        while !inner.state.is_terminal() {
            match deadline {
                Some(deadline) => {
                    if self.done.wait_until(&mut inner, deadline).timed_out() {
                        return inner.state.is_terminal();
                    }
                }
                None => self.done.wait(&mut inner),
            }
        }
        true
    }

    /// Move the outcome out of the result slot.
    pub fn take_outcome(&self) -> Option<WorkOutcome> {
        self.inner.lock().outcome.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationTokenSource;

    fn item_with(options: WorkOptions) -> WorkItem {
        WorkItem::new(WorkId::next(), Box::new(|| Ok(Box::new(()) as _)), options)
    }

    #[test]
    fn test_start_and_complete() {
        let item = item_with(WorkOptions::default());
        assert_eq!(item.state(), WorkState::Queued);

        let StartDecision::Run { .. } = item.try_start() else {
            panic!("expected Run");
        };
        assert_eq!(item.state(), WorkState::Running);
        assert_eq!(item.attempts(), 1);

        assert!(item.finish(WorkOutcome::Completed(Box::new(5i32))));
        assert_eq!(item.state(), WorkState::Completed);
        assert_eq!(item.take_outcome().and_then(|o| o.into_value::<i32>()), Some(5));
    }

    #[test]
    fn test_result_slot_written_once() {
        let item = item_with(WorkOptions::default());
        let StartDecision::Run { .. } = item.try_start() else {
            panic!("expected Run");
        };

        assert!(item.finish(WorkOutcome::Cancelled));
        // late outcome is discarded
        assert!(!item.finish(WorkOutcome::Completed(Box::new(1i32))));
        assert_eq!(item.state(), WorkState::Cancelled);
    }

    #[test]
    fn test_cancelled_token_observed_before_start() {
        let source = CancellationTokenSource::new();
        let options = WorkOptions::builder()
            .token(source.token())
            .build()
            .unwrap();
        let item = item_with(options);

        source.cancel();
        assert!(matches!(item.try_start(), StartDecision::Cancelled));
        assert_eq!(item.state(), WorkState::Cancelled);
    }

    #[test]
    fn test_timeout_blocks_retry() {
        let item = item_with(WorkOptions::default());
        let StartDecision::Run { computation, .. } = item.try_start() else {
            panic!("expected Run");
        };

        assert!(item.force_timeout(1).is_some());
        assert!(!item.try_requeue(computation));
        assert_eq!(item.state(), WorkState::TimedOut);
    }

    #[test]
    fn test_stale_watchdog_spares_next_attempt() {
        let item = item_with(WorkOptions::default());
        let StartDecision::Run { computation, .. } = item.try_start() else {
            panic!("expected Run");
        };
        assert!(item.try_requeue(computation));
        let StartDecision::Run { .. } = item.try_start() else {
            panic!("expected second Run");
        };
        assert_eq!(item.attempts(), 2);

        // the first attempt's watchdog pops after the requeue; it must not
        // terminate the second attempt
        assert!(item.force_timeout(1).is_none());
        assert_eq!(item.state(), WorkState::Running);

        assert!(item.force_timeout(2).is_some());
        assert_eq!(item.state(), WorkState::TimedOut);
    }

    #[test]
    fn test_requeue_increments_retry_counter() {
        let item = item_with(WorkOptions::default());
        let StartDecision::Run { computation, .. } = item.try_start() else {
            panic!("expected Run");
        };

        assert!(item.try_requeue(computation));
        assert_eq!(item.state(), WorkState::Queued);
        assert_eq!(item.retries(), 1);

        let StartDecision::Run { .. } = item.try_start() else {
            panic!("expected second Run");
        };
        assert_eq!(item.attempts(), 2);
    }

    #[test]
    fn test_wait_terminal_timeout() {
        let item = item_with(WorkOptions::default());
        assert!(!item.wait_terminal(Some(Duration::from_millis(20))));

        item.cancel_queued();
        assert!(item.wait_terminal(Some(Duration::from_millis(20))));
    }
}
