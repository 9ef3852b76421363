//! Deadline monitor: one re-armed timer thread serving the whole pool.
//!
//! Two kinds of deadline live in the same ordered table: execution timeouts
//! (force a running item into `TimedOut`) and delayed retry requeues. The
//! thread sleeps until the soonest deadline, fires everything due, then
//! re-arms against the new minimum; it is never a fixed-rate ticker.

use crate::work::WorkId;
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use super::PoolShared;

#[derive(Debug, Clone, Copy)]
pub(crate) enum DeadlineAction {
    /// The watchdog for one specific execution attempt.
    Timeout { id: WorkId, attempt: u32 },
    /// Re-enqueue a retry-pending item into its original lane.
    Requeue(WorkId),
}

/// Handle for deregistering a deadline (workers cancel the watchdog when an
/// attempt finishes on its own).
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeadlineKey(Instant, u64);

struct MonitorState {
    deadlines: BTreeMap<(Instant, u64), DeadlineAction>,
    seq: u64,
    shutdown: bool,
}

pub(crate) struct Monitor {
    state: Mutex<MonitorState>,
    rearm: Condvar,
}

impl Monitor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MonitorState {
                deadlines: BTreeMap::new(),
                seq: 0,
                shutdown: false,
            }),
            rearm: Condvar::new(),
        }
    }

    pub fn register(&self, due: Instant, action: DeadlineAction) -> DeadlineKey {
        let mut state = self.state.lock();
        state.seq += 1;
        let key = (due, state.seq);
        state.deadlines.insert(key, action);
        // the new deadline may be sooner than the one the thread is armed on
        self.rearm.notify_one();
        DeadlineKey(key.0, key.1)
    }

    pub fn cancel(&self, key: DeadlineKey) {
        self.state.lock().deadlines.remove(&(key.0, key.1));
    }

    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        drop(state);
        self.rearm.notify_all();
    }

    /// Timer thread body. Exits when the pool shuts down.
    pub fn run(&self, shared: &Arc<PoolShared>) {
        loop {
            let due_actions = {
                let mut state = self.state.lock();
                loop {
                    if state.shutdown {
                        return;
                    }
                    let now = Instant::now();
                    let next_due = state.deadlines.keys().next().map(|(due, _)| *due);
                    match next_due {
                        Some(due) if due <= now => break,
                        Some(due) => {
                            self.rearm.wait_until(&mut state, due);
                        }
                        None => self.rearm.wait(&mut state),
                    }
                }

                // collect everything due; fire outside the monitor lock
                let now = Instant::now();
                let mut due_actions = Vec::new();
                while let Some((&key, _)) = state.deadlines.first_key_value() {
                    if key.0 > now {
                        break;
                    }
                    let (_, action) = state.deadlines.pop_first().expect("checked non-empty");
                    due_actions.push(action);
                }
                due_actions
            };

            for action in due_actions {
                self.fire(shared, action);
            }
        }
    }

    fn fire(&self, shared: &Arc<PoolShared>, action: DeadlineAction) {
        match action {
            DeadlineAction::Timeout { id, attempt } => {
                let Some(item) = shared.find_item(id) else {
                    return;
                };
                // a deadline popped out of the table just as its attempt
                // finished and retried applies only to that attempt
                if let Some(execute) = item.force_timeout(attempt) {
                    shared.stats.record_timed_out(execute);
                    warn!(%id, ?execute, "work timed out; late result will be discarded");
                }
            }
            DeadlineAction::Requeue(id) => {
                let Some(item) = shared.find_item(id) else {
                    return;
                };
                // the item may have been cancelled while waiting out its
                // retry interval
                if item.state() == crate::work::WorkState::Queued {
                    item.mark_enqueued();
                    shared.queue.push_internal(item);
                }
            }
        }
    }
}
