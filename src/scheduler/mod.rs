//! Timer-driven scheduling: one-shot delayed execution and recurring
//! execution on top of the pool.
//!
//! A single timer thread serves all entries. It is re-armed after every
//! firing to the soonest pending due time, never run as a fixed-rate ticker.
//! Entry-table mutation, next-due computation, and re-arming are serialized
//! under one lock so the timer can never arm against a stale minimum.

use crate::error::{BoxError, Error, Result};
use crate::pool::Pool;
use crate::work::{WorkId, WorkItem, WorkOptions};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

static ENTRY_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifier of a scheduled entry. A distinct namespace from [`WorkId`]:
/// one recurring entry produces many work items over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl EntryId {
    fn next() -> Self {
        EntryId(ENTRY_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sched-{}", self.0)
    }
}

/// A recurring computation. Each firing clones the handle into a fresh work
/// item; no lock guards the call, so overlapping firings never block a
/// worker on each other.
type SharedComputation =
    Arc<dyn Fn() -> std::result::Result<Box<dyn Any + Send>, BoxError> + Send + Sync>;

enum EntryKind {
    /// The work item already exists, held out of the ready queue until due.
    Delayed { item: Arc<WorkItem> },
    Recurring {
        computation: SharedComputation,
        options: WorkOptions,
        interval: Duration,
        max_runs: Option<u32>,
        runs: u32,
    },
}

struct ScheduledEntry {
    due: Instant,
    kind: EntryKind,
    /// The most recent work item this entry produced. EMPTY for a recurring
    /// entry that has not fired yet.
    target: WorkId,
}

struct SchedState {
    entries: HashMap<EntryId, ScheduledEntry>,
    disposed: bool,
}

struct SchedShared {
    state: Mutex<SchedState>,
    rearm: Condvar,
}

enum FireAction {
    Enqueue(Arc<WorkItem>),
    Spawn {
        entry: EntryId,
        computation: SharedComputation,
        options: WorkOptions,
    },
}

/// Delayed and recurring execution on top of a [`Pool`].
///
/// Dropping the scheduler cancels every pending entry and joins the timer
/// thread; already-fired work is unaffected.
pub struct Scheduler {
    pool: Arc<Pool>,
    shared: Arc<SchedShared>,
    timer: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(pool: Arc<Pool>) -> Result<Self> {
        let shared = Arc::new(SchedShared {
            state: Mutex::new(SchedState {
                entries: HashMap::new(),
                disposed: false,
            }),
            rearm: Condvar::new(),
        });

        let timer = {
            let shared = shared.clone();
            let pool = pool.clone();
            thread::Builder::new()
                .name("workpool-scheduler".to_string())
                .spawn(move || timer_loop(&shared, &pool))
                .map_err(|e| Error::scheduler(format!("spawn failed: {e}")))?
        };

        Ok(Self {
            pool,
            shared,
            timer: Some(timer),
        })
    }

    /// Runs the computation once, no sooner than `delay` from now.
    ///
    /// The work item is created immediately (so its eventual outcome can be
    /// fetched from the pool) but held out of the ready queue until due.
    /// Returns the entry ID; the produced [`WorkId`] is available via the
    /// pool once the entry fires.
    pub fn schedule_delayed<R, F>(
        &self,
        mut f: F,
        delay: Duration,
        options: WorkOptions,
    ) -> Result<EntryId>
    where
        R: Any + Send + 'static,
        F: FnMut() -> std::result::Result<R, BoxError> + Send + 'static,
    {
        let item = self.pool.register(
            Box::new(move || f().map(|v| Box::new(v) as Box<dyn Any + Send>)),
            options,
        )?;

        let id = EntryId::next();
        let due = Instant::now() + delay;
        let target = item.id;

        let mut state = self.shared.state.lock();
        if state.disposed {
            item.cancel_queued();
            return Err(Error::Disposed);
        }
        state.entries.insert(
            id,
            ScheduledEntry {
                due,
                kind: EntryKind::Delayed { item },
                target,
            },
        );
        drop(state);
        self.shared.rearm.notify_one();

        debug!(%id, ?delay, "scheduled delayed work");
        Ok(id)
    }

    /// Runs the computation every `interval`, optionally at most `max_runs`
    /// times. Each firing submits a brand-new work item with a fresh
    /// [`WorkId`]; the next due time is computed from the firing moment, so
    /// timer skew never accumulates backward. Firings bypass the queue's
    /// backpressure gate, so an admitted entry is never silently dropped
    /// under load.
    pub fn schedule_recurring<R, F>(
        &self,
        f: F,
        interval: Duration,
        max_runs: Option<u32>,
        options: WorkOptions,
    ) -> Result<EntryId>
    where
        R: Any + Send + 'static,
        F: Fn() -> std::result::Result<R, BoxError> + Send + Sync + 'static,
    {
        if interval.is_zero() {
            return Err(Error::invalid_argument("interval must be > 0"));
        }
        if max_runs == Some(0) {
            return Err(Error::invalid_argument("max_runs must be > 0"));
        }

        let computation: SharedComputation =
            Arc::new(move || f().map(|v| Box::new(v) as Box<dyn Any + Send>));

        let id = EntryId::next();
        let entry = ScheduledEntry {
            due: Instant::now() + interval,
            kind: EntryKind::Recurring {
                computation,
                options,
                interval,
                max_runs,
                runs: 0,
            },
            target: WorkId::EMPTY,
        };

        let mut state = self.shared.state.lock();
        if state.disposed {
            return Err(Error::Disposed);
        }
        state.entries.insert(id, entry);
        drop(state);
        self.shared.rearm.notify_one();

        debug!(%id, ?interval, ?max_runs, "scheduled recurring work");
        Ok(id)
    }

    /// Cancels a pending entry. Idempotent: a second cancellation of the
    /// same ID returns `false`.
    pub fn cancel(&self, id: EntryId) -> bool {
        let removed = self.shared.state.lock().entries.remove(&id);
        let Some(entry) = removed else {
            return false;
        };

        if let EntryKind::Delayed { item } = entry.kind {
            // the held work item never reaches the queue
            item.cancel_queued();
        }
        self.shared.rearm.notify_one();
        debug!(%id, "cancelled scheduled work");
        true
    }

    /// IDs of every entry still pending.
    pub fn active_ids(&self) -> Vec<EntryId> {
        let mut ids: Vec<EntryId> = self.shared.state.lock().entries.keys().copied().collect();
        ids.sort();
        ids
    }

    /// The most recent work item produced by an entry, when it exists.
    pub fn target_work_id(&self, id: EntryId) -> Option<WorkId> {
        self.shared
            .state
            .lock()
            .entries
            .get(&id)
            .map(|entry| entry.target)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("active_entries", &self.shared.state.lock().entries.len())
            .finish()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let entries = {
            let mut state = self.shared.state.lock();
            state.disposed = true;
            std::mem::take(&mut state.entries)
        };
        for (_, entry) in entries {
            if let EntryKind::Delayed { item } = entry.kind {
                item.cancel_queued();
            }
        }
        self.shared.rearm.notify_all();
        if let Some(timer) = self.timer.take() {
            let _ = timer.join();
        }
    }
}

/// Timer thread body. Sleeps until the soonest due time, fires due entries,
/// re-arms. An in-flight pass observes the disposed flag and exits without
/// scheduling further work.
fn timer_loop(shared: &SchedShared, pool: &Arc<Pool>) {
    loop {
        let actions = {
            let mut state = shared.state.lock();
            loop {
                if state.disposed {
                    return;
                }
                let now = Instant::now();
                let next_due = state.entries.values().map(|e| e.due).min();
                match next_due {
                    Some(due) if due <= now => break,
                    Some(due) => {
                        shared.rearm.wait_until(&mut state, due);
                    }
                    None => shared.rearm.wait(&mut state),
                }
            }

            collect_due(&mut state)
        };

        // submissions happen outside the entry-table lock; enqueuing is a
        // fast append, never an unbounded wait on the pool
        for action in actions {
            match action {
                FireAction::Enqueue(item) => {
                    trace!(id = %item.id, "delayed work due");
                    pool.enqueue_held(item);
                }
                FireAction::Spawn {
                    entry,
                    computation,
                    options,
                } => {
                    let submitted = pool
                        .register(Box::new(move || (*computation)()), options)
                        .map(|item| {
                            let work_id = item.id;
                            pool.enqueue_held(item);
                            work_id
                        });
                    finish_firing(shared, entry, submitted);
                }
            }
        }
    }
}

/// Pops every due entry into a list of actions. Runs under the entry-table
/// lock; the caller performs the actions afterwards, and recurring
/// bookkeeping happens in [`finish_firing`] once submission succeeded.
fn collect_due(state: &mut SchedState) -> Vec<FireAction> {
    let now = Instant::now();
    let mut actions = Vec::new();
    let due_ids: Vec<EntryId> = state
        .entries
        .iter()
        .filter(|(_, e)| e.due <= now)
        .map(|(id, _)| *id)
        .collect();

    for id in due_ids {
        let is_delayed = matches!(
            state.entries.get(&id),
            Some(ScheduledEntry {
                kind: EntryKind::Delayed { .. },
                ..
            })
        );

        if is_delayed {
            if let Some(ScheduledEntry {
                kind: EntryKind::Delayed { item },
                ..
            }) = state.entries.remove(&id)
            {
                actions.push(FireAction::Enqueue(item));
            }
        } else if let Some(ScheduledEntry {
            kind: EntryKind::Recurring {
                computation,
                options,
                ..
            },
            ..
        }) = state.entries.get(&id)
        {
            actions.push(FireAction::Spawn {
                entry: id,
                computation: Arc::clone(computation),
                options: options.clone(),
            });
        }
    }
    actions
}

/// Post-firing bookkeeping for a recurring entry. The run counter advances
/// only when a work item was actually handed to the pool, so `max_runs`
/// counts real submissions; a firing the pool rejects is retried at the
/// next interval instead of being counted.
fn finish_firing(shared: &SchedShared, entry: EntryId, submitted: Result<WorkId>) {
    let mut state = shared.state.lock();
    match submitted {
        Ok(work_id) => {
            trace!(%entry, %work_id, "recurring work fired");
            let mut exhausted = false;
            if let Some(e) = state.entries.get_mut(&entry) {
                e.target = work_id;
                let mut next_due = None;
                if let EntryKind::Recurring {
                    interval,
                    max_runs,
                    runs,
                    ..
                } = &mut e.kind
                {
                    *runs += 1;
                    if max_runs.is_some_and(|max| *runs >= max) {
                        exhausted = true;
                    } else {
                        // drift-correct against the firing moment, not the
                        // previous due time
                        next_due = Some(Instant::now() + *interval);
                    }
                }
                if let Some(due) = next_due {
                    e.due = due;
                }
            }
            if exhausted {
                state.entries.remove(&entry);
            }
        }
        Err(err) => {
            debug!(%entry, error = %err, "recurring firing not submitted");
            if let Some(e) = state.entries.get_mut(&entry) {
                let mut next_due = None;
                if let EntryKind::Recurring { interval, .. } = &e.kind {
                    next_due = Some(Instant::now() + *interval);
                }
                if let Some(due) = next_due {
                    e.due = due;
                }
            }
        }
    }
}
