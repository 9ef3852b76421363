//! The pool engine: worker threads contending on one shared priority queue,
//! plus the deadline monitor that enforces timeouts and delayed retries.

pub(crate) mod monitor;
pub(crate) mod worker;

use crate::config::PoolConfig;
use crate::error::{BoxError, Error, Result};
use crate::queue::PriorityQueue;
use crate::stats::{PoolStats, StatsCollector};
use crate::work::{Computation, WorkId, WorkItem, WorkOptions, WorkOutcome, WorkState};
use monitor::Monitor;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use worker::Worker;

/// State shared between the public handle, the workers, and the monitor.
pub(crate) struct PoolShared {
    pub config: PoolConfig,
    pub queue: PriorityQueue,
    pub registry: Mutex<HashMap<WorkId, Arc<WorkItem>>>,
    pub stats: StatsCollector,
    pub monitor: Monitor,
    pub disposed: AtomicBool,
}

impl PoolShared {
    pub fn find_item(&self, id: WorkId) -> Option<Arc<WorkItem>> {
        self.registry.lock().get(&id).cloned()
    }

    /// Per-work timeout, falling back to the pool-wide default. An explicit
    /// zero disables the watchdog entirely.
    pub fn effective_timeout(&self, options: &WorkOptions) -> Option<Duration> {
        match options.timeout() {
            Some(t) if t.is_zero() => None,
            Some(t) => Some(t),
            None => self.config.default_timeout,
        }
    }
}

/// A priority worker-thread pool.
///
/// Work submitted through [`Pool::submit`] is ordered by priority lane,
/// executed on a fixed set of worker threads, retried per its options, and
/// bounded by a watchdog timeout. Cancellation is cooperative throughout:
/// signaling a token or hitting a timeout guarantees only that the pool stops
/// waiting on the computation, never that the computation itself halts.
pub struct Pool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
    monitor_thread: Option<JoinHandle<()>>,
}

impl Pool {
    /// Builds the pool and spawns its threads. Fails fast on an invalid
    /// configuration.
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let num_threads = config.worker_threads();
        let shared = Arc::new(PoolShared {
            queue: PriorityQueue::new(config.queue_limit, config.start_suspended),
            registry: Mutex::new(HashMap::new()),
            stats: StatsCollector::new(config.enable_stats),
            monitor: Monitor::new(),
            disposed: AtomicBool::new(false),
            config,
        });

        let mut workers = Vec::with_capacity(num_threads);
        for id in 0..num_threads {
            let shared_clone = shared.clone();
            let name = format!("{}-{}", shared.config.thread_name_prefix, id);

            let mut builder = thread::Builder::new().name(name);
            if let Some(stack_size) = shared.config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let handle = builder
                .spawn(move || Worker::new(id).run(shared_clone))
                .map_err(|e| Error::config(format!("spawn failed: {e}")))?;
            workers.push(handle);
        }

        let monitor_thread = {
            let shared_clone = shared.clone();
            let name = format!("{}-monitor", shared.config.thread_name_prefix);
            thread::Builder::new()
                .name(name)
                .spawn(move || shared_clone.monitor.run(&shared_clone))
                .map_err(|e| Error::config(format!("spawn failed: {e}")))?
        };

        info!(
            threads = num_threads,
            suspended = shared.config.start_suspended,
            "pool started"
        );

        Ok(Self {
            shared,
            workers,
            monitor_thread: Some(monitor_thread),
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(PoolConfig::default())
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Releases a pool built with `start_suspended`; until this is called the
    /// pool accepts work but dispatches nothing.
    pub fn start(&self) {
        if self.shared.queue.is_paused() {
            info!("pool dispatch resumed");
        }
        self.shared.queue.resume();
    }

    /// Submits a computation with default options. Non-blocking; the work
    /// runs asynchronously and the result is retrieved via [`Pool::fetch`].
    pub fn submit<R, F>(&self, f: F) -> Result<WorkId>
    where
        R: Any + Send + 'static,
        F: FnMut() -> std::result::Result<R, BoxError> + Send + 'static,
    {
        self.submit_with(f, WorkOptions::default())
    }

    /// Submits a computation with explicit options.
    pub fn submit_with<R, F>(&self, mut f: F, options: WorkOptions) -> Result<WorkId>
    where
        R: Any + Send + 'static,
        F: FnMut() -> std::result::Result<R, BoxError> + Send + 'static,
    {
        self.submit_boxed(
            Box::new(move || f().map(|v| Box::new(v) as Box<dyn Any + Send>)),
            options,
        )
    }

    /// Variant binding a single argument which is passed to the computation
    /// on every attempt.
    pub fn submit_with_arg<A, R, F>(&self, mut f: F, arg: A, options: WorkOptions) -> Result<WorkId>
    where
        A: Send + 'static,
        R: Any + Send + 'static,
        F: FnMut(&A) -> std::result::Result<R, BoxError> + Send + 'static,
    {
        self.submit_boxed(
            Box::new(move || f(&arg).map(|v| Box::new(v) as Box<dyn Any + Send>)),
            options,
        )
    }

    pub(crate) fn submit_boxed(
        &self,
        computation: Computation,
        options: WorkOptions,
    ) -> Result<WorkId> {
        let item = self.register(computation, options)?;
        let id = item.id;

        if let Err(e) = self.shared.queue.push(item) {
            self.shared.registry.lock().remove(&id);
            return Err(e);
        }

        self.shared.stats.record_submitted();
        debug!(%id, "work queued");
        Ok(id)
    }

    /// Creates and registers a work item without enqueuing it; the scheduler
    /// holds delayed work this way until its due time.
    pub(crate) fn register(
        &self,
        computation: Computation,
        options: WorkOptions,
    ) -> Result<Arc<WorkItem>> {
        if self.shared.disposed.load(Ordering::Acquire) {
            return Err(Error::Disposed);
        }
        let item = Arc::new(WorkItem::new(WorkId::next(), computation, options));
        self.shared.registry.lock().insert(item.id, item.clone());
        Ok(item)
    }

    /// Moves a registered-but-unqueued item into the ready queue, bypassing
    /// the backpressure gate; the scheduler uses this for delayed work at
    /// its due time and for recurring firings. A no-op when the item was
    /// cancelled while held.
    pub(crate) fn enqueue_held(&self, item: Arc<WorkItem>) {
        if item.state() != WorkState::Queued {
            return;
        }
        item.mark_enqueued();
        self.shared.stats.record_submitted();
        self.shared.queue.push_internal(item);
    }

    /// Blocks until the work reaches a terminal state, then moves its outcome
    /// out of the pool. The wait timeout is independent of the work's own
    /// execution timeout; elapsing surfaces [`Error::WaitTimeout`] and leaves
    /// the work tracked. A fetched item is forgotten; fetching the same ID
    /// again yields [`Error::UnknownWork`].
    pub fn fetch(&self, id: WorkId, wait_timeout: Option<Duration>) -> Result<WorkOutcome> {
        let item = self
            .shared
            .find_item(id)
            .ok_or(Error::UnknownWork(id))?;

        if !item.wait_terminal(wait_timeout) {
            return Err(Error::WaitTimeout);
        }

        let outcome = item.take_outcome();
        self.shared.registry.lock().remove(&id);
        outcome.ok_or(Error::UnknownWork(id))
    }

    /// Blocks until every work item tracked at call time is terminal. Work
    /// submitted concurrently during the wait is not covered.
    pub fn wait_all(&self, wait_timeout: Option<Duration>) -> Result<()> {
        let items: Vec<Arc<WorkItem>> = self.shared.registry.lock().values().cloned().collect();
        let deadline = wait_timeout.map(|t| Instant::now() + t);

        for item in items {
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::WaitTimeout);
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            if !item.wait_terminal(remaining) {
                return Err(Error::WaitTimeout);
            }
        }
        Ok(())
    }

    /// Signals cancellation on every tracked work item that carries a token
    /// and cancels everything still sitting in the queue.
    pub fn cancel_all(&self) {
        let items: Vec<Arc<WorkItem>> = self.shared.registry.lock().values().cloned().collect();
        for item in &items {
            if let Some(token) = item.options.token() {
                token.cancel();
            }
        }

        let drained = self.shared.queue.drain();
        let mut cancelled = 0usize;
        for item in drained {
            if item.cancel_queued() {
                self.shared.stats.record_cancelled(None);
                cancelled += 1;
            }
        }
        info!(cancelled, "cancelled pending work");
    }

    /// Read-only snapshot of execution statistics.
    pub fn stats(&self) -> PoolStats {
        self.shared.stats.snapshot(self.shared.queue.len())
    }

    /// Pending work in one priority lane, for diagnostics.
    pub fn queued_by_priority(&self, priority: crate::queue::Priority) -> usize {
        self.shared.queue.lane_len(priority)
    }

    /// Pending work in lane-then-FIFO order, for diagnostics.
    pub fn pending_ids(&self) -> Vec<WorkId> {
        self.shared
            .queue
            .snapshot()
            .iter()
            .map(|item| item.id)
            .collect()
    }

    /// Signals shutdown and, unless the pool runs background threads, joins
    /// the workers. Queued-but-unstarted work does not run.
    pub fn shutdown(&mut self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.queue.shutdown();
        self.shared.monitor.shutdown();

        let monitor_thread = self.monitor_thread.take();
        if self.shared.config.background_threads {
            // detach; threads observe the shutdown flags on their own
            self.workers.clear();
            drop(monitor_thread);
        } else {
            for handle in self.workers.drain(..) {
                let _ = handle.join();
            }
            if let Some(handle) = monitor_thread {
                let _ = handle.join();
            }
        }
        info!("pool shut down");
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("threads", &self.workers.len())
            .field("queued", &self.shared.queue.len())
            .field("suspended", &self.shared.queue.is_paused())
            .finish()
    }
}
