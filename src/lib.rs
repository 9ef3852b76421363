//! workpool - a priority worker-thread pool
//!
//! A general-purpose worker-thread pool built on OS threads and lock/condvar
//! primitives: priority-ordered dispatch, one-shot delayed execution,
//! recurring execution, cooperative cancellation, bounded retry with
//! back-off, per-work timeout enforcement, and execution statistics.
//!
//! # Quick Start
//!
//! ```no_run
//! use workpool::{Pool, PoolConfig, Priority, WorkOptions};
//! use std::time::Duration;
//!
//! let pool = Pool::new(PoolConfig::builder().max_threads(4).build()?)?;
//!
//! let options = WorkOptions::builder()
//!     .priority(Priority::High)
//!     .timeout(Duration::from_secs(5))
//!     .max_retries(2)
//!     .build()?;
//!
//! let id = pool.submit_with(|| Ok(6 * 7), options)?;
//! let outcome = pool.fetch(id, Some(Duration::from_secs(10)))?;
//! assert_eq!(outcome.into_value::<i32>(), Some(42));
//! # Ok::<(), workpool::Error>(())
//! ```
//!
//! # Features
//!
//! - **Priority lanes**: Critical > High > Normal > Low, FIFO within a lane
//! - **Scheduling**: one-shot delayed and drift-corrected recurring work
//! - **Cooperative cancellation**: reusable tokens polled by computations
//! - **Retry policy**: bounded retries with an interval and a predicate
//! - **Timeout watchdog**: best-effort, the pool stops waiting; the
//!   computation itself halts only when it observes its token
//! - **Statistics**: counts plus queue-wait and execute duration averages
//!
//! Logging goes through the [`tracing`] facade; install whatever subscriber
//! suits the host application.

#![warn(missing_debug_implementations)]

pub mod cancel;
pub mod config;
pub mod error;
pub mod pool;
pub mod queue;
pub mod scheduler;
pub mod stats;
pub mod work;

pub use cancel::{CancellationToken, CancellationTokenSource};
pub use config::{PoolConfig, PoolConfigBuilder, ThreadPriorityHint};
pub use error::{BoxError, Error, Result};
pub use pool::Pool;
pub use queue::Priority;
pub use scheduler::{EntryId, Scheduler};
pub use stats::PoolStats;
pub use work::{WorkFailure, WorkId, WorkOptions, WorkOptionsBuilder, WorkOutcome, WorkState};
