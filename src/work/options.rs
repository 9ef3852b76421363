//! Per-work configuration, immutable once built.

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::queue::Priority;
use crate::work::outcome::WorkFailure;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Predicate deciding whether a given failure should be retried.
pub type RetryPredicate = Arc<dyn Fn(&WorkFailure) -> bool + Send + Sync>;

/// Timeouts above ten seconds (or absent) mark the work as long-running.
const LONG_RUNNING_THRESHOLD: Duration = Duration::from_secs(10);

/// Options attached to a single unit of work.
///
/// Immutable once constructed; build with [`WorkOptions::builder`].
#[derive(Clone)]
pub struct WorkOptions {
    /// Per-work timeout. `None` means the pool-wide default applies; an
    /// explicit zero disables the timeout entirely.
    pub(crate) timeout: Option<Duration>,
    pub(crate) max_retries: u32,
    pub(crate) retry_interval: Duration,
    pub(crate) retry_when: Option<RetryPredicate>,
    pub(crate) token: Option<CancellationToken>,
    pub(crate) priority: Priority,
    pub(crate) name: Option<String>,
    pub(crate) tag: Option<Arc<dyn Any + Send + Sync>>,
}

impl WorkOptions {
    pub fn builder() -> WorkOptionsBuilder {
        WorkOptionsBuilder::new()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn token(&self) -> Option<&CancellationToken> {
        self.token.as_ref()
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn tag(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.tag.as_ref()
    }

    /// Derived hint: work without a finite timeout, or with a generous one,
    /// is considered long-running.
    pub fn long_running(&self) -> bool {
        match self.timeout {
            None => true,
            Some(t) => t.is_zero() || t > LONG_RUNNING_THRESHOLD,
        }
    }

    pub(crate) fn should_retry(&self, failure: &WorkFailure) -> bool {
        match &self.retry_when {
            Some(pred) => pred(failure),
            None => true,
        }
    }
}

impl Default for WorkOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            max_retries: 0,
            retry_interval: Duration::ZERO,
            retry_when: None,
            token: None,
            priority: Priority::Normal,
            name: None,
            tag: None,
        }
    }
}

impl fmt::Debug for WorkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkOptions")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_interval", &self.retry_interval)
            .field("priority", &self.priority)
            .field("name", &self.name)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct WorkOptionsBuilder {
    options: WorkOptions,
}

impl WorkOptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: WorkOptions::default(),
        }
    }

    /// Sets the per-work timeout. `Duration::ZERO` disables the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.options.max_retries = retries;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.options.retry_interval = interval;
        self
    }

    /// Given the failure, decide whether another attempt is worthwhile.
    /// Absent a predicate, every failure is retried up to `max_retries`.
    pub fn retry_when<F>(mut self, pred: F) -> Self
    where
        F: Fn(&WorkFailure) -> bool + Send + Sync + 'static,
    {
        self.options.retry_when = Some(Arc::new(pred));
        self
    }

    pub fn token(mut self, token: CancellationToken) -> Self {
        self.options.token = Some(token);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.options.priority = priority;
        self
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.options.name = Some(name.into());
        self
    }

    /// Arbitrary user data carried alongside the work.
    pub fn tag<T: Any + Send + Sync>(mut self, tag: T) -> Self {
        self.options.tag = Some(Arc::new(tag));
        self
    }

    pub fn build(self) -> Result<WorkOptions> {
        if let Some(timeout) = self.options.timeout {
            if timeout.as_millis() > u64::MAX as u128 {
                return Err(Error::invalid_argument(
                    "timeout exceeds representable millisecond range",
                ));
            }
        }
        Ok(self.options)
    }
}
