use crate::error::{Error, Result};
use std::time::Duration;

/// OS-level scheduling hint for worker threads.
///
/// Applied as niceness on Linux, best-effort and logged on failure; a no-op
/// on other platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadPriorityHint {
    Low,
    #[default]
    Normal,
    High,
}

impl ThreadPriorityHint {
    #[cfg(target_os = "linux")]
    pub(crate) fn nice_value(self) -> Option<i32> {
        match self {
            ThreadPriorityHint::Low => Some(10),
            ThreadPriorityHint::Normal => None,
            ThreadPriorityHint::High => Some(-5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Worker thread count. `None` derives 2x hardware parallelism.
    pub max_threads: Option<usize>,
    /// Bound on pending queue depth; exceeding it surfaces
    /// [`Error::QueueFull`](crate::Error::QueueFull) to the submitter.
    pub queue_limit: usize,
    /// Pool-wide default timeout applied when a work item carries none.
    /// `None` disables the default.
    pub default_timeout: Option<Duration>,
    pub enable_stats: bool,
    /// When set, the pool accepts work but dispatches nothing until
    /// [`Pool::start`](crate::Pool::start) is called.
    pub start_suspended: bool,
    pub thread_name_prefix: String,
    /// When set, shutdown signals the workers but does not join them.
    pub background_threads: bool,
    pub thread_priority: ThreadPriorityHint,
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_threads: None,
            queue_limit: 100,
            default_timeout: Some(Duration::from_secs(3600)),
            enable_stats: true,
            start_suspended: false,
            thread_name_prefix: "workpool-worker".to_string(),
            background_threads: false,
            thread_priority: ThreadPriorityHint::default(),
            stack_size: Some(2 * 1024 * 1024),
        }
    }
}

impl PoolConfig {
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.max_threads {
            if n == 0 {
                return Err(Error::config("max_threads must be > 0"));
            }
            if n > 1024 {
                return Err(Error::config("max_threads too large (max 1024)"));
            }
        }

        if self.queue_limit == 0 {
            return Err(Error::config("queue_limit must be > 0"));
        }

        if let Some(timeout) = self.default_timeout {
            if timeout.is_zero() {
                return Err(Error::config("default_timeout must be > 0"));
            }
            if timeout.as_millis() > u64::MAX as u128 {
                return Err(Error::config(
                    "default_timeout exceeds representable millisecond range",
                ));
            }
        }

        Ok(())
    }

    pub fn worker_threads(&self) -> usize {
        self.max_threads.unwrap_or_else(|| 2 * num_cpus::get())
    }
}

#[derive(Debug, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
        }
    }

    pub fn max_threads(mut self, n: usize) -> Self {
        self.config.max_threads = Some(n);
        self
    }

    pub fn queue_limit(mut self, limit: usize) -> Self {
        self.config.queue_limit = limit;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = Some(timeout);
        self
    }

    /// Removes the pool-wide default timeout.
    pub fn no_default_timeout(mut self) -> Self {
        self.config.default_timeout = None;
        self
    }

    pub fn enable_stats(mut self, enable: bool) -> Self {
        self.config.enable_stats = enable;
        self
    }

    pub fn start_suspended(mut self, suspended: bool) -> Self {
        self.config.start_suspended = suspended;
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn background_threads(mut self, background: bool) -> Self {
        self.config.background_threads = background;
        self
    }

    pub fn thread_priority(mut self, priority: ThreadPriorityHint) -> Self {
        self.config.thread_priority = priority;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn build(self) -> Result<PoolConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
