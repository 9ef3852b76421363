use crate::work::WorkId;

pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error type carried by failing computations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("queue full (limit {limit})")]
    QueueFull { limit: usize },

    #[error("operation cancelled")]
    Cancelled,

    #[error("wait timed out")]
    WaitTimeout,

    #[error("unknown work id: {0}")]
    UnknownWork(WorkId),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("pool is shut down")]
    Disposed,

    /// Reserved for recurring-entry dependency cycles; not produced yet.
    #[error("scheduled work dependency cycle")]
    DependencyCycle,
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn scheduler<S: Into<String>>(msg: S) -> Self {
        Error::Scheduler(msg.into())
    }
}
