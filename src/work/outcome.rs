//! Terminal outcomes published through a work item's result slot.

use crate::error::BoxError;
use std::any::Any;
use std::fmt;

/// The captured failure of a computation, surfaced after retries are
/// exhausted or the retry predicate rejects another attempt.
pub struct WorkFailure {
    /// Human-readable description (error display or panic payload).
    pub message: String,
    /// The underlying error, when the computation returned one. Panics carry
    /// only the message.
    pub source: Option<BoxError>,
    /// Total number of times the computation was invoked.
    pub attempts: u32,
    /// Whether the failure came from a panic rather than a returned error.
    pub panicked: bool,
}

impl WorkFailure {
    pub(crate) fn from_error(err: BoxError) -> Self {
        Self {
            message: err.to_string(),
            source: Some(err),
            attempts: 0,
            panicked: false,
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };

        Self {
            message,
            source: None,
            attempts: 0,
            panicked: true,
        }
    }
}

impl fmt::Debug for WorkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkFailure")
            .field("message", &self.message)
            .field("attempts", &self.attempts)
            .field("panicked", &self.panicked)
            .finish()
    }
}

impl fmt::Display for WorkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.panicked {
            write!(f, "panicked after {} attempt(s): {}", self.attempts, self.message)
        } else {
            write!(f, "failed after {} attempt(s): {}", self.attempts, self.message)
        }
    }
}

/// What a unit of work ultimately became.
///
/// Exactly one outcome is written per work item, at its terminal transition.
/// Cancellation and timeout are distinct terminal kinds, never conflated with
/// [`WorkOutcome::Faulted`].
pub enum WorkOutcome {
    /// The computation returned a value.
    Completed(Box<dyn Any + Send>),
    /// The computation failed (returned an error or panicked) and the retry
    /// policy gave up.
    Faulted(WorkFailure),
    /// The work's cancellation token was signaled before or during execution.
    Cancelled,
    /// The watchdog deadline elapsed; any late value or error was discarded.
    TimedOut,
}

impl WorkOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, WorkOutcome::Completed(_))
    }

    /// Downcasts a completed value, consuming the outcome.
    ///
    /// Returns `None` for non-completed outcomes or a type mismatch.
    pub fn into_value<T: 'static>(self) -> Option<T> {
        match self {
            WorkOutcome::Completed(boxed) => boxed.downcast::<T>().ok().map(|b| *b),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&WorkFailure> {
        match self {
            WorkOutcome::Faulted(failure) => Some(failure),
            _ => None,
        }
    }
}

impl fmt::Debug for WorkOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkOutcome::Completed(_) => f.write_str("Completed(..)"),
            WorkOutcome::Faulted(failure) => write!(f, "Faulted({failure:?})"),
            WorkOutcome::Cancelled => f.write_str("Cancelled"),
            WorkOutcome::TimedOut => f.write_str("TimedOut"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_value_downcast() {
        let outcome = WorkOutcome::Completed(Box::new(42i32));
        assert_eq!(outcome.into_value::<i32>(), Some(42));

        let outcome = WorkOutcome::Completed(Box::new("hi".to_string()));
        assert_eq!(outcome.into_value::<i32>(), None);

        assert_eq!(WorkOutcome::Cancelled.into_value::<i32>(), None);
    }

    #[test]
    fn test_panic_payload_message() {
        let failure = WorkFailure::from_panic(Box::new("boom"));
        assert_eq!(failure.message, "boom");
        assert!(failure.panicked);

        let failure = WorkFailure::from_panic(Box::new(7u8));
        assert_eq!(failure.message, "unknown panic");
    }
}
