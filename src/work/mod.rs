//! Work item data model.
//!
//! A work item couples one deferred computation with its options, its
//! lifecycle state, and a write-once result slot. The pool owns items
//! exclusively from enqueue to terminal state; callers hold only a
//! [`WorkId`].

pub mod id;
pub mod item;
pub mod options;
pub mod outcome;

pub use id::WorkId;
pub use item::WorkState;
pub use options::{RetryPredicate, WorkOptions, WorkOptionsBuilder};
pub use outcome::{WorkFailure, WorkOutcome};

pub(crate) use item::{Computation, StartDecision, WorkItem};
