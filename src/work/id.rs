use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global work ID counter. Starts at 1; 0 is the EMPTY sentinel.
static WORK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque unique identifier for a unit of work.
///
/// A `WorkId`, once issued, maps to at most one work item for its entire
/// lifetime. [`WorkId::EMPTY`] is never issued and compares unequal to every
/// real ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkId(u64);

impl WorkId {
    /// Sentinel value distinct from any issued ID.
    pub const EMPTY: WorkId = WorkId(0);

    pub(crate) fn next() -> Self {
        WorkId(WORK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "work-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = WorkId::next();
        let b = WorkId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_sentinel() {
        assert!(WorkId::EMPTY.is_empty());
        assert!(!WorkId::next().is_empty());
        assert_ne!(WorkId::next(), WorkId::EMPTY);
    }
}
