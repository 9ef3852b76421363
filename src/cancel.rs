//! Cooperative cancellation primitive.
//!
//! A [`CancellationTokenSource`] owns exactly one [`CancellationToken`]; the
//! token is cloned (shared, never copied) into every work item that wants to
//! be cancellation-aware. Cancellation is strictly cooperative: the pool never
//! interrupts a running computation. Signaling a token only guarantees that
//! the pool stops waiting on the work; the computation itself keeps running
//! until it checks the token and bails out.
//!
//! Unlike one-shot cancellation designs, tokens here are reusable: `reset`
//! clears the flag so the same token can be attached to later submissions.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag observed by work items.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Pure read of the shared flag.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Fails with [`Error::Cancelled`] iff the flag is set.
    ///
    /// This is the only mechanism by which a long-running computation can
    /// cooperatively abort itself.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Clears the flag, permitting reuse across submissions.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// Whether two handles refer to the same underlying flag cell.
    pub fn same_token(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.flag, &other.flag)
    }

    pub(crate) fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

/// Exclusive owner of one token; the only entity permitted to cancel it.
#[derive(Debug)]
pub struct CancellationTokenSource {
    token: CancellationToken,
}

impl CancellationTokenSource {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A shared handle to the owned token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Sets the flag. Idempotent; every holder observes the cancellation
    /// once this returns.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Default for CancellationTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_visible_to_all_holders() {
        let source = CancellationTokenSource::new();
        let a = source.token();
        let b = a.clone();

        assert!(!a.is_cancelled());
        source.cancel();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[test]
    fn test_check_fails_when_cancelled() {
        let source = CancellationTokenSource::new();
        let token = source.token();

        assert!(token.check().is_ok());
        source.cancel();
        assert!(matches!(token.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_reset_makes_token_reusable() {
        let source = CancellationTokenSource::new();
        let token = source.token();

        source.cancel();
        assert!(token.is_cancelled());

        token.reset();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());

        // can be cancelled again after reset
        source.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_token_identity() {
        let source = CancellationTokenSource::new();
        let a = source.token();
        let b = source.token();
        let other = CancellationTokenSource::new().token();

        assert!(a.same_token(&b));
        assert!(!a.same_token(&other));
    }
}
