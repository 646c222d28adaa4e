//! Cancellation token threaded through every adapter boundary.
//!
//! The core never blocks without honoring it (spec.md §5): every
//! `BackendAdapter`/`RuntimeAdapter` I/O method takes a [`CancelToken`] and
//! is expected to check it at its next suspension point. The core does not
//! roll back already-committed side effects on cancellation; that is the
//! adapter's responsibility.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative cancellation flag, cheap to clone and share across an
/// adapter call tree.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let tok = CancelToken::new();
        assert!(!tok.is_cancelled());
    }

    #[test]
    fn cancel_is_observed_through_clones() {
        let tok = CancelToken::new();
        let clone = tok.clone();
        clone.cancel();
        assert!(tok.is_cancelled());
    }
}
