//! Cooperative cancellation.
//!
//! One [`CancelToken`] is owned by the orchestrator and observed at every
//! blocking point: lock acquisition, child-process waits, retry pauses.
//! Signal handlers trip the token through a clone; handlers only perform an
//! atomic store, which is async-signal-safe.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A monotonic, cloneable cancellation flag.
///
/// Once [`cancel`](CancelToken::cancel) has been called the token stays
/// tripped for the rest of the run; cancellation is not resumable.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    tripped: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, untripped token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the token. Safe to call from a signal handler.
    pub fn cancel(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}
