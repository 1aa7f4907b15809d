//! One-shot timers with explicit cancellation.
//!
//! A [`Timer`] runs a future once after a delay. Scheduling returns a
//! [`TimerHandle`]; calling [`TimerHandle::cancel`] before the delay elapses
//! guarantees the future is never polled. Cancelling after the timer fired
//! is a no-op: work that already started is allowed to finish.
//!
//! Dropping a handle does **not** cancel the timer. Owners that want
//! "at most one pending timer" semantics must cancel the previous handle
//! before scheduling a new one.

use futures::future::BoxFuture;
use std::fmt;
use std::time::Duration;

/// Task executed when a timer fires.
pub type TimerTask = BoxFuture<'static, ()>;

/// Schedule-after-delay capability.
///
/// Implementations:
/// - `TokioTimer` in `ballotbox-runtime` (real time)
/// - `ManualTimer` in `ballotbox-testing` (deterministic, driven by tests)
pub trait Timer: Send + Sync {
    /// Run `task` once after `delay`.
    ///
    /// A zero delay means "as soon as possible", never synchronously inside
    /// this call.
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle;
}

/// Handle to a scheduled timer.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    /// Create a handle from a cancellation callback.
    #[must_use]
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Create a handle that cancels nothing.
    #[must_use]
    pub const fn detached() -> Self {
        Self { cancel: None }
    }

    /// Cancel the timer if it has not fired yet.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_cancel_invokes_callback_once() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let handle = TimerHandle::new(move || flag.store(true, Ordering::SeqCst));

        handle.cancel();
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_does_not_cancel() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let handle = TimerHandle::new(move || flag.store(true, Ordering::SeqCst));

        drop(handle);
        assert!(!cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_detached_handle_is_noop() {
        let handle = TimerHandle::detached();
        assert_eq!(format!("{handle:?}"), "TimerHandle { cancellable: false }");
        handle.cancel();
    }
}
