//! Tokio-backed implementation of [`Timer`].

use ballotbox_core::timer::{Timer, TimerHandle, TimerTask};
use std::time::Duration;
use tokio::sync::oneshot;

/// Timer that spawns one Tokio task per scheduled delay.
///
/// Cancellation is delivered over a oneshot channel and only races the
/// sleep: once the delay has elapsed the task runs to completion even if
/// the handle is cancelled afterwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

impl TokioTimer {
    /// Create a new timer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Timer for TokioTimer {
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => task.await,
                // A dropped handle closes the channel without a value; that
                // disables this branch instead of cancelling.
                Ok(()) = cancel_rx => {
                    tracing::trace!("Timer cancelled before firing");
                }
            }
        });

        TimerHandle::new(move || {
            cancel_tx.send(()).ok();
        })
    }
}
