//! # Ballotbox Testing
//!
//! Testing utilities for the Ballotbox auth subsystem.
//!
//! This crate provides:
//! - [`ManualClock`]: time that only moves when a test says so
//! - [`ManualTimer`]: a [`Timer`](ballotbox_core::timer::Timer) whose tasks
//!   fire when the test advances time, in fire-time order
//! - [`Recorder`]: collects values from callbacks (event handlers, hooks)
//! - [`init_test_tracing`]: log output for failing tests
//!
//! ## Example
//!
//! ```
//! use ballotbox_core::environment::Clock;
//! use ballotbox_core::timer::Timer;
//! use ballotbox_testing::{ManualTimer, test_clock};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let clock = test_clock();
//! let timer = ManualTimer::new(clock.clone());
//! let _handle = timer.schedule(Duration::from_secs(300), Box::pin(async {}));
//!
//! assert_eq!(timer.pending_count(), 1);
//! assert_eq!(timer.advance(Duration::from_secs(300)).await, 1);
//! assert_eq!(timer.pending_count(), 0);
//! # });
//! ```

/// Mock implementations of environment traits.
pub mod mocks {
    use ballotbox_core::environment::{Clock, to_chrono};
    use ballotbox_core::timer::{Timer, TimerHandle, TimerTask};
    use chrono::{DateTime, Utc};
    use std::fmt;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        now: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock frozen at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                now: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward by `by`.
        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
            *now += to_chrono(by);
        }

        /// Set the clock to `time` (may move backwards).
        pub fn set(&self, time: DateTime<Utc>) {
            *self.now.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default manual clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> ManualClock {
        ManualClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    struct Entry {
        id: u64,
        fires_at: DateTime<Utc>,
        task: TimerTask,
    }

    #[derive(Default)]
    struct Pending {
        next_id: u64,
        entries: Vec<Entry>,
    }

    /// Deterministic timer driven by a [`ManualClock`].
    ///
    /// Scheduled tasks never run on their own. [`ManualTimer::advance`]
    /// moves the clock forward, stopping at each due fire time in order and
    /// awaiting that task before looking for the next one, so tasks that
    /// schedule follow-up timers behave exactly as they would in real time.
    #[derive(Clone)]
    pub struct ManualTimer {
        clock: ManualClock,
        pending: Arc<Mutex<Pending>>,
    }

    impl ManualTimer {
        /// Create a timer reading and advancing `clock`.
        #[must_use]
        pub fn new(clock: ManualClock) -> Self {
            Self {
                clock,
                pending: Arc::new(Mutex::new(Pending::default())),
            }
        }

        /// The clock this timer drives.
        #[must_use]
        pub const fn clock(&self) -> &ManualClock {
            &self.clock
        }

        /// Number of scheduled, not yet fired or cancelled, tasks.
        #[must_use]
        pub fn pending_count(&self) -> usize {
            self.lock().entries.len()
        }

        /// Fire times of all pending tasks, earliest first.
        #[must_use]
        pub fn fire_times(&self) -> Vec<DateTime<Utc>> {
            let mut times: Vec<_> = self.lock().entries.iter().map(|e| e.fires_at).collect();
            times.sort();
            times
        }

        /// Earliest pending fire time.
        #[must_use]
        pub fn next_fire_at(&self) -> Option<DateTime<Utc>> {
            self.lock().entries.iter().map(|e| e.fires_at).min()
        }

        /// Advance time by `by`, firing every task that becomes due.
        ///
        /// Returns the number of tasks fired.
        pub async fn advance(&self, by: Duration) -> usize {
            let target = self.clock.now() + to_chrono(by);
            let mut fired = 0;

            while let Some((fires_at, task)) = self.take_due(target) {
                if fires_at > self.clock.now() {
                    self.clock.set(fires_at);
                }
                task.await;
                fired += 1;
            }

            if target > self.clock.now() {
                self.clock.set(target);
            }
            fired
        }

        /// Fire every task that is already due without moving time.
        pub async fn run_due(&self) -> usize {
            self.advance(Duration::ZERO).await
        }

        fn take_due(&self, target: DateTime<Utc>) -> Option<(DateTime<Utc>, TimerTask)> {
            let mut pending = self.lock();
            let index = pending
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.fires_at <= target)
                .min_by_key(|(_, e)| (e.fires_at, e.id))
                .map(|(i, _)| i)?;
            let entry = pending.entries.remove(index);
            Some((entry.fires_at, entry.task))
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, Pending> {
            self.pending.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl Timer for ManualTimer {
        fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
            let fires_at = self.clock.now() + to_chrono(delay);
            let id = {
                let mut pending = self.lock();
                let id = pending.next_id;
                pending.next_id += 1;
                pending.entries.push(Entry { id, fires_at, task });
                id
            };

            let pending = Arc::downgrade(&self.pending);
            TimerHandle::new(move || {
                if let Some(pending) = pending.upgrade() {
                    pending
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .entries
                        .retain(|e| e.id != id);
                }
            })
        }
    }

    impl fmt::Debug for ManualTimer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ManualTimer")
                .field("now", &self.clock.now())
                .field("fire_times", &self.fire_times())
                .finish()
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use std::sync::{Arc, Mutex, PoisonError};

    /// Collects values pushed from callbacks.
    ///
    /// Clones share the same buffer, so one clone can be moved into a
    /// handler while the test keeps another for assertions.
    #[derive(Debug)]
    pub struct Recorder<T> {
        items: Arc<Mutex<Vec<T>>>,
    }

    impl<T> Clone for Recorder<T> {
        fn clone(&self) -> Self {
            Self {
                items: Arc::clone(&self.items),
            }
        }
    }

    impl<T> Default for Recorder<T> {
        fn default() -> Self {
            Self {
                items: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl<T: Clone> Recorder<T> {
        /// Create an empty recorder.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Append a value.
        pub fn push(&self, item: T) {
            self.items
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(item);
        }

        /// Copy of everything recorded so far.
        #[must_use]
        pub fn items(&self) -> Vec<T> {
            self.items
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Number of recorded values.
        #[must_use]
        pub fn len(&self) -> usize {
            self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        /// Returns `true` if nothing was recorded.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    /// Install a `tracing` subscriber writing to the test harness.
    ///
    /// Honors `RUST_LOG`; safe to call from every test.
    pub fn init_test_tracing() {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init()
            .ok();
    }
}

// Re-export commonly used items
pub use helpers::{Recorder, init_test_tracing};
pub use mocks::{ManualClock, ManualTimer, test_clock};
