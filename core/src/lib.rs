//! # Ballotbox Core
//!
//! Dependency traits for the Ballotbox authentication resilience subsystem.
//!
//! Everything that touches time, timers, or durable client-side storage is
//! abstracted here so that the auth crate can be driven by production
//! implementations (`ballotbox-runtime`) or deterministic fakes
//! (`ballotbox-testing`) without changing a line of logic.
//!
//! ## Core Concepts
//!
//! - **Clock**: the current instant, injected rather than read ambiently
//! - **Timer**: schedule-after-delay with explicit cancellation
//! - **`DurableStore`**: key/value persistence with change notifications
//!
//! ## Example
//!
//! ```ignore
//! use ballotbox_core::environment::Clock;
//! use ballotbox_core::timer::Timer;
//!
//! fn schedule_refresh(clock: &dyn Clock, timer: &dyn Timer) {
//!     let handle = timer.schedule(Duration::from_secs(300), Box::pin(async {
//!         // refresh the session
//!     }));
//!     // Later: handle.cancel();
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Timer abstraction for scheduled work.
pub mod timer;

/// Durable key/value store abstraction with change notifications.
pub mod store;

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// into the components that need them.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use ballotbox_core::environment::Clock;
    /// use chrono::{DateTime, Utc};
    ///
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    ///
    /// let clock = FixedClock { time: Utc::now() };
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Convert a (possibly negative) `chrono` duration into a `std` delay,
    /// clamping anything in the past to zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use ballotbox_core::environment::delay_until;
    /// use chrono::Duration;
    /// use std::time::Duration as StdDuration;
    ///
    /// assert_eq!(delay_until(Duration::seconds(-5)), StdDuration::ZERO);
    /// assert_eq!(delay_until(Duration::seconds(5)), StdDuration::from_secs(5));
    /// ```
    #[must_use]
    pub fn delay_until(remaining: chrono::Duration) -> std::time::Duration {
        remaining.to_std().unwrap_or(std::time::Duration::ZERO)
    }

    /// Convert a `std` delay into a `chrono` duration, saturating at roughly
    /// a thousand years for delays chrono cannot represent.
    ///
    /// # Examples
    ///
    /// ```
    /// use ballotbox_core::environment::to_chrono;
    /// use std::time::Duration;
    ///
    /// assert_eq!(to_chrono(Duration::from_secs(90)), chrono::Duration::seconds(90));
    /// ```
    #[must_use]
    pub fn to_chrono(delay: std::time::Duration) -> chrono::Duration {
        chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::weeks(52_000))
    }
}
