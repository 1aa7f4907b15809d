//! # Ballotbox Runtime
//!
//! Production implementations of the dependency traits defined in
//! `ballotbox-core`, plus the resilience building blocks shared by the auth
//! subsystem.
//!
//! ## Core Components
//!
//! - **`SystemClock`**: wall-clock time
//! - **`TokioTimer`**: one-shot timers on the Tokio runtime
//! - **Stores**: `MemoryStore` (shared in-process) and `FileStore` (one JSON
//!   file per key)
//! - **Retry**: exponential backoff policy and retry drivers
//! - **Timeout**: bounded calls that surface a typed timeout error
//! - **Metrics**: Prometheus recorders for cache, refresh and throttling
//!
//! ## Example
//!
//! ```ignore
//! use ballotbox_runtime::{SystemClock, TokioTimer};
//! use ballotbox_runtime::store::MemoryStore;
//!
//! let clock = Arc::new(SystemClock);
//! let timer = Arc::new(TokioTimer::new());
//! let store = MemoryStore::new();
//! ```

use ballotbox_core::environment::Clock;
use chrono::{DateTime, Utc};

/// Retry logic with exponential backoff
pub mod retry;

/// Bounded calls into external collaborators
pub mod timeout;

/// Tokio-backed timer
pub mod timer;

/// Durable store implementations
pub mod store;

/// Prometheus metrics for observability
pub mod metrics;

pub use timer::TokioTimer;

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
