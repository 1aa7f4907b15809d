//! Session lifecycle: caching, proactive refresh and lifecycle events.
//!
//! - [`SessionCache`]: last known session, trusted for a short freshness window
//! - [`RefreshScheduler`]: one timer per session, one refresh in flight at a time
//! - [`SessionEvents`]: subscriber registry for lifecycle notifications
//! - [`SessionManager`]: the facade the application talks to
//!
//! # Refresh Lifecycle
//!
//! ```text
//!            track()                 timer fires / refresh_now()
//!   Idle ──────────────▶ Scheduled ─────────────────────────────▶ Refreshing
//!    ▲                       ▲                                        │
//!    │ cancel() / failure    └──────────── success: reschedule ───────┘
//!    └────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod events;
pub mod manager;
pub mod scheduler;

pub use cache::{CacheLookup, SessionCache};
pub use events::{SessionEvent, SessionEventKind, SessionEvents, SubscriptionId};
pub use manager::SessionManager;
pub use scheduler::{RefreshScheduler, RefreshState};
