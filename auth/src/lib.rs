//! # Ballotbox Authentication Resilience
//!
//! Client-side session handling for the Ballotbox voting application. The
//! hosted identity service does the actual authentication; this crate keeps
//! the client usable when that service is slow, flaky or throttling:
//!
//! - **Session caching**: a short-lived cache in front of session lookups
//! - **Proactive refresh**: tokens are renewed before they expire, with
//!   bounded retry on transient failures and at most one refresh in flight
//! - **Throttle detection**: provider throttling is recognised, explained
//!   to the user and remembered until its estimated reset
//! - **Attempt tracking**: a durable, time-windowed ledger of sign-in,
//!   registration and reset attempts used to warn before the provider
//!   starts refusing
//!
//! ## Architecture
//!
//! ```text
//! application ──▶ SessionManager ──▶ SessionCache
//!                       │        └──▶ RefreshScheduler ──▶ Timer
//!                       │                    │
//!                       └──── bounded ───────┴──▶ IdentityProvider
//!                                            │
//!                       RateLimitClassifier ◀┘ (every failure)
//!
//! application ──▶ AttemptLedger ──▶ DurableStore
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use ballotbox_auth::{AuthEnvironment, ResilienceConfig, SessionManager};
//! use ballotbox_auth::mocks::MockIdentityProvider;
//! use ballotbox_runtime::{SystemClock, TokioTimer};
//! use std::sync::Arc;
//!
//! # async fn example() -> ballotbox_auth::Result<()> {
//! let env = AuthEnvironment::new(
//!     MockIdentityProvider::new(),
//!     Arc::new(SystemClock),
//!     Arc::new(TokioTimer::new()),
//! );
//! let manager = SessionManager::new(env, ResilienceConfig::default())?;
//!
//! match manager.sign_in("voter@example.com", "secret").await {
//!     Ok(session) => println!("signed in as {}", session.subject),
//!     Err(e) => println!("{}", e.user_message()),
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Public modules
pub mod config;
pub mod constants;
pub mod environment;
pub mod error;
pub mod providers;
pub mod rate_limit;
pub mod session;
pub mod state;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use config::{AlternateOperationPolicy, ResilienceConfig};
pub use environment::AuthEnvironment;
pub use error::{AuthError, Result};
pub use providers::IdentityProvider;
pub use rate_limit::{AttemptLedger, RateLimitClassifier, RateLimitVerdict, ThrottleTracker};
pub use session::{
    RefreshState, SessionEvent, SessionEventKind, SessionManager, SubscriptionId,
};
pub use state::{AttemptKind, AuthOperation, CurrentUser, Session, UserProfile};
