//! Authentication providers.
//!
//! This module defines the trait for the one external dependency of the
//! resilience layer: the identity collaborator. The layer never talks to
//! the network itself; it wraps every collaborator call with a deadline,
//! classifies its errors and caches its answers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   bounded calls   ┌──────────────────────┐
//! │ SessionManager   │ ────────────────▶ │ IdentityProvider     │
//! │ RefreshScheduler │                   │ (hosted auth service)│
//! └────────┬─────────┘ ◀──────────────── └──────────────────────┘
//!          │            Session / AuthError
//!          ▼
//! ┌──────────────────┐
//! │ SessionCache     │
//! └──────────────────┘
//! ```
//!
//! This enables:
//! - **Testing**: Use [`MockIdentityProvider`](crate::mocks::MockIdentityProvider)
//!   (scripted, deterministic)
//! - **Production**: Wrap the hosted identity service's client

pub mod identity;

pub use identity::IdentityProvider;
