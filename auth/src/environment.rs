//! Authentication environment.
//!
//! This module defines the environment type for dependency injection
//! into the session manager and refresh scheduler.

use crate::providers::IdentityProvider;
use ballotbox_core::environment::Clock;
use ballotbox_core::timer::Timer;
use std::fmt;
use std::sync::Arc;

/// Authentication environment.
///
/// Contains all external dependencies needed by the session components.
///
/// # Type Parameters
///
/// - `P`: Identity collaborator
pub struct AuthEnvironment<P: IdentityProvider> {
    /// Identity collaborator.
    pub identity: Arc<P>,

    /// Clock for expiry, freshness and attempt windows.
    pub clock: Arc<dyn Clock>,

    /// Timer driving proactive refresh.
    pub timer: Arc<dyn Timer>,
}

impl<P: IdentityProvider> AuthEnvironment<P> {
    /// Create a new authentication environment.
    #[must_use]
    pub fn new(identity: P, clock: Arc<dyn Clock>, timer: Arc<dyn Timer>) -> Self {
        Self {
            identity: Arc::new(identity),
            clock,
            timer,
        }
    }
}

impl<P: IdentityProvider> Clone for AuthEnvironment<P> {
    fn clone(&self) -> Self {
        Self {
            identity: Arc::clone(&self.identity),
            clock: Arc::clone(&self.clock),
            timer: Arc::clone(&self.timer),
        }
    }
}

impl<P: IdentityProvider> fmt::Debug for AuthEnvironment<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthEnvironment").finish_non_exhaustive()
    }
}
