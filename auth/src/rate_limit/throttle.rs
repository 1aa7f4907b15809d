//! Memory of recent throttling verdicts per operation.

use super::RateLimitVerdict;
use crate::state::AuthOperation;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Latest throttled verdict for each operation, kept until its estimated
/// reset passes.
#[derive(Debug, Default)]
pub struct ThrottleTracker {
    verdicts: Mutex<HashMap<AuthOperation, RateLimitVerdict>>,
}

impl ThrottleTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `verdict` for `operation` if it is throttled.
    pub fn note(&self, operation: AuthOperation, verdict: &RateLimitVerdict) {
        if verdict.is_throttled {
            self.lock().insert(operation, verdict.clone());
        }
    }

    /// The throttled verdict for `operation`, if it has not yet reset at
    /// `now`.
    #[must_use]
    pub fn status(&self, operation: AuthOperation, now: DateTime<Utc>) -> Option<RateLimitVerdict> {
        let mut verdicts = self.lock();
        let active = verdicts
            .get(&operation)
            .is_some_and(|v| v.estimated_reset.is_some_and(|reset| now < reset));
        if active {
            verdicts.get(&operation).cloned()
        } else {
            verdicts.remove(&operation);
            None
        }
    }

    /// Forget `operation`'s verdict (after it succeeded).
    pub fn clear(&self, operation: AuthOperation) {
        self.lock().remove(&operation);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<AuthOperation, RateLimitVerdict>> {
        self.verdicts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::classify_message;
    use chrono::Duration;

    #[test]
    fn test_status_until_reset() {
        let tracker = ThrottleTracker::new();
        let now = Utc::now();
        let verdict = classify_message("Too many requests", now);

        tracker.note(AuthOperation::SignIn, &verdict);

        assert_eq!(tracker.status(AuthOperation::SignIn, now), Some(verdict));
        assert_eq!(tracker.status(AuthOperation::PasswordReset, now), None);
        assert_eq!(tracker.status(AuthOperation::SignIn, now + Duration::hours(1)), None);
        // Expired verdicts are dropped
        assert_eq!(tracker.status(AuthOperation::SignIn, now), None);
    }

    #[test]
    fn test_ignores_unthrottled_and_clears() {
        let tracker = ThrottleTracker::new();
        let now = Utc::now();

        tracker.note(AuthOperation::SignIn, &classify_message("Invalid credentials", now));
        assert_eq!(tracker.status(AuthOperation::SignIn, now), None);

        tracker.note(AuthOperation::SignIn, &classify_message("rate limit", now));
        tracker.clear(AuthOperation::SignIn);
        assert_eq!(tracker.status(AuthOperation::SignIn, now), None);
    }
}
