//! Provider throttling detection and recovery guidance.
//!
//! Throttling is recognised from the error text alone. Providers do not
//! expose a reset clock, so the estimated reset is a fixed heuristic and
//! the verdict is advisory: a missed detection only costs a generic error
//! message.

use crate::config::AlternateOperationPolicy;
use crate::constants::throttling::{
    HEURISTIC_RESET_SECS, MARKERS, REJECTED_REFRESH_MARKERS, SUGGEST_CLEAR_STATE, SUGGEST_CONTACT_SUPPORT,
    SUGGEST_OTHER_BROWSER, SUGGEST_PASSWORD_RESET, SUGGEST_WAIT,
};
use crate::error::AuthError;
use crate::state::AuthOperation;
use ballotbox_core::environment::Clock;
use ballotbox_runtime::metrics::ThrottleMetrics;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Outcome of classifying one error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitVerdict {
    /// Whether the error is provider-side throttling.
    pub is_throttled: bool,

    /// Heuristic instant after which trying again may succeed.
    pub estimated_reset: Option<DateTime<Utc>>,

    /// Ranked recovery steps for the user; empty when not throttled.
    pub suggestions: Vec<String>,

    /// The original error text.
    pub message: String,
}

impl RateLimitVerdict {
    /// Verdict for an error that is not throttling.
    #[must_use]
    pub fn not_throttled(message: impl Into<String>) -> Self {
        Self {
            is_throttled: false,
            estimated_reset: None,
            suggestions: Vec::new(),
            message: message.into(),
        }
    }

    /// User-facing explanation.
    ///
    /// Throttling is explained with the ranked recovery steps, never with
    /// the raw provider message. Other errors pass their message through.
    #[must_use]
    pub fn explanation(&self) -> String {
        if !self.is_throttled {
            return self.message.clone();
        }

        let mut text = String::from(
            "Too many attempts. The sign-in service is temporarily limiting requests",
        );
        match self.estimated_reset {
            Some(reset) => {
                text.push_str(&format!(
                    "; this usually clears by about {} UTC.",
                    reset.format("%H:%M")
                ));
            }
            None => text.push('.'),
        }
        if !self.suggestions.is_empty() {
            text.push_str("\n\nWhat you can do:");
            for (rank, suggestion) in self.suggestions.iter().enumerate() {
                text.push_str(&format!("\n{}. {suggestion}", rank + 1));
            }
        }
        text
    }
}

impl fmt::Display for RateLimitVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.explanation())
    }
}

/// Returns `true` if `message` reads as provider throttling.
#[must_use]
pub fn is_throttling_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    MARKERS.iter().any(|marker| lower.contains(marker))
}

fn is_rejected_refresh(message: &str) -> bool {
    let lower = message.to_lowercase();
    REJECTED_REFRESH_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Ranked recovery steps for a throttled `operation`.
///
/// Resetting the password is offered as an alternative to everything except
/// a throttled password reset.
#[must_use]
pub fn suggestions_for(operation: Option<AuthOperation>) -> Vec<String> {
    [
        SUGGEST_WAIT,
        SUGGEST_CLEAR_STATE,
        SUGGEST_OTHER_BROWSER,
        SUGGEST_PASSWORD_RESET,
        SUGGEST_CONTACT_SUPPORT,
    ]
    .into_iter()
    .filter(|s| !(*s == SUGGEST_PASSWORD_RESET && operation == Some(AuthOperation::PasswordReset)))
    .map(str::to_string)
    .collect()
}

/// Classify an error message observed at `now`.
///
/// Pure: the same text and instant always give the same verdict.
///
/// # Examples
///
/// ```
/// use ballotbox_auth::rate_limit::classify_message;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let verdict = classify_message("Request rate limit reached", now);
///
/// assert!(verdict.is_throttled);
/// assert!(verdict.suggestions.len() >= 3);
/// assert_eq!(verdict.estimated_reset, Some(now + Duration::hours(1)));
///
/// assert!(!classify_message("Invalid login credentials", now).is_throttled);
/// ```
#[must_use]
pub fn classify_message(message: &str, now: DateTime<Utc>) -> RateLimitVerdict {
    classify_message_for(message, None, now)
}

/// Classify an error message raised by `operation`.
#[must_use]
pub fn classify_message_for(
    message: &str,
    operation: Option<AuthOperation>,
    now: DateTime<Utc>,
) -> RateLimitVerdict {
    if !is_throttling_message(message) {
        return RateLimitVerdict::not_throttled(message);
    }

    RateLimitVerdict {
        is_throttled: true,
        estimated_reset: Some(now + Duration::seconds(HEURISTIC_RESET_SECS)),
        suggestions: suggestions_for(operation),
        message: message.to_string(),
    }
}

/// Decide whether `alternate` may be attempted after `message` was
/// returned for another operation.
///
/// Under [`AlternateOperationPolicy::Independent`] the alternate is allowed
/// unless the throttling message names it; under
/// [`AlternateOperationPolicy::Shared`] nothing is allowed while throttled.
#[must_use]
pub fn allows_alternate(
    message: &str,
    alternate: AuthOperation,
    policy: AlternateOperationPolicy,
) -> bool {
    if !is_throttling_message(message) {
        return true;
    }
    match policy {
        AlternateOperationPolicy::Shared => false,
        AlternateOperationPolicy::Independent => {
            let lower = message.to_lowercase();
            !alternate.keywords().iter().any(|k| lower.contains(k))
        }
    }
}

/// Clock-aware classifier for [`AuthError`]s.
#[derive(Clone)]
pub struct RateLimitClassifier {
    clock: Arc<dyn Clock>,
    policy: AlternateOperationPolicy,
}

impl RateLimitClassifier {
    /// Create a classifier reading `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, policy: AlternateOperationPolicy) -> Self {
        Self { clock, policy }
    }

    /// The configured alternate operation policy.
    #[must_use]
    pub const fn policy(&self) -> AlternateOperationPolicy {
        self.policy
    }

    /// Classify `error`. Never fails; uncertain input is "not throttled".
    #[must_use]
    pub fn classify(&self, error: &AuthError) -> RateLimitVerdict {
        match error {
            AuthError::Throttled { verdict } => verdict.clone(),
            other => classify_message(&other.to_string(), self.clock.now()),
        }
    }

    /// Convert a throttling error from `operation` into
    /// [`AuthError::Throttled`].
    ///
    /// A refresh rejected with "refresh token not found/invalid" text becomes
    /// [`AuthError::InvalidRefreshToken`]. Other errors are returned unchanged.
    #[must_use]
    pub fn escalate(&self, error: AuthError, operation: AuthOperation) -> AuthError {
        let message = match &error {
            AuthError::Throttled { .. } => return error,
            AuthError::Provider(msg) | AuthError::TransientNetwork(msg) => msg.clone(),
            _ => return error,
        };

        let verdict = classify_message_for(&message, Some(operation), self.clock.now());
        if !verdict.is_throttled {
            if operation == AuthOperation::Refresh && is_rejected_refresh(&message) {
                tracing::debug!("Identity provider rejected the refresh token");
                return AuthError::InvalidRefreshToken;
            }
            return error;
        }

        ThrottleMetrics::record_throttled(operation.as_str());
        tracing::warn!(
            operation = %operation,
            estimated_reset = ?verdict.estimated_reset,
            "Identity provider is throttling requests"
        );
        AuthError::Throttled { verdict }
    }

    /// Whether `alternate` may be attempted after `error`.
    #[must_use]
    pub fn should_allow_alternate(&self, error: &AuthError, alternate: AuthOperation) -> bool {
        let message = match error {
            AuthError::Throttled { verdict } => verdict.message.clone(),
            other => other.to_string(),
        };
        allows_alternate(&message, alternate, self.policy)
    }
}

impl fmt::Debug for RateLimitClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitClassifier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
