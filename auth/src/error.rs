//! Error types for session and throttling operations.

use crate::rate_limit::RateLimitVerdict;
use ballotbox_core::store::StoreError;
use ballotbox_runtime::timeout::TimeoutError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Error taxonomy for the authentication resilience layer.
///
/// Variants are grouped by how callers should react: retry under backoff
/// (transient), surface to the user (credentials, throttling, validation),
/// or re-authenticate (terminal session errors).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // Transient Errors
    // ═══════════════════════════════════════════════════════════

    /// Network failure talking to the identity collaborator.
    #[error("Network error: {0}")]
    TransientNetwork(String),

    /// A bounded call did not complete in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
        /// Deadline that elapsed
        after: Duration,
    },

    // ═══════════════════════════════════════════════════════════
    // Authentication Errors
    // ═══════════════════════════════════════════════════════════

    /// Invalid credentials provided.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The identity provider is throttling this client or identifier.
    #[error("Rate limited: {}", .verdict.message)]
    Throttled {
        /// Classification with recovery suggestions
        verdict: RateLimitVerdict,
    },

    // ═══════════════════════════════════════════════════════════
    // Session Errors
    // ═══════════════════════════════════════════════════════════

    /// The refresh token was rejected (not found, revoked or expired).
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    /// Session has expired.
    #[error("Session has expired")]
    SessionExpired,

    /// No session to operate on.
    #[error("Session not found")]
    SessionNotFound,

    /// The session was invalidated while the operation was in flight; its
    /// result was discarded.
    #[error("Session was invalidated during the operation")]
    SessionInvalidated,

    // ═══════════════════════════════════════════════════════════
    // Input / Infrastructure Errors
    // ═══════════════════════════════════════════════════════════

    /// Caller input rejected before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unclassified error from the identity provider, passed through.
    #[error("{0}")]
    Provider(String),

    /// Durable storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    /// Returns `true` if retrying the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_) | Self::Timeout { .. })
    }

    /// Returns `true` if the current session can no longer be used and the
    /// user must sign in again.
    #[must_use]
    pub const fn is_terminal_for_session(&self) -> bool {
        matches!(
            self,
            Self::InvalidRefreshToken | Self::SessionExpired | Self::SessionNotFound
        )
    }

    /// Returns `true` if the error was caused by the user's input or
    /// behaviour rather than by the system.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials | Self::Throttled { .. } | Self::Validation(_)
        )
    }

    /// Returns `true` if this is a throttling error.
    #[must_use]
    pub const fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    /// The verdict carried by a throttling error.
    #[must_use]
    pub const fn verdict(&self) -> Option<&RateLimitVerdict> {
        match self {
            Self::Throttled { verdict } => Some(verdict),
            _ => None,
        }
    }

    /// Text suitable for showing to the end user.
    ///
    /// Technical details of session failures are never shown; throttling
    /// is presented as an explanation with ranked recovery steps.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::TransientNetwork(_) | Self::Timeout { .. } => {
                "We could not reach the sign-in service, please try again".to_string()
            }
            Self::InvalidCredentials => "Invalid email or password".to_string(),
            Self::Throttled { verdict } => verdict.explanation(),
            Self::InvalidRefreshToken | Self::SessionExpired | Self::SessionNotFound => {
                "Your session has expired, please sign in again".to_string()
            }
            Self::SessionInvalidated => "You have been signed out".to_string(),
            Self::Validation(msg) | Self::Provider(msg) => msg.clone(),
            Self::Storage(_) | Self::InternalError(_) => {
                "Something went wrong, please try again".to_string()
            }
        }
    }
}

impl From<TimeoutError> for AuthError {
    fn from(err: TimeoutError) -> Self {
        Self::Timeout {
            operation: err.operation,
            after: err.after,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::classify_message;
    use chrono::Utc;

    #[test]
    fn test_transient_classification() {
        assert!(AuthError::TransientNetwork("reset by peer".into()).is_transient());
        assert!(
            AuthError::from(TimeoutError {
                operation: "refresh",
                after: Duration::from_secs(8),
            })
            .is_transient()
        );
        assert!(!AuthError::InvalidRefreshToken.is_transient());
        assert!(!AuthError::InvalidCredentials.is_transient());
    }

    #[test]
    fn test_terminal_for_session() {
        assert!(AuthError::InvalidRefreshToken.is_terminal_for_session());
        assert!(AuthError::SessionExpired.is_terminal_for_session());
        assert!(!AuthError::TransientNetwork("x".into()).is_terminal_for_session());
        assert!(!AuthError::SessionInvalidated.is_terminal_for_session());
    }

    #[test]
    fn test_invalid_refresh_token_hides_technical_message() {
        let message = AuthError::InvalidRefreshToken.user_message();
        assert_eq!(message, "Your session has expired, please sign in again");
    }

    #[test]
    fn test_throttled_user_message_lists_suggestions() {
        let verdict = classify_message("Too many requests", Utc::now());
        let err = AuthError::Throttled { verdict };

        assert!(err.is_user_error());
        assert!(err.is_throttled());
        let message = err.user_message();
        assert!(message.contains("1."));
        assert!(!message.contains("Too many requests"));
    }

    #[test]
    fn test_store_error_conversion() {
        let err: AuthError = StoreError::Unavailable.into();
        assert!(matches!(err, AuthError::Storage(_)));
    }
}
