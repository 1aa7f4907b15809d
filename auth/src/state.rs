//! Authentication state types.
//!
//! This module defines the session and operation types shared by the
//! cache, the refresh scheduler, the classifier and the attempt ledger.
//! All types are `Clone` so they can be handed to event handlers and
//! coalesced refresh callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════
// Session
// ═══════════════════════════════════════════════════════════════════════

/// Authenticated session issued by the identity collaborator.
///
/// The collaborator is the source of truth; a `Session` held by this crate
/// is only a cached copy. Tokens are redacted from `Debug` output.
///
/// # Examples
///
/// ```
/// # use ballotbox_auth::Session;
/// # use chrono::{Duration, Utc};
/// let now = Utc::now();
/// let session = Session::new("user-1", "access", "refresh", now + Duration::minutes(10));
///
/// assert!(!session.is_expired_at(now));
/// assert!(session.is_expired_at(now + Duration::minutes(10)));
/// assert!(!format!("{session:?}").contains("access"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Subject (user) identifier.
    pub subject: String,

    /// Bearer token presented on authenticated requests.
    pub access_token: String,

    /// Longer-lived token used only to obtain a new access token.
    pub refresh_token: String,

    /// Instant at which the access token stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Create a session.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            subject: subject.into(),
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Returns `true` once `now` has reached the expiry instant.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left until expiry (negative once expired).
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.expires_at - now
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("subject", &self.subject)
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Optional profile details fetched on a best-effort basis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Display name, if the user set one.
    pub display_name: Option<String>,

    /// Contact email, if known.
    pub email: Option<String>,
}

/// The signed-in user as seen by the rest of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    /// Subject identifier from the session.
    pub subject: String,

    /// Profile details; `None` when enrichment failed or timed out.
    pub profile: Option<UserProfile>,
}

// ═══════════════════════════════════════════════════════════════════════
// Operations
// ═══════════════════════════════════════════════════════════════════════

/// Kinds of attempts tracked by the attempt ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptKind {
    /// Sign-in with identifier and secret.
    Login,
    /// Account registration.
    Register,
    /// Password reset request.
    Reset,
}

impl AttemptKind {
    /// Stable lower-case name, used in storage keys and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for AttemptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations performed against the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthOperation {
    /// Sign-in.
    SignIn,
    /// Registration.
    Register,
    /// Password reset request.
    PasswordReset,
    /// Session refresh.
    Refresh,
    /// Sign-out.
    SignOut,
    /// Session lookup.
    SessionLookup,
    /// Profile lookup.
    Profile,
}

impl AuthOperation {
    /// Stable snake-case name, used for timeouts, logs and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SignIn => "sign_in",
            Self::Register => "register",
            Self::PasswordReset => "password_reset",
            Self::Refresh => "refresh",
            Self::SignOut => "sign_out",
            Self::SessionLookup => "session_lookup",
            Self::Profile => "profile",
        }
    }

    /// Lower-case phrases a provider uses when naming this operation in an
    /// error message.
    #[must_use]
    pub const fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::SignIn => &["sign in", "signin", "sign-in", "login", "log in"],
            Self::Register => &["sign up", "signup", "sign-up", "register", "registration"],
            Self::PasswordReset => &["password reset", "reset password", "recover", "recovery"],
            Self::Refresh => &["refresh"],
            Self::SignOut => &["sign out", "signout", "logout", "log out"],
            Self::SessionLookup => &["session"],
            Self::Profile => &["profile"],
        }
    }
}

impl From<AttemptKind> for AuthOperation {
    fn from(kind: AttemptKind) -> Self {
        match kind {
            AttemptKind::Login => Self::SignIn,
            AttemptKind::Register => Self::Register,
            AttemptKind::Reset => Self::PasswordReset,
        }
    }
}

impl fmt::Display for AuthOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_expiry_boundary() {
        let now = Utc::now();
        let session = Session::new("u", "a", "r", now);

        assert!(session.is_expired_at(now));
        assert!(!session.is_expired_at(now - Duration::milliseconds(1)));
        assert_eq!(session.remaining_at(now - Duration::seconds(30)), Duration::seconds(30));
    }

    #[test]
    fn test_session_debug_redacts_tokens() {
        let session = Session::new("user-1", "secret-access", "secret-refresh", Utc::now());
        let debug = format!("{session:?}");

        assert!(debug.contains("user-1"));
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
    }

    #[test]
    fn test_attempt_kind_serde_names() {
        assert_eq!(serde_json::to_string(&AttemptKind::Reset).unwrap(), "\"reset\"");
        let kind: AttemptKind = serde_json::from_str("\"login\"").unwrap();
        assert_eq!(kind, AttemptKind::Login);
    }

    #[test]
    fn test_attempt_kind_maps_to_operation() {
        assert_eq!(AuthOperation::from(AttemptKind::Login), AuthOperation::SignIn);
        assert_eq!(AuthOperation::from(AttemptKind::Reset), AuthOperation::PasswordReset);
        assert_eq!(AuthOperation::PasswordReset.to_string(), "password_reset");
    }
}
