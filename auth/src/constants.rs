//! Authentication constants.
//!
//! This module contains constant values used throughout the authentication system.

/// Durable storage keys.
pub mod storage_keys {
    /// Prefix for attempt ledger documents; the attempt kind is appended
    /// (`ballotbox.auth.attempts.login`).
    pub const ATTEMPTS_PREFIX: &str = "ballotbox.auth.attempts.";

    /// Default key under which the identity collaborator persists the session.
    pub const SESSION: &str = "ballotbox.auth.session";
}

/// Provider throttling detection.
pub mod throttling {
    /// Lower-case substrings that identify provider-side throttling.
    pub const MARKERS: [&str; 3] = ["rate limit", "too many requests", "request rate limit reached"];

    /// Heuristic time until a throttled identifier may try again, in seconds.
    ///
    /// Providers do not report their reset clock in the error text; one hour
    /// is a conservative guess, not a provider guarantee.
    pub const HEURISTIC_RESET_SECS: i64 = 3600;

    /// Recovery step: wait out the throttle window.
    pub const SUGGEST_WAIT: &str = "Wait about an hour before trying again";

    /// Recovery step: clear locally stored auth state.
    pub const SUGGEST_CLEAR_STATE: &str = "Clear this site's stored data and cookies, then try again";

    /// Recovery step: use a different browser context.
    pub const SUGGEST_OTHER_BROWSER: &str = "Try a private/incognito window or a different browser";

    /// Recovery step: reset the password instead of signing in.
    pub const SUGGEST_PASSWORD_RESET: &str = "Use \"Forgot password\" to reset your password instead";

    /// Recovery step: contact support.
    pub const SUGGEST_CONTACT_SUPPORT: &str = "Contact support if the problem persists";

    /// Lower-case substrings with which the identity service rejects a
    /// refresh token outright. Only consulted for refresh calls.
    pub const REJECTED_REFRESH_MARKERS: [&str; 2] = ["refresh token not found", "invalid refresh token"];
}
