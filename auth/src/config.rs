//! Resilience configuration.
//!
//! This module provides the configuration surface for the session cache,
//! the refresh scheduler and throttle handling. Values are supplied by the
//! application; anything outside its documented range is rejected at load
//! time rather than clamped.

use crate::constants::storage_keys;
use crate::error::{AuthError, Result};
use ballotbox_runtime::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Whether a throttled operation blocks other operations for the same user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlternateOperationPolicy {
    /// Operations have separate budgets: an alternate operation is allowed
    /// unless the error text names it as throttled.
    #[default]
    Independent,

    /// One budget for every operation: nothing is allowed while throttled.
    Shared,
}

/// Configuration for the authentication resilience layer.
///
/// # Examples
///
/// ```
/// use ballotbox_auth::ResilienceConfig;
///
/// let config = ResilienceConfig::from_json_str(r#"{ "refresh_buffer_minutes": 10 }"#).unwrap();
/// assert_eq!(config.refresh_buffer_minutes, 10);
/// assert_eq!(config.warn_threshold, 3);
///
/// assert!(ResilienceConfig::from_json_str(r#"{ "max_refresh_retries": 0 }"#).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceConfig {
    /// Maximum age of a cached session answer before it is re-verified.
    ///
    /// Default: 30 seconds. Range: 1..=3600.
    pub session_freshness_window_seconds: u64,

    /// How long before expiry the session is refreshed.
    ///
    /// Default: 5 minutes. Range: 1..=60.
    pub refresh_buffer_minutes: u64,

    /// Retries after a transient refresh failure before the session is
    /// declared expired.
    ///
    /// Default: 3. Range: 1..=10.
    pub max_refresh_retries: u32,

    /// How long recorded attempts are remembered.
    ///
    /// Default: 3600 seconds. Range: 60..=86400.
    pub attempt_retention_seconds: u64,

    /// Recent attempts at which the UI should suggest alternatives.
    ///
    /// Default: 3. Range: 1..=100.
    pub warn_threshold: u32,

    /// Deadline for calls into the identity collaborator.
    ///
    /// Default: 8 seconds. Range: 1..=60.
    pub request_timeout_seconds: u64,

    /// Deadline for best-effort lookups such as profile enrichment.
    ///
    /// Default: 4 seconds. Range: 1..=`request_timeout_seconds`.
    pub auxiliary_timeout_seconds: u64,

    /// First backoff delay after a transient refresh failure.
    ///
    /// Default: 500 ms. Range: 1..=60000.
    pub retry_initial_delay_ms: u64,

    /// Upper bound on backoff delays.
    ///
    /// Default: 8000 ms. Range: `retry_initial_delay_ms`..=300000.
    pub retry_max_delay_ms: u64,

    /// Whether throttling of one operation blocks the others.
    ///
    /// Default: independent.
    pub alternate_operation_policy: AlternateOperationPolicy,

    /// Store key holding the persisted session; changes to it from other
    /// clients invalidate the cache.
    ///
    /// Default: `ballotbox.auth.session`.
    pub session_storage_key: String,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            session_freshness_window_seconds: 30,
            refresh_buffer_minutes: 5,
            max_refresh_retries: 3,
            attempt_retention_seconds: 3600,
            warn_threshold: 3,
            request_timeout_seconds: 8,
            auxiliary_timeout_seconds: 4,
            retry_initial_delay_ms: 500,
            retry_max_delay_ms: 8000,
            alternate_operation_policy: AlternateOperationPolicy::Independent,
            session_storage_key: storage_keys::SESSION.to_string(),
        }
    }
}

impl ResilienceConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document and validate it.
    ///
    /// Missing fields take their defaults; unknown fields are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] if the document is malformed or any
    /// value is out of range.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AuthError::Validation(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value against its documented range.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] listing every out-of-range value.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        check_range(
            &mut problems,
            "session_freshness_window_seconds",
            self.session_freshness_window_seconds,
            1,
            3600,
        );
        check_range(&mut problems, "refresh_buffer_minutes", self.refresh_buffer_minutes, 1, 60);
        check_range(
            &mut problems,
            "max_refresh_retries",
            u64::from(self.max_refresh_retries),
            1,
            10,
        );
        check_range(
            &mut problems,
            "attempt_retention_seconds",
            self.attempt_retention_seconds,
            60,
            86_400,
        );
        check_range(&mut problems, "warn_threshold", u64::from(self.warn_threshold), 1, 100);
        check_range(&mut problems, "request_timeout_seconds", self.request_timeout_seconds, 1, 60);
        check_range(
            &mut problems,
            "auxiliary_timeout_seconds",
            self.auxiliary_timeout_seconds,
            1,
            self.request_timeout_seconds.max(1),
        );
        check_range(&mut problems, "retry_initial_delay_ms", self.retry_initial_delay_ms, 1, 60_000);
        check_range(
            &mut problems,
            "retry_max_delay_ms",
            self.retry_max_delay_ms,
            self.retry_initial_delay_ms,
            300_000,
        );
        if self.session_storage_key.trim().is_empty() {
            problems.push("session_storage_key must not be empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Validation(format!(
                "invalid configuration: {}",
                problems.join("; ")
            )))
        }
    }

    /// Set the cache freshness window.
    #[must_use]
    pub const fn with_freshness_window(mut self, seconds: u64) -> Self {
        self.session_freshness_window_seconds = seconds;
        self
    }

    /// Set the refresh buffer.
    #[must_use]
    pub const fn with_refresh_buffer(mut self, minutes: u64) -> Self {
        self.refresh_buffer_minutes = minutes;
        self
    }

    /// Set the refresh retry ceiling.
    #[must_use]
    pub const fn with_max_refresh_retries(mut self, retries: u32) -> Self {
        self.max_refresh_retries = retries;
        self
    }

    /// Set the attempt retention window.
    #[must_use]
    pub const fn with_attempt_retention(mut self, seconds: u64) -> Self {
        self.attempt_retention_seconds = seconds;
        self
    }

    /// Set the warning threshold.
    #[must_use]
    pub const fn with_warn_threshold(mut self, threshold: u32) -> Self {
        self.warn_threshold = threshold;
        self
    }

    /// Set the request and auxiliary timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, request_seconds: u64, auxiliary_seconds: u64) -> Self {
        self.request_timeout_seconds = request_seconds;
        self.auxiliary_timeout_seconds = auxiliary_seconds;
        self
    }

    /// Set the backoff bounds.
    #[must_use]
    pub const fn with_retry_delays(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.retry_initial_delay_ms = initial_ms;
        self.retry_max_delay_ms = max_ms;
        self
    }

    /// Set the alternate operation policy.
    #[must_use]
    pub const fn with_alternate_operation_policy(mut self, policy: AlternateOperationPolicy) -> Self {
        self.alternate_operation_policy = policy;
        self
    }

    /// Set the persisted session key.
    #[must_use]
    pub fn with_session_storage_key(mut self, key: impl Into<String>) -> Self {
        self.session_storage_key = key.into();
        self
    }

    /// Cache freshness window.
    #[must_use]
    pub const fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.session_freshness_window_seconds)
    }

    /// Refresh buffer before expiry.
    #[must_use]
    pub const fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_minutes * 60)
    }

    /// Attempt retention window.
    #[must_use]
    pub const fn attempt_retention(&self) -> Duration {
        Duration::from_secs(self.attempt_retention_seconds)
    }

    /// Deadline for collaborator calls.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Deadline for best-effort lookups.
    #[must_use]
    pub const fn auxiliary_timeout(&self) -> Duration {
        Duration::from_secs(self.auxiliary_timeout_seconds)
    }

    /// Backoff policy for transient refresh failures.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.max_refresh_retries as usize)
            .initial_delay(Duration::from_millis(self.retry_initial_delay_ms))
            .max_delay(Duration::from_millis(self.retry_max_delay_ms))
            .build()
    }
}

fn check_range(problems: &mut Vec<String>, field: &str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        problems.push(format!("{field} must be between {min} and {max}, got {value}"));
    }
}
