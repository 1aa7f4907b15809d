//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the auth subsystem:
//! - Session cache hits and misses
//! - Proactive and forced refreshes
//! - Retry attempts and exhaustion
//! - Provider throttling and recorded attempts
//! - Latency of calls into the identity collaborator
//!
//! Recording is always safe: without an installed recorder every call is a
//! no-op.
//!
//! # Example
//!
//! ```rust,no_run
//! use ballotbox_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//! // ... run the application ...
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this succeeds
    /// with no handle and a warning; metrics keep flowing to the existing
    /// recorder.
    pub fn install() -> Result<Self, MetricsError> {
        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 8.0, 15.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                register_metrics();
                tracing::info!("Metrics recorder installed");
                Ok(Self {
                    handle: Some(handle),
                })
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(Self { handle: None })
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "auth_session_cache_hits_total",
        "Session lookups answered from the in-memory cache"
    );
    describe_counter!(
        "auth_session_cache_misses_total",
        "Session lookups that fell back to the identity collaborator"
    );
    describe_counter!(
        "auth_refresh_attempts_total",
        "Session refreshes started (scheduled or forced)"
    );
    describe_counter!(
        "auth_refresh_successes_total",
        "Session refreshes that produced a new session"
    );
    describe_counter!(
        "auth_refresh_failures_total",
        "Session refreshes that ended without a new session"
    );
    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!("retry_successes_total", "Total number of successful retries");
    describe_counter!(
        "retry_exhausted_total",
        "Total number of operations that exhausted max retries"
    );
    describe_counter!(
        "auth_throttled_errors_total",
        "Errors classified as provider throttling"
    );
    describe_counter!(
        "auth_attempts_recorded_total",
        "Authentication attempts recorded in the attempt ledger"
    );
    describe_histogram!(
        "auth_identity_call_duration_seconds",
        "Latency of calls into the identity collaborator"
    );
}

/// Session cache metrics recorder.
pub struct SessionCacheMetrics;

impl SessionCacheMetrics {
    /// Record a lookup answered from cache.
    pub fn record_hit() {
        counter!("auth_session_cache_hits_total").increment(1);
    }

    /// Record a lookup that required the identity collaborator.
    pub fn record_miss() {
        counter!("auth_session_cache_misses_total").increment(1);
    }
}

/// Refresh metrics recorder.
pub struct RefreshMetrics;

impl RefreshMetrics {
    /// Record a refresh start.
    pub fn record_attempt() {
        counter!("auth_refresh_attempts_total").increment(1);
    }

    /// Record a successful refresh.
    pub fn record_success() {
        counter!("auth_refresh_successes_total").increment(1);
    }

    /// Record a refresh failure, labelled by reason.
    pub fn record_failure(reason: &'static str) {
        counter!("auth_refresh_failures_total", "reason" => reason).increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}

/// Throttling and attempt-tracking metrics recorder.
pub struct ThrottleMetrics;

impl ThrottleMetrics {
    /// Record an error classified as provider throttling.
    pub fn record_throttled(operation: &'static str) {
        counter!("auth_throttled_errors_total", "operation" => operation).increment(1);
    }

    /// Record an attempt written to the ledger.
    pub fn record_attempt(kind: &'static str) {
        counter!("auth_attempts_recorded_total", "kind" => kind).increment(1);
    }
}

/// Identity collaborator call metrics recorder.
pub struct IdentityCallMetrics;

impl IdentityCallMetrics {
    /// Record one bounded call with its outcome (`ok`, `error`, `timeout`).
    pub fn record(operation: &'static str, outcome: &'static str, duration: Duration) {
        histogram!(
            "auth_identity_call_duration_seconds",
            "operation" => operation,
            "outcome" => outcome
        )
        .record(duration.as_secs_f64());
    }
}
