//! Time-windowed record of authentication attempts.
//!
//! The ledger is a client-side heuristic: it lets the UI suggest
//! alternatives before the provider starts throttling. It never fails.
//! Without a store, or when the store errors, every operation degrades to
//! a no-op (records are dropped, counts read as zero).
//!
//! Each attempt kind is one JSON document in the store, mapping a
//! normalized identifier to its attempt instants:
//!
//! ```text
//! ballotbox.auth.attempts.reset = {"a@x.com":["2025-01-01T00:00:00Z", ...]}
//! ```
//!
//! Read-modify-write cycles are not locked; concurrent clients may lose
//! each other's updates.

use crate::config::ResilienceConfig;
use crate::constants::storage_keys;
use crate::state::AttemptKind;
use crate::utils::normalize_identifier;
use ballotbox_core::environment::Clock;
use ballotbox_core::store::DurableStore;
use ballotbox_runtime::metrics::ThrottleMetrics;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type Attempts = BTreeMap<String, Vec<DateTime<Utc>>>;

/// Per-identifier, per-kind attempt history.
pub struct AttemptLedger<S> {
    store: Option<S>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    warn_threshold: usize,
}

impl<S: DurableStore> AttemptLedger<S> {
    /// Create a ledger persisting to `store`.
    #[must_use]
    pub fn new(store: S, clock: Arc<dyn Clock>, config: &ResilienceConfig) -> Self {
        Self::build(Some(store), clock, config)
    }

    /// Create a ledger with no durable store; every operation is a no-op.
    #[must_use]
    pub fn without_store(clock: Arc<dyn Clock>, config: &ResilienceConfig) -> Self {
        Self::build(None, clock, config)
    }

    fn build(store: Option<S>, clock: Arc<dyn Clock>, config: &ResilienceConfig) -> Self {
        Self {
            store,
            clock,
            retention: Duration::seconds(
                i64::try_from(config.attempt_retention_seconds).unwrap_or(i64::MAX),
            ),
            warn_threshold: config.warn_threshold as usize,
        }
    }

    /// Record an attempt at the current instant.
    pub async fn record(&self, identifier: &str, kind: AttemptKind) {
        self.record_at(identifier, kind, self.clock.now()).await;
    }

    /// Record an attempt at `at`, then prune every identifier of `kind`.
    pub async fn record_at(&self, identifier: &str, kind: AttemptKind, at: DateTime<Utc>) {
        let identifier = normalize_identifier(identifier);
        if identifier.is_empty() {
            return;
        }
        let Some(mut attempts) = self.load(kind).await else {
            return;
        };

        attempts.entry(identifier).or_default().push(at);
        self.prune(&mut attempts);
        self.persist(kind, &attempts).await;

        ThrottleMetrics::record_attempt(kind.as_str());
        tracing::debug!(kind = %kind, "Recorded authentication attempt");
    }

    /// Number of attempts by `identifier` still inside the retention window.
    pub async fn count_recent(&self, identifier: &str, kind: AttemptKind) -> usize {
        let identifier = normalize_identifier(identifier);
        let Some(mut attempts) = self.load(kind).await else {
            return 0;
        };

        if self.prune(&mut attempts) {
            self.persist(kind, &attempts).await;
        }
        attempts.get(&identifier).map_or(0, Vec::len)
    }

    /// Whether `identifier` has reached the warning threshold for `kind`.
    pub async fn should_warn(&self, identifier: &str, kind: AttemptKind) -> bool {
        self.count_recent(identifier, kind).await >= self.warn_threshold
    }

    /// Forget every attempt by `identifier` for `kind`.
    pub async fn clear(&self, identifier: &str, kind: AttemptKind) {
        let identifier = normalize_identifier(identifier);
        let Some(mut attempts) = self.load(kind).await else {
            return;
        };

        let removed = attempts.remove(&identifier).is_some();
        if self.prune(&mut attempts) || removed {
            self.persist(kind, &attempts).await;
        }
    }

    /// Recent attempt counts per identifier for `kind`.
    pub async fn snapshot(&self, kind: AttemptKind) -> BTreeMap<String, usize> {
        let Some(mut attempts) = self.load(kind).await else {
            return BTreeMap::new();
        };

        if self.prune(&mut attempts) {
            self.persist(kind, &attempts).await;
        }
        attempts.into_iter().map(|(id, at)| (id, at.len())).collect()
    }

    /// Drop attempts outside the retention window and identifiers left
    /// with none. Returns `true` if anything was removed.
    fn prune(&self, attempts: &mut Attempts) -> bool {
        let now = self.clock.now();
        let retention = self.retention;
        let mut changed = false;

        attempts.retain(|_, instants| {
            let before = instants.len();
            instants.retain(|at| now - *at < retention);
            changed |= instants.len() != before;
            !instants.is_empty()
        });
        changed
    }

    /// Load the document for `kind`. `None` means storage is unusable.
    async fn load(&self, kind: AttemptKind) -> Option<Attempts> {
        let store = self.store.as_ref()?;

        match store.load(&storage_key(kind)).await {
            Ok(None) => Some(Attempts::new()),
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(attempts) => Some(attempts),
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "Discarding unreadable attempt records");
                    Some(Attempts::new())
                }
            },
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "Attempt tracking unavailable");
                None
            }
        }
    }

    async fn persist(&self, kind: AttemptKind, attempts: &Attempts) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let key = storage_key(kind);

        let result = if attempts.is_empty() {
            store.remove(&key).await
        } else {
            match serde_json::to_string(attempts) {
                Ok(raw) => store.save(&key, raw).await,
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "Could not encode attempt records");
                    return;
                }
            }
        };

        if let Err(e) = result {
            tracing::warn!(kind = %kind, error = %e, "Could not persist attempt records");
        }
    }
}

impl<S> fmt::Debug for AttemptLedger<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptLedger")
            .field("has_store", &self.store.is_some())
            .field("retention", &self.retention)
            .field("warn_threshold", &self.warn_threshold)
            .finish_non_exhaustive()
    }
}

/// Store key holding the attempt document for `kind`.
#[must_use]
pub fn storage_key(kind: AttemptKind) -> String {
    format!("{}{}", storage_keys::ATTEMPTS_PREFIX, kind.as_str())
}
