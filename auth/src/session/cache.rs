//! Short-lived cache of the last known session.

use crate::state::Session;
use ballotbox_core::environment::{Clock, to_chrono};
use ballotbox_runtime::metrics::SessionCacheMetrics;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// A fresh, unexpired session.
    Hit(Session),

    /// Fresh confirmation that nobody is signed in.
    LoggedOut,

    /// Nothing trustworthy cached; ask the identity collaborator.
    Unknown,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    session: Option<Session>,
    fetched_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheState {
    entry: Option<CacheEntry>,
    epoch: u64,
}

/// In-memory cache of the last session answer.
///
/// An entry is trusted for the freshness window only, independent of the
/// token's own expiry, so a sign-out made elsewhere is noticed within that
/// window. An expired session is never returned.
///
/// The cache keeps an epoch counter that changes whenever the cache is
/// explicitly cleared. Work started before a clear (an in-flight refresh)
/// compares epochs and discards its result instead of resurrecting the
/// session.
pub struct SessionCache {
    clock: Arc<dyn Clock>,
    freshness: chrono::Duration,
    state: Mutex<CacheState>,
}

impl SessionCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, freshness: Duration) -> Self {
        Self {
            clock,
            freshness: to_chrono(freshness),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Look up the cached answer.
    pub fn get(&self) -> CacheLookup {
        let now = self.clock.now();
        let state = self.lock();

        let lookup = match &state.entry {
            Some(entry) if now - entry.fetched_at < self.freshness => match &entry.session {
                Some(session) if !session.is_expired_at(now) => CacheLookup::Hit(session.clone()),
                Some(_) => CacheLookup::Unknown,
                None => CacheLookup::LoggedOut,
            },
            _ => CacheLookup::Unknown,
        };

        if matches!(lookup, CacheLookup::Unknown) {
            SessionCacheMetrics::record_miss();
        } else {
            SessionCacheMetrics::record_hit();
        }
        lookup
    }

    /// Overwrite the cache, stamping the fetch time to now.
    ///
    /// `None` records a confirmed sign-out.
    pub fn set(&self, session: Option<Session>) {
        let fetched_at = self.clock.now();
        tracing::debug!(signed_in = session.is_some(), "Session cache updated");
        self.lock().entry = Some(CacheEntry { session, fetched_at });
    }

    /// Record a confirmed sign-out and advance the epoch.
    ///
    /// Returns `true` if a session was cached.
    pub fn invalidate(&self) -> bool {
        let fetched_at = self.clock.now();
        let mut state = self.lock();
        let had_session = state.entry.as_ref().is_some_and(|e| e.session.is_some());

        state.entry = Some(CacheEntry {
            session: None,
            fetched_at,
        });
        state.epoch += 1;
        tracing::debug!(had_session, "Session cache invalidated");
        had_session
    }

    /// Drop the entry back to "unknown" and advance the epoch.
    ///
    /// Used when the session changed somewhere else: the next lookup asks
    /// the identity collaborator instead of assuming a sign-out.
    pub fn forget(&self) {
        let mut state = self.lock();
        state.entry = None;
        state.epoch += 1;
        tracing::debug!("Session cache cleared");
    }

    /// Current epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// The cached session regardless of freshness or expiry.
    ///
    /// Used to find the refresh token of a session whose access token has
    /// already expired.
    #[must_use]
    pub fn last_known(&self) -> Option<Session> {
        self.lock().entry.as_ref().and_then(|e| e.session.clone())
    }

    /// Overwrite the cache only if the epoch is still `epoch`.
    ///
    /// Returns `false` (and leaves the cache untouched) if the cache was
    /// cleared since `epoch` was read.
    pub fn set_if_epoch(&self, epoch: u64, session: Option<Session>) -> bool {
        let fetched_at = self.clock.now();
        let mut state = self.lock();
        if state.epoch != epoch {
            return false;
        }
        state.entry = Some(CacheEntry { session, fetched_at });
        true
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("SessionCache")
            .field("freshness", &self.freshness)
            .field("entry", &state.entry)
            .field("epoch", &state.epoch)
            .finish_non_exhaustive()
    }
}
