//! Proactive session refresh.
//!
//! The scheduler owns at most one timer. Tracking a session cancels the
//! previous timer and arms a new one `refresh_buffer` before expiry
//! (immediately if already inside the buffer). When it fires, or when a
//! caller forces a refresh, the refresh token is exchanged under the
//! request timeout, retrying transient failures with backoff.
//!
//! ```text
//!            track()                    timer fires / refresh_now()
//!   Idle ─────────────▶ Scheduled ──────────────────────────▶ Refreshing
//!    ▲                      ▲                                    │
//!    │                      └──────────── success ───────────────┤
//!    └──────────── terminal failure / cancel() ──────────────────┘
//! ```
//!
//! Concurrent refresh requests share one in-flight exchange, which runs on
//! its own task and settles the scheduler even when every caller gives up
//! waiting. A result that arrives after the cache was cleared is discarded.

use super::cache::SessionCache;
use super::events::{SessionEvent, SessionEvents};
use crate::config::ResilienceConfig;
use crate::environment::AuthEnvironment;
use crate::error::{AuthError, Result};
use crate::providers::IdentityProvider;
use crate::rate_limit::{RateLimitClassifier, ThrottleTracker};
use crate::state::{AuthOperation, Session};
use ballotbox_core::environment::{Clock, delay_until, to_chrono};
use ballotbox_core::timer::{Timer, TimerHandle, TimerTask};
use ballotbox_runtime::metrics::RefreshMetrics;
use ballotbox_runtime::retry::{RetryPolicy, retry_with_predicate};
use ballotbox_runtime::timeout::bounded;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Scheduler phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// No refresh pending.
    Idle,
    /// A refresh is armed to fire at the given instant.
    Scheduled {
        /// When the timer fires
        fires_at: DateTime<Utc>,
    },
    /// A refresh exchange is in flight.
    Refreshing,
}

type SharedRefresh = Shared<BoxFuture<'static, Result<Session>>>;

struct SchedulerState {
    phase: RefreshState,
    timer: Option<TimerHandle>,
    in_flight: Option<(u64, SharedRefresh)>,
    next_id: u64,
}

struct Inner<P: IdentityProvider> {
    identity: Arc<P>,
    clock: Arc<dyn Clock>,
    timer: Arc<dyn Timer>,
    cache: Arc<SessionCache>,
    events: Arc<SessionEvents>,
    classifier: RateLimitClassifier,
    throttles: Arc<ThrottleTracker>,
    buffer: chrono::Duration,
    retry: RetryPolicy,
    request_timeout: Duration,
    state: Mutex<SchedulerState>,
}

/// Owner of the single proactive refresh timer.
pub struct RefreshScheduler<P: IdentityProvider> {
    inner: Arc<Inner<P>>,
}

impl<P: IdentityProvider> Clone for RefreshScheduler<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: IdentityProvider> RefreshScheduler<P> {
    /// Create an idle scheduler refreshing the session held in `cache`.
    #[must_use]
    pub fn new(
        env: &AuthEnvironment<P>,
        cache: Arc<SessionCache>,
        events: Arc<SessionEvents>,
        classifier: RateLimitClassifier,
        throttles: Arc<ThrottleTracker>,
        config: &ResilienceConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                identity: Arc::clone(&env.identity),
                clock: Arc::clone(&env.clock),
                timer: Arc::clone(&env.timer),
                cache,
                events,
                classifier,
                throttles,
                buffer: to_chrono(config.refresh_buffer()),
                retry: config.retry_policy(),
                request_timeout: config.request_timeout(),
                state: Mutex::new(SchedulerState {
                    phase: RefreshState::Idle,
                    timer: None,
                    in_flight: None,
                    next_id: 0,
                }),
            }),
        }
    }

    /// Arm the refresh timer for `session`, replacing any pending timer.
    ///
    /// Ignored while a refresh is in flight; its result re-arms the timer.
    pub fn track(&self, session: &Session) {
        let mut state = self.inner.lock();
        if state.in_flight.is_some() {
            return;
        }
        self.inner.schedule_locked(&mut state, session.expires_at);
    }

    /// Cancel the pending timer and forget any in-flight refresh.
    ///
    /// An exchange already in flight still completes for its waiters, but
    /// it no longer owns the scheduler.
    pub fn cancel(&self) {
        let mut state = self.inner.lock();
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        state.in_flight = None;
        state.phase = RefreshState::Idle;
    }

    /// Refresh now, regardless of the timer.
    ///
    /// Joins the in-flight refresh if there is one. Dropping the returned
    /// future does not abort the exchange.
    ///
    /// # Errors
    ///
    /// - [`AuthError::SessionNotFound`] if no session is cached
    /// - [`AuthError::InvalidRefreshToken`] if the provider rejected the token
    /// - [`AuthError::SessionExpired`] if transient failures exhausted the retries
    /// - [`AuthError::Throttled`] if the provider is throttling refreshes
    /// - [`AuthError::SessionInvalidated`] if the session was cleared meanwhile
    pub async fn refresh_now(&self) -> Result<Session> {
        self.inner.refresh_shared().await
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> RefreshState {
        self.inner.lock().phase
    }

    /// When the pending timer fires, if one is armed.
    #[must_use]
    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        match self.state() {
            RefreshState::Scheduled { fires_at } => Some(fires_at),
            RefreshState::Idle | RefreshState::Refreshing => None,
        }
    }
}

impl<P: IdentityProvider> Inner<P> {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_locked(self: &Arc<Self>, state: &mut SchedulerState, expires_at: DateTime<Utc>) {
        if let Some(previous) = state.timer.take() {
            previous.cancel();
        }

        let now = self.clock.now();
        let fires_at = (expires_at - self.buffer).max(now);
        let delay = delay_until(fires_at - now);

        let weak = Arc::downgrade(self);
        let task: TimerTask = Box::pin(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            tracing::debug!("Scheduled session refresh firing");
            let refresh = inner.refresh_shared();
            drop(inner);
            // Outcome is reported through events
            let _ = refresh.await;
        });

        state.timer = Some(self.timer.schedule(delay, task));
        state.phase = RefreshState::Scheduled { fires_at };
        tracing::debug!(
            %fires_at,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Session refresh scheduled"
        );
    }

    fn refresh_shared(self: &Arc<Self>) -> SharedRefresh {
        let mut state = self.lock();
        if let Some((_, in_flight)) = &state.in_flight {
            tracing::debug!("Joining in-flight session refresh");
            return in_flight.clone();
        }

        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        state.phase = RefreshState::Refreshing;
        let id = state.next_id;
        state.next_id += 1;
        let epoch = self.cache.epoch();

        // The exchange runs on its own task so it completes even if every
        // waiter is dropped; waiters only hold the join handle.
        let task = tokio::spawn(Arc::clone(self).run_refresh(id, epoch));
        let weak = Arc::downgrade(self);
        let refresh: BoxFuture<'static, Result<Session>> = Box::pin(async move {
            task.await.unwrap_or_else(|e| {
                tracing::error!(error = %e, "Session refresh task failed");
                if let Some(inner) = weak.upgrade() {
                    inner.settle(id);
                }
                Err(AuthError::InternalError(format!("refresh task failed: {e}")))
            })
        });
        let shared = refresh.shared();
        state.in_flight = Some((id, shared.clone()));
        shared
    }

    async fn run_refresh(self: Arc<Self>, id: u64, epoch: u64) -> Result<Session> {
        let Some(session) = self.cache.last_known() else {
            self.settle(id);
            return Err(AuthError::SessionNotFound);
        };

        RefreshMetrics::record_attempt();
        tracing::debug!(subject = %session.subject, "Refreshing session");

        let token = session.refresh_token;
        let outcome = retry_with_predicate(
            &self.retry,
            || self.exchange(&token),
            |e: &AuthError| e.is_transient(),
        )
        .await;

        self.finish(id, epoch, outcome)
    }

    /// One bounded refresh call, with throttling recognised so that it is
    /// never retried.
    async fn exchange(&self, refresh_token: &str) -> Result<Session> {
        bounded(
            AuthOperation::Refresh.as_str(),
            self.request_timeout,
            self.identity.refresh(refresh_token),
        )
        .await
        .map_err(|e| self.classifier.escalate(e, AuthOperation::Refresh))
    }

    /// Release ownership of the scheduler if `id` still holds it.
    fn settle(&self, id: u64) {
        let mut state = self.lock();
        if state.in_flight.as_ref().is_some_and(|(current, _)| *current == id) {
            state.in_flight = None;
            state.phase = RefreshState::Idle;
        }
    }

    fn finish(self: &Arc<Self>, id: u64, epoch: u64, outcome: Result<Session>) -> Result<Session> {
        let mut state = self.lock();
        let owns_scheduler = state.in_flight.as_ref().is_some_and(|(current, _)| *current == id);
        if owns_scheduler {
            state.in_flight = None;
            state.phase = RefreshState::Idle;
        }

        if !owns_scheduler || self.cache.epoch() != epoch {
            drop(state);
            RefreshMetrics::record_failure("invalidated");
            tracing::debug!("Discarding refresh result after session was cleared");
            return Err(AuthError::SessionInvalidated);
        }

        match outcome {
            Ok(session) => {
                if !self.cache.set_if_epoch(epoch, Some(session.clone())) {
                    drop(state);
                    RefreshMetrics::record_failure("invalidated");
                    return Err(AuthError::SessionInvalidated);
                }
                self.schedule_locked(&mut state, session.expires_at);
                drop(state);

                self.throttles.clear(AuthOperation::Refresh);
                RefreshMetrics::record_success();
                tracing::info!(
                    subject = %session.subject,
                    expires_at = %session.expires_at,
                    "Session refreshed"
                );
                self.events.emit(&SessionEvent::SessionChanged {
                    session: Some(session.clone()),
                });
                Ok(session)
            }
            Err(error) if error.is_terminal_for_session() || error.is_transient() => {
                drop(state);
                let had_session = self.cache.invalidate();

                let reason = if error.is_transient() {
                    "retries_exhausted"
                } else {
                    "invalid_refresh_token"
                };
                RefreshMetrics::record_failure(reason);
                tracing::warn!(error = %error, reason, "Session refresh failed, session expired");

                if had_session {
                    self.events
                        .emit(&SessionEvent::SessionChanged { session: None });
                }
                self.events.emit(&SessionEvent::RefreshFailed {
                    error: error.clone(),
                });
                self.events.emit(&SessionEvent::SessionExpired);

                if error.is_transient() {
                    Err(AuthError::SessionExpired)
                } else {
                    Err(error)
                }
            }
            Err(error) => {
                drop(state);

                if let Some(verdict) = error.verdict() {
                    self.throttles.note(AuthOperation::Refresh, verdict);
                    RefreshMetrics::record_failure("throttled");
                    self.events.emit(&SessionEvent::AuthError {
                        operation: AuthOperation::Refresh,
                        error: error.clone(),
                    });
                } else {
                    RefreshMetrics::record_failure("provider");
                }
                tracing::warn!(error = %error, "Session refresh failed, keeping current session");

                self.events.emit(&SessionEvent::RefreshFailed {
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }
}

impl<P: IdentityProvider> fmt::Debug for RefreshScheduler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("state", &self.state())
            .field("buffer", &self.inner.buffer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlternateOperationPolicy;
    use crate::mocks::MockIdentityProvider;
    use crate::session::events::SessionEventKind;
    use ballotbox_testing::{ManualClock, ManualTimer, Recorder, test_clock};

    struct Fixture {
        scheduler: RefreshScheduler<MockIdentityProvider>,
        cache: Arc<SessionCache>,
        events: Arc<SessionEvents>,
        identity: MockIdentityProvider,
        clock: ManualClock,
        timer: ManualTimer,
    }

    fn fixture(config: &ResilienceConfig) -> Fixture {
        let clock = test_clock();
        let timer = ManualTimer::new(clock.clone());
        let identity = MockIdentityProvider::new();
        let env = AuthEnvironment::new(
            identity.clone(),
            Arc::new(clock.clone()),
            Arc::new(timer.clone()),
        );
        let cache = Arc::new(SessionCache::new(env.clock.clone(), config.freshness_window()));
        let events = Arc::new(SessionEvents::new());
        let classifier =
            RateLimitClassifier::new(env.clock.clone(), AlternateOperationPolicy::Independent);
        let scheduler = RefreshScheduler::new(
            &env,
            Arc::clone(&cache),
            Arc::clone(&events),
            classifier,
            Arc::new(ThrottleTracker::new()),
            config,
        );
        Fixture {
            scheduler,
            cache,
            events,
            identity,
            clock,
            timer,
        }
    }

    fn session_at(clock: &ManualClock, minutes: i64, token: &str) -> Session {
        Session::new(
            "user-1",
            format!("access-{token}"),
            format!("refresh-{token}"),
            clock.now() + chrono::Duration::minutes(minutes),
        )
    }

    #[test]
    fn test_fire_time_is_expiry_minus_buffer() {
        let f = fixture(&ResilienceConfig::default());
        let session = session_at(&f.clock, 10, "a");

        f.scheduler.track(&session);

        let expected = f.clock.now() + chrono::Duration::minutes(5);
        assert_eq!(f.scheduler.state(), RefreshState::Scheduled { fires_at: expected });
        assert_eq!(f.timer.fire_times(), vec![expected]);
    }

    #[test]
    fn test_inside_buffer_fires_immediately() {
        let f = fixture(&ResilienceConfig::default());

        f.scheduler.track(&session_at(&f.clock, 2, "a"));

        assert_eq!(f.scheduler.scheduled_at(), Some(f.clock.now()));
    }

    #[test]
    fn test_retracking_replaces_timer() {
        let f = fixture(&ResilienceConfig::default());

        f.scheduler.track(&session_at(&f.clock, 10, "a"));
        f.scheduler.track(&session_at(&f.clock, 20, "b"));

        assert_eq!(f.timer.pending_count(), 1);
        assert_eq!(
            f.scheduler.scheduled_at(),
            Some(f.clock.now() + chrono::Duration::minutes(15))
        );
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let f = fixture(&ResilienceConfig::default());
        f.scheduler.track(&session_at(&f.clock, 10, "a"));

        f.scheduler.cancel();

        assert_eq!(f.scheduler.state(), RefreshState::Idle);
        assert_eq!(f.timer.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timer_refresh_reschedules() {
        let f = fixture(&ResilienceConfig::default());
        let session = session_at(&f.clock, 10, "a");
        f.cache.set(Some(session.clone()));
        f.scheduler.track(&session);

        let start = f.clock.now();
        let renewed = Session::new(
            "user-1",
            "access-b",
            "refresh-b",
            start + chrono::Duration::minutes(65),
        );
        f.identity.push_refresh(Ok(renewed.clone()));

        assert_eq!(f.timer.advance(Duration::from_secs(5 * 60)).await, 1);

        assert_eq!(f.identity.refresh_tokens_seen(), vec!["refresh-a"]);
        assert_eq!(f.cache.last_known(), Some(renewed));
        assert_eq!(
            f.scheduler.scheduled_at(),
            Some(start + chrono::Duration::minutes(60))
        );
    }

    #[tokio::test]
    async fn test_no_session_is_not_found_without_events() {
        let f = fixture(&ResilienceConfig::default());
        let seen = Recorder::new();
        let seen_in_handler = seen.clone();
        f.events.subscribe(SessionEventKind::SessionExpired, move |e| {
            seen_in_handler.push(e.clone());
        });

        assert_eq!(f.scheduler.refresh_now().await, Err(AuthError::SessionNotFound));
        assert!(seen.is_empty());
        assert_eq!(f.scheduler.state(), RefreshState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retried_then_expire() {
        let config = ResilienceConfig::default().with_max_refresh_retries(2);
        let f = fixture(&config);
        f.cache.set(Some(session_at(&f.clock, 10, "a")));
        for _ in 0..3 {
            f.identity
                .push_refresh(Err(AuthError::TransientNetwork("connection reset".into())));
        }

        let result = f.scheduler.refresh_now().await;

        assert_eq!(result, Err(AuthError::SessionExpired));
        assert_eq!(f.identity.calls(AuthOperation::Refresh), 3);
        assert_eq!(f.cache.last_known(), None);
        assert_eq!(f.scheduler.state(), RefreshState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_then_success() {
        let f = fixture(&ResilienceConfig::default());
        f.cache.set(Some(session_at(&f.clock, 10, "a")));
        f.identity
            .push_refresh(Err(AuthError::TransientNetwork("connection reset".into())));
        f.identity.push_refresh(Ok(session_at(&f.clock, 60, "b")));

        let session = f.scheduler.refresh_now().await.unwrap();

        assert_eq!(session.access_token, "access-b");
        assert_eq!(f.identity.calls(AuthOperation::Refresh), 2);
        assert!(f.scheduler.scheduled_at().is_some());
    }

    #[tokio::test]
    async fn test_throttled_refresh_keeps_session_and_is_not_retried() {
        let f = fixture(&ResilienceConfig::default());
        let session = session_at(&f.clock, 10, "a");
        f.cache.set(Some(session.clone()));
        f.identity
            .push_refresh(Err(AuthError::Provider("Request rate limit reached".into())));

        let err = f.scheduler.refresh_now().await.unwrap_err();

        assert!(err.is_throttled());
        assert_eq!(f.identity.calls(AuthOperation::Refresh), 1);
        assert_eq!(f.cache.last_known(), Some(session));
        assert_eq!(f.scheduler.state(), RefreshState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_refresh_still_rearms_timer() {
        let f = fixture(&ResilienceConfig::default());
        let session = session_at(&f.clock, 60, "a");
        f.cache.set(Some(session.clone()));
        f.scheduler.track(&session);
        f.identity.set_latency(Duration::from_secs(2));
        let renewed = session_at(&f.clock, 120, "b");
        f.identity.push_refresh(Ok(renewed.clone()));

        let abandoned = tokio::time::timeout(Duration::from_secs(1), f.scheduler.refresh_now()).await;
        assert!(abandoned.is_err());
        assert_eq!(f.scheduler.state(), RefreshState::Refreshing);

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(f.identity.calls(AuthOperation::Refresh), 1);
        assert_eq!(f.cache.last_known(), Some(renewed));
        assert_eq!(f.timer.pending_count(), 1);
        assert_eq!(
            f.scheduler.scheduled_at(),
            Some(f.clock.now() + chrono::Duration::minutes(115))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_refresh_times_out_as_transient() {
        let config = ResilienceConfig::default().with_max_refresh_retries(1);
        let f = fixture(&config);
        f.cache.set(Some(session_at(&f.clock, 10, "a")));
        f.identity.set_latency(Duration::from_secs(30));

        let started = tokio::time::Instant::now();
        let result = f.scheduler.refresh_now().await;

        assert_eq!(result, Err(AuthError::SessionExpired));
        assert_eq!(f.identity.calls(AuthOperation::Refresh), 2);
        // Two 8s deadlines plus one backoff delay of at least 500ms
        assert!(started.elapsed() >= Duration::from_millis(16_500));
    }
}
