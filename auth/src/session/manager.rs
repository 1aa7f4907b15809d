//! Session facade for the rest of the application.

use super::cache::{CacheLookup, SessionCache};
use super::events::{SessionEvent, SessionEventKind, SessionEvents, SubscriptionId};
use super::scheduler::{RefreshScheduler, RefreshState};
use crate::config::ResilienceConfig;
use crate::environment::AuthEnvironment;
use crate::error::{AuthError, Result};
use crate::providers::IdentityProvider;
use crate::rate_limit::{RateLimitClassifier, RateLimitVerdict, ThrottleTracker};
use crate::state::{AuthOperation, CurrentUser, Session};
use crate::utils::{normalize_identifier, validate_identifier, validate_redirect_url};
use ballotbox_core::environment::Clock;
use ballotbox_core::store::DurableStore;
use ballotbox_runtime::timeout::bounded;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Session manager.
///
/// Composes the [`SessionCache`] and the [`RefreshScheduler`], wraps every
/// call into the identity collaborator with a deadline, and classifies its
/// failures. One instance is created per signed-in client and shut down
/// explicitly; nothing here is a global.
///
/// # Example
///
/// ```rust,no_run
/// use ballotbox_auth::{AuthEnvironment, ResilienceConfig, SessionEventKind, SessionManager};
/// use ballotbox_auth::mocks::MockIdentityProvider;
/// use ballotbox_runtime::{SystemClock, TokioTimer};
/// use std::sync::Arc;
///
/// # async fn example() -> ballotbox_auth::Result<()> {
/// let env = AuthEnvironment::new(
///     MockIdentityProvider::new(),
///     Arc::new(SystemClock),
///     Arc::new(TokioTimer::new()),
/// );
/// let manager = SessionManager::new(env, ResilienceConfig::default())?;
///
/// manager.on_event(SessionEventKind::SessionExpired, |_| {
///     println!("please sign in again");
/// });
///
/// if let Some(token) = manager.get_access_token().await? {
///     println!("bearer {token}");
/// }
/// manager.logout().await;
/// # Ok(())
/// # }
/// ```
pub struct SessionManager<P: IdentityProvider> {
    env: AuthEnvironment<P>,
    config: ResilienceConfig,
    cache: Arc<SessionCache>,
    events: Arc<SessionEvents>,
    scheduler: RefreshScheduler<P>,
    classifier: RateLimitClassifier,
    throttles: Arc<ThrottleTracker>,
    watchers: Mutex<Vec<JoinHandle<()>>>,
}

impl<P: IdentityProvider> SessionManager<P> {
    /// Create a manager.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] if `config` is out of range.
    pub fn new(env: AuthEnvironment<P>, config: ResilienceConfig) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(SessionCache::new(
            Arc::clone(&env.clock),
            config.freshness_window(),
        ));
        let events = Arc::new(SessionEvents::new());
        let classifier =
            RateLimitClassifier::new(Arc::clone(&env.clock), config.alternate_operation_policy);
        let throttles = Arc::new(ThrottleTracker::new());
        let scheduler = RefreshScheduler::new(
            &env,
            Arc::clone(&cache),
            Arc::clone(&events),
            classifier.clone(),
            Arc::clone(&throttles),
            &config,
        );

        Ok(Self {
            env,
            config,
            cache,
            events,
            scheduler,
            classifier,
            throttles,
            watchers: Mutex::new(Vec::new()),
        })
    }

    /// The current session, if signed in.
    ///
    /// Served from cache while fresh; otherwise looked up from the identity
    /// collaborator, cached and tracked for proactive refresh. A session
    /// reported as already expired is refreshed before being returned.
    ///
    /// # Errors
    ///
    /// Returns the classified lookup error; the cache is left untouched.
    pub async fn get_session(&self) -> Result<Option<Session>> {
        match self.cache.get() {
            CacheLookup::Hit(session) => return Ok(Some(session)),
            CacheLookup::LoggedOut => return Ok(None),
            CacheLookup::Unknown => {}
        }

        let epoch = self.cache.epoch();
        let previous = self.cache.last_known();
        let looked_up = bounded(
            AuthOperation::SessionLookup.as_str(),
            self.config.request_timeout(),
            self.env.identity.get_session(),
        )
        .await
        .map_err(|e| self.fail(AuthOperation::SessionLookup, e))?;

        if !self.cache.set_if_epoch(epoch, looked_up.clone()) {
            tracing::debug!("Session cleared during lookup, using the newer state");
            return Ok(match self.cache.get() {
                CacheLookup::Hit(session) => Some(session),
                CacheLookup::LoggedOut | CacheLookup::Unknown => None,
            });
        }

        match looked_up {
            Some(session) if session.is_expired_at(self.env.clock.now()) => {
                tracing::debug!(subject = %session.subject, "Looked-up session already expired");
                match self.scheduler.refresh_now().await {
                    Ok(renewed) => Ok(Some(renewed)),
                    Err(e) if e.is_terminal_for_session() || e == AuthError::SessionInvalidated => {
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            Some(session) => {
                self.scheduler.track(&session);
                if previous.as_ref() != Some(&session) {
                    self.events.emit(&SessionEvent::SessionChanged {
                        session: Some(session.clone()),
                    });
                }
                Ok(Some(session))
            }
            None => {
                self.scheduler.cancel();
                if previous.is_some() {
                    self.events.emit(&SessionEvent::SessionChanged { session: None });
                }
                Ok(None)
            }
        }
    }

    /// The bearer token of the current session, if signed in.
    ///
    /// # Errors
    ///
    /// Same as [`SessionManager::get_session`].
    pub async fn get_access_token(&self) -> Result<Option<String>> {
        Ok(self.get_session().await?.map(|s| s.access_token))
    }

    /// Refresh immediately, e.g. after a request was rejected as
    /// unauthenticated. Joins a refresh already in flight.
    ///
    /// # Errors
    ///
    /// See [`RefreshScheduler::refresh_now`].
    pub async fn refresh_session(&self) -> Result<Session> {
        self.scheduler.refresh_now().await
    }

    /// Subscribe to `kind` events. Handlers run in subscription order.
    pub fn on_event<F>(&self, kind: SessionEventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, handler)
    }

    /// Remove a subscription.
    pub fn off_event(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Sign out. Never fails from the caller's point of view.
    ///
    /// The local state is cleared first, so the client is signed out even
    /// if the provider call fails or this future is dropped part-way.
    pub async fn logout(&self) {
        self.invalidate();

        if let Err(e) = bounded(
            AuthOperation::SignOut.as_str(),
            self.config.request_timeout(),
            self.env.identity.sign_out(),
        )
        .await
        {
            tracing::warn!(error = %e, "Remote sign-out failed, local session cleared anyway");
        }
    }

    /// Clear the cached session and cancel the refresh timer.
    ///
    /// A refresh already in flight completes but its result is discarded.
    pub fn invalidate(&self) {
        let had_session = self.cache.invalidate();
        self.scheduler.cancel();

        if had_session {
            tracing::info!("Session invalidated");
            self.events.emit(&SessionEvent::SessionChanged { session: None });
        }
    }

    /// Sign in with an identifier and secret.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] if either input is empty
    /// - [`AuthError::InvalidCredentials`] if the provider rejected them
    /// - [`AuthError::Throttled`] if the provider is throttling sign-ins
    pub async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Session> {
        let identifier = normalize_identifier(identifier);
        if identifier.is_empty() || secret.is_empty() {
            return Err(AuthError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let session = bounded(
            AuthOperation::SignIn.as_str(),
            self.config.request_timeout(),
            self.env.identity.sign_in(&identifier, secret),
        )
        .await
        .map_err(|e| self.fail(AuthOperation::SignIn, e))?;

        self.cache.forget();
        self.scheduler.cancel();
        self.cache.set(Some(session.clone()));
        self.scheduler.track(&session);
        self.throttles.clear(AuthOperation::SignIn);

        tracing::info!(subject = %session.subject, "Signed in");
        self.events.emit(&SessionEvent::SessionChanged {
            session: Some(session.clone()),
        });
        Ok(session)
    }

    /// Ask the provider to email a password reset link.
    ///
    /// Inputs are validated before any network call.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] for a malformed email or redirect URL
    /// - [`AuthError::Throttled`] if the provider is throttling resets
    pub async fn request_password_reset(&self, identifier: &str, redirect_url: &str) -> Result<()> {
        let identifier = validate_identifier(identifier)?;
        let redirect_url = validate_redirect_url(redirect_url)?;

        bounded(
            AuthOperation::PasswordReset.as_str(),
            self.config.request_timeout(),
            self.env
                .identity
                .request_password_reset(&identifier, redirect_url.as_str()),
        )
        .await
        .map_err(|e| self.fail(AuthOperation::PasswordReset, e))?;

        self.throttles.clear(AuthOperation::PasswordReset);
        tracing::info!("Password reset requested");
        Ok(())
    }

    /// The signed-in user with best-effort profile details.
    ///
    /// The profile lookup uses the shorter auxiliary deadline; any failure
    /// yields `profile: None` instead of an error.
    ///
    /// # Errors
    ///
    /// Same as [`SessionManager::get_session`].
    pub async fn current_user(&self) -> Result<Option<CurrentUser>> {
        let Some(session) = self.get_session().await? else {
            return Ok(None);
        };

        let profile = match bounded(
            AuthOperation::Profile.as_str(),
            self.config.auxiliary_timeout(),
            self.env.identity.get_profile(&session.subject),
        )
        .await
        {
            Ok(profile) => profile,
            Err(e) => {
                tracing::debug!(error = %e, "Profile lookup failed, continuing without it");
                None
            }
        };

        Ok(Some(CurrentUser {
            subject: session.subject,
            profile,
        }))
    }

    /// The remembered throttling verdict for `operation`, until its
    /// estimated reset passes.
    #[must_use]
    pub fn throttle_status(&self, operation: impl Into<AuthOperation>) -> Option<RateLimitVerdict> {
        self.throttles.status(operation.into(), self.env.clock.now())
    }

    /// Classify an error from the identity collaborator.
    #[must_use]
    pub fn classify(&self, error: &AuthError) -> RateLimitVerdict {
        self.classifier.classify(error)
    }

    /// The classifier used by this manager.
    #[must_use]
    pub const fn classifier(&self) -> &RateLimitClassifier {
        &self.classifier
    }

    /// Whether `alternate` may be offered after `error`.
    ///
    /// Refused if the error blocks it under the configured policy, or if
    /// `alternate` is itself still throttled.
    #[must_use]
    pub fn should_allow_alternate(&self, error: &AuthError, alternate: AuthOperation) -> bool {
        self.classifier.should_allow_alternate(error, alternate)
            && self.throttle_status(alternate).is_none()
    }

    /// Current refresh scheduler phase.
    #[must_use]
    pub fn refresh_state(&self) -> RefreshState {
        self.scheduler.state()
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Follow session changes made by other clients of `store`.
    ///
    /// When another client writes the session key, the cached answer is
    /// dropped back to "unknown" and the timer is cancelled; the next
    /// [`SessionManager::get_session`] re-verifies with the collaborator.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn watch_store<S: DurableStore>(&self, store: &S) {
        let mut changes = store.subscribe();
        let me = store.client_id();
        let key = self.config.session_storage_key.clone();
        let cache = Arc::clone(&self.cache);
        let scheduler = self.scheduler.clone();

        let watcher = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) if change.key == key && change.is_external_to(me) => {
                        tracing::debug!(source = change.source, "Session changed in another client");
                        cache.forget();
                        scheduler.cancel();
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Store change notifications lagged, re-verifying session");
                        cache.forget();
                        scheduler.cancel();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(watcher);
    }

    /// Stop timers and watchers and drop every event handler.
    ///
    /// The cached session is forgotten; a refresh in flight completes for
    /// its waiters but changes nothing.
    pub fn shutdown(&self) {
        self.stop_watchers();
        self.cache.forget();
        self.scheduler.cancel();
        self.events.clear();
        tracing::debug!("Session manager shut down");
    }

    fn stop_watchers(&self) {
        for watcher in self
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            watcher.abort();
        }
    }

    /// Classify, remember and announce a failed collaborator call.
    fn fail(&self, operation: AuthOperation, error: AuthError) -> AuthError {
        let error = self.classifier.escalate(error, operation);
        if let Some(verdict) = error.verdict() {
            self.throttles.note(operation, verdict);
        }

        tracing::warn!(operation = %operation, error = %error, "Identity operation failed");
        self.events.emit(&SessionEvent::AuthError {
            operation,
            error: error.clone(),
        });
        error
    }
}

impl<P: IdentityProvider> Drop for SessionManager<P> {
    fn drop(&mut self) {
        self.stop_watchers();
        self.scheduler.cancel();
    }
}

impl<P: IdentityProvider> fmt::Debug for SessionManager<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("scheduler", &self.scheduler)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
