//! Mock identity collaborator for testing.

use crate::error::{AuthError, Result};
use crate::providers::IdentityProvider;
use crate::state::{AuthOperation, Session, UserProfile};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Script {
    sign_in: VecDeque<Result<Session>>,
    sign_out: VecDeque<Result<()>>,
    session_lookup: VecDeque<Result<Option<Session>>>,
    refresh: VecDeque<Result<Session>>,
    reset: VecDeque<Result<()>>,
    profile: VecDeque<Result<Option<UserProfile>>>,
    calls: HashMap<AuthOperation, usize>,
    refresh_tokens: Vec<String>,
    latency: Duration,
}

/// Mock identity collaborator.
///
/// Responses are scripted per operation and consumed in order. When a
/// queue is empty the mock falls back to a fixed default:
///
/// | Operation | Default |
/// |---|---|
/// | `sign_in` | `Err(InvalidCredentials)` |
/// | `sign_out` | `Ok(())` |
/// | `get_session` | `Ok(None)` |
/// | `refresh` | `Err(InvalidRefreshToken)` |
/// | `request_password_reset` | `Ok(())` |
/// | `get_profile` | `Ok(None)` |
///
/// Clones share the same script, so a test can keep one handle for
/// assertions while the manager owns another.
#[derive(Debug, Clone, Default)]
pub struct MockIdentityProvider {
    script: Arc<Mutex<Script>>,
}

impl MockIdentityProvider {
    /// Create a mock with empty scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency` (uses Tokio time).
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    /// Change the response delay.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Queue a `sign_in` response.
    pub fn push_sign_in(&self, response: Result<Session>) {
        self.lock().sign_in.push_back(response);
    }

    /// Queue a `sign_out` response.
    pub fn push_sign_out(&self, response: Result<()>) {
        self.lock().sign_out.push_back(response);
    }

    /// Queue a `get_session` response.
    pub fn push_session_lookup(&self, response: Result<Option<Session>>) {
        self.lock().session_lookup.push_back(response);
    }

    /// Queue a `refresh` response.
    pub fn push_refresh(&self, response: Result<Session>) {
        self.lock().refresh.push_back(response);
    }

    /// Queue a `request_password_reset` response.
    pub fn push_reset(&self, response: Result<()>) {
        self.lock().reset.push_back(response);
    }

    /// Queue a `get_profile` response.
    pub fn push_profile(&self, response: Result<Option<UserProfile>>) {
        self.lock().profile.push_back(response);
    }

    /// Number of calls made for `operation`.
    #[must_use]
    pub fn calls(&self, operation: AuthOperation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Refresh tokens presented so far, in call order.
    #[must_use]
    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.lock().refresh_tokens.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call, pick the scripted response and return it with the
    /// configured latency.
    fn respond<T>(
        &self,
        operation: AuthOperation,
        pick: impl FnOnce(&mut Script) -> Option<Result<T>>,
        default: impl FnOnce() -> Result<T>,
    ) -> impl Future<Output = Result<T>> + Send
    where
        T: Send + 'static,
    {
        let (latency, response) = {
            let mut script = self.lock();
            *script.calls.entry(operation).or_default() += 1;
            (script.latency, pick(&mut script))
        };
        let response = response.unwrap_or_else(default);

        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            response
        }
    }
}

impl IdentityProvider for MockIdentityProvider {
    fn sign_in(&self, _identifier: &str, _secret: &str) -> impl Future<Output = Result<Session>> + Send {
        self.respond(
            AuthOperation::SignIn,
            |s| s.sign_in.pop_front(),
            || Err(AuthError::InvalidCredentials),
        )
    }

    fn sign_out(&self) -> impl Future<Output = Result<()>> + Send {
        self.respond(AuthOperation::SignOut, |s| s.sign_out.pop_front(), || Ok(()))
    }

    fn get_session(&self) -> impl Future<Output = Result<Option<Session>>> + Send {
        self.respond(
            AuthOperation::SessionLookup,
            |s| s.session_lookup.pop_front(),
            || Ok(None),
        )
    }

    fn refresh(&self, refresh_token: &str) -> impl Future<Output = Result<Session>> + Send {
        let token = refresh_token.to_string();
        self.respond(
            AuthOperation::Refresh,
            move |s| {
                s.refresh_tokens.push(token);
                s.refresh.pop_front()
            },
            || Err(AuthError::InvalidRefreshToken),
        )
    }

    fn request_password_reset(
        &self,
        _identifier: &str,
        _redirect_url: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        self.respond(AuthOperation::PasswordReset, |s| s.reset.pop_front(), || Ok(()))
    }

    fn get_profile(&self, _subject: &str) -> impl Future<Output = Result<Option<UserProfile>>> + Send {
        self.respond(AuthOperation::Profile, |s| s.profile.pop_front(), || Ok(None))
    }
}
