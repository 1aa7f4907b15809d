//! Identity collaborator trait.

use crate::error::Result;
use crate::state::{Session, UserProfile};

/// Identity collaborator.
///
/// This trait abstracts over the hosted identity service that issues and
/// renews sessions.
///
/// # Implementation Notes
///
/// - Map transport failures to `AuthError::TransientNetwork`
/// - Map a rejected refresh token to `AuthError::InvalidRefreshToken`
/// - Pass any other provider message through as `AuthError::Provider`,
///   verbatim, so throttling can be recognised from its text
/// - Calls may stall; callers impose their own deadlines
pub trait IdentityProvider: Send + Sync + 'static {
    /// Sign in with an identifier and secret.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Credentials are wrong → `AuthError::InvalidCredentials`
    /// - The provider is throttling → `AuthError::Provider` with its message
    /// - Network request fails
    fn sign_in(
        &self,
        identifier: &str,
        secret: &str,
    ) -> impl std::future::Future<Output = Result<Session>> + Send;

    /// Sign out the current session on the provider side.
    ///
    /// # Errors
    ///
    /// Returns error if network request fails or the session is already
    /// invalid.
    fn sign_out(&self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Look up the current session.
    ///
    /// # Returns
    ///
    /// `None` when the user is confirmed signed out.
    ///
    /// # Errors
    ///
    /// Returns error if network request fails.
    fn get_session(&self) -> impl std::future::Future<Output = Result<Option<Session>>> + Send;

    /// Exchange a refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Refresh token not found, revoked or expired → `AuthError::InvalidRefreshToken`
    /// - Network request fails → `AuthError::TransientNetwork`
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl std::future::Future<Output = Result<Session>> + Send;

    /// Send a password reset email that links back to `redirect_url`.
    ///
    /// # Errors
    ///
    /// Returns error if the provider rejects the request or the network
    /// request fails.
    fn request_password_reset(
        &self,
        identifier: &str,
        redirect_url: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Fetch profile details for `subject`.
    ///
    /// # Returns
    ///
    /// `None` if the user has no profile.
    ///
    /// # Errors
    ///
    /// Returns error if network request fails.
    fn get_profile(
        &self,
        subject: &str,
    ) -> impl std::future::Future<Output = Result<Option<UserProfile>>> + Send;
}
