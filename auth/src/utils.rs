//! Input validation helpers.

use crate::error::{AuthError, Result};
use url::Url;

/// Normalize a user-supplied identifier for use as a ledger key.
///
/// # Examples
///
/// ```
/// use ballotbox_auth::utils::normalize_identifier;
///
/// assert_eq!(normalize_identifier("  A@X.com "), "a@x.com");
/// ```
#[must_use]
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// Validate email address format.
///
/// This performs basic RFC 5322 validation:
/// - Must contain exactly one `@`
/// - Must have non-empty local and domain parts
/// - Length must be between 3 and 255 characters
///
/// # Examples
///
/// ```
/// use ballotbox_auth::utils::is_valid_email;
///
/// assert!(is_valid_email("user@example.com"));
/// assert!(is_valid_email("user+tag@subdomain.example.com"));
/// assert!(!is_valid_email("invalid"));
/// assert!(!is_valid_email("@example.com"));
/// assert!(!is_valid_email("user@"));
/// ```
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 3 || email.len() > 255 {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }

    let valid_local_chars = |c: char| c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_');
    let valid_domain_chars = |c: char| c.is_alphanumeric() || matches!(c, '.' | '-');

    local.chars().all(valid_local_chars)
        && domain.chars().all(valid_domain_chars)
        && domain.contains('.')
        && domain.split('.').all(|part| !part.is_empty())
}

/// Validate a password reset identifier.
///
/// # Errors
///
/// Returns [`AuthError::Validation`] if the identifier is not an email
/// address.
pub fn validate_identifier(identifier: &str) -> Result<String> {
    let normalized = normalize_identifier(identifier);
    if normalized.is_empty() {
        return Err(AuthError::Validation("Email address is required".to_string()));
    }
    if !is_valid_email(&normalized) {
        return Err(AuthError::Validation(format!(
            "'{normalized}' is not a valid email address"
        )));
    }
    Ok(normalized)
}

/// Validate a redirect URL: it must be absolute and use `http` or `https`.
///
/// # Errors
///
/// Returns [`AuthError::Validation`] if the URL cannot be parsed or uses
/// another scheme.
///
/// # Examples
///
/// ```
/// use ballotbox_auth::utils::validate_redirect_url;
///
/// assert!(validate_redirect_url("https://polls.example.com/reset").is_ok());
/// assert!(validate_redirect_url("/reset").is_err());
/// assert!(validate_redirect_url("javascript:alert(1)").is_err());
/// ```
pub fn validate_redirect_url(redirect_url: &str) -> Result<Url> {
    let url = Url::parse(redirect_url.trim())
        .map_err(|e| AuthError::Validation(format!("Malformed redirect URL: {e}")))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err(AuthError::Validation(
            "Redirect URL must include a host".to_string(),
        )),
        scheme => Err(AuthError::Validation(format!(
            "Redirect URL must use http or https, got '{scheme}'"
        ))),
    }
}
