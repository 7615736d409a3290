//! Bearer token resolution for inbound calls.
//!
//! The HTTP transport takes the token from each request's `Authorization`
//! header. The stdio transport has no headers and uses the locally configured
//! API key instead.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::workspace::WorkspaceResolver;

const BEARER_PREFIX: &str = "Bearer ";

/// Header-based token policy for the HTTP transport.
///
/// With a shared secret configured, only callers presenting exactly that
/// secret get a token attached. A mismatch attaches nothing and is not
/// reported; the call simply proceeds unauthenticated. Without a shared
/// secret, the caller's token is trusted to be their own platform credential
/// and passed through.
#[derive(Clone, Default)]
pub struct HeaderAuth {
    shared_secret: Option<String>,
}

impl HeaderAuth {
    pub fn new(shared_secret: Option<String>) -> Self {
        Self {
            shared_secret: shared_secret.filter(|s| !s.is_empty()),
        }
    }

    /// Whether callers are checked against a shared secret.
    pub fn has_shared_secret(&self) -> bool {
        self.shared_secret.is_some()
    }

    /// Returns the token to attach to the call, if any.
    pub fn resolve(&self, headers: &HeaderMap) -> Option<String> {
        let token = bearer_token(headers)?;

        match &self.shared_secret {
            Some(secret) if matches_secret(token, secret) => Some(token.to_string()),
            Some(_) => {
                tracing::debug!("Bearer token does not match shared secret");
                None
            }
            None => Some(token.to_string()),
        }
    }
}

/// Compares without short-circuiting on the first differing byte.
fn matches_secret(token: &str, secret: &str) -> bool {
    token.as_bytes().ct_eq(secret.as_bytes()).into()
}

impl std::fmt::Debug for HeaderAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderAuth")
            .field("shared_secret", &self.shared_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Extracts the token from the `Authorization` header.
///
/// A literal, case-sensitive `"Bearer "` prefix is stripped when present.
/// Missing, non-UTF-8 or empty values yield `None`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX).unwrap_or(value);

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Resolves the stdio transport's token from the local credentials.
///
/// Fails with [`AppError::AuthenticationRequired`] when no API key is
/// configured or persisted.
pub fn config_token(resolver: &WorkspaceResolver) -> Result<String, AppError> {
    let api = resolver.default_api_config()?;
    Ok(api.api_key)
}
