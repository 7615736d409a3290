//! Session identity for the streamable HTTP channel.
//!
//! The MCP service runs stateless, so any server instance can answer any
//! request. This layer owns the `Mcp-Session-Id` header instead: a `POST`
//! without one gets a fresh key, which is echoed on the response for the
//! client to send back, and a `DELETE` closes the session in the store.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::{SessionKey, SessionStore};

/// Header carrying the streamable HTTP session identifier.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Middleware state for [`session_channel`].
#[derive(Clone)]
pub struct SessionChannel {
    store: Arc<dyn SessionStore>,
}

impl SessionChannel {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }
}

/// Reads the session key a request carries, ignoring empty values.
pub fn session_key(headers: &HeaderMap) -> Option<SessionKey> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(SessionKey::from)
}

/// Issues session keys to new clients and removes sessions on `DELETE`.
pub async fn session_channel(
    State(channel): State<SessionChannel>,
    mut req: Request,
    next: Next,
) -> Response {
    let existing = session_key(req.headers());

    if req.method() == Method::DELETE {
        let Some(key) = existing else {
            return (StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header").into_response();
        };
        return match channel.store.remove_session(&key).await {
            Ok(()) => {
                tracing::debug!(session = %key, "Session closed");
                StatusCode::NO_CONTENT.into_response()
            }
            Err(e) => {
                tracing::warn!(session = %key, error = %e, "Failed to close session");
                StatusCode::SERVICE_UNAVAILABLE.into_response()
            }
        };
    }

    if existing.is_some() || req.method() != Method::POST {
        return next.run(req).await;
    }

    let key = match channel.store.create_session().await {
        Ok(key) => key,
        Err(e) => {
            tracing::error!(error = %e, "Failed to allocate session");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };
    let Ok(value) = HeaderValue::from_str(key.as_str()) else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    tracing::debug!(session = %key, "Issued session");
    req.headers_mut().insert(SESSION_ID_HEADER, value.clone());

    let mut response = next.run(req).await;
    response.headers_mut().insert(SESSION_ID_HEADER, value);
    response
}
