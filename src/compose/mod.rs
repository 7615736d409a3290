//! Per-call context composition.
//!
//! Before a tool runs, the transport adapter builds a [`CallContext`] by
//! running an ordered list of [`ContextStep`]s over the transport's native
//! input. Each transport has its own list:
//!
//! | Transport | Input | Steps |
//! |-----------|-------|-------|
//! | HTTP | [`HttpCall`] (session key + headers) | `http_session`, `header_token` |
//! | stdio | `()` | `stdio_session`, `config_token` |
//!
//! Session identity always comes first, then the auth token. Steps only add
//! to the context; [`CallContext`] has no way to remove a value. The context
//! is built by value and handed out only after every step succeeded, so a
//! cancelled composition leaves nothing half-applied.

mod steps;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use tokio_util::sync::CancellationToken;

use crate::auth::HeaderAuth;
use crate::error::AppError;
use crate::session::{session_key, Session, SessionKey, SessionStore};
use crate::workspace::WorkspaceResolver;

pub use steps::{ConfigTokenStep, HeaderTokenStep, HttpSessionStep, StdioSessionStep};

pub use crate::session::SESSION_ID_HEADER;

/// Session and auth state for one call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    ct: CancellationToken,
    session: Option<Session>,
    api_token: Option<String>,
}

impl CallContext {
    /// An empty context bound to the call's cancellation token.
    pub fn new(ct: CancellationToken) -> Self {
        Self {
            ct,
            ..Default::default()
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.ct
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// The bearer token for platform calls, if the call is authenticated.
    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    /// Like [`api_token`](Self::api_token), but fails when absent.
    pub fn require_api_token(&self) -> Result<&str, AppError> {
        self.api_token().ok_or(AppError::AuthenticationRequired)
    }

    /// The workspace selected for this call's session.
    pub async fn workspace(&self) -> Result<String, AppError> {
        match &self.session {
            Some(session) => session.get_workspace(&self.ct).await,
            None => Err(AppError::NoWorkspaceSelected),
        }
    }

    /// Selects a workspace for this call's session.
    pub async fn select_workspace(&self, workspace_id: &str) -> Result<(), AppError> {
        match &self.session {
            Some(session) => session.set_workspace(&self.ct, workspace_id).await,
            None => Err(AppError::Validation(
                "call is not bound to a session".to_string(),
            )),
        }
    }
}

/// Native per-call input of the HTTP transport.
#[derive(Debug, Clone, Default)]
pub struct HttpCall {
    /// Session key issued by the [`session_channel`](crate::session::session_channel), if any.
    pub session_key: Option<SessionKey>,
    pub headers: HeaderMap,
}

impl HttpCall {
    pub fn new(session_key: Option<SessionKey>, headers: HeaderMap) -> Self {
        Self {
            session_key,
            headers,
        }
    }

    /// Builds the input from the HTTP request that carried the call.
    pub fn from_parts(parts: &Parts) -> Self {
        Self::new(session_key(&parts.headers), parts.headers.clone())
    }
}

/// One enrichment step of a [`Composer`].
#[async_trait]
pub trait ContextStep<I: Sync>: Send + Sync {
    /// Step name for logging.
    fn name(&self) -> &'static str;

    /// Returns `ctx` enriched from `input`.
    async fn apply(&self, ctx: CallContext, input: &I) -> Result<CallContext, AppError>;
}

/// Ordered list of context steps for one transport.
pub struct Composer<I: Sync> {
    steps: Vec<Box<dyn ContextStep<I>>>,
}

impl<I: Sync> Default for Composer<I> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<I: Sync> Composer<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step; steps run in the order they were added.
    pub fn step(mut self, step: impl ContextStep<I> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Runs every step in order over a fresh context.
    pub async fn compose(
        &self,
        ct: CancellationToken,
        input: &I,
    ) -> Result<CallContext, AppError> {
        let mut ctx = CallContext::new(ct);
        for step in &self.steps {
            ctx = step.apply(ctx, input).await?;
            tracing::trace!(step = step.name(), "Applied context step");
        }
        Ok(ctx)
    }
}

impl Composer<HttpCall> {
    /// Steps for the multi-tenant HTTP transport.
    pub fn http(store: Arc<dyn SessionStore>, auth: HeaderAuth) -> Self {
        Self::new()
            .step(HttpSessionStep::new(store))
            .step(HeaderTokenStep::new(auth))
    }
}

impl Composer<()> {
    /// Steps for the single-tenant stdio transport.
    pub fn stdio(resolver: Arc<WorkspaceResolver>) -> Self {
        Self::new()
            .step(StdioSessionStep::new(resolver.clone()))
            .step(ConfigTokenStep::new(resolver))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::header::AUTHORIZATION;
    use axum::http::{HeaderValue, Request};
    use tempfile::TempDir;

    use super::*;
    use crate::session::MemoryStore;

    fn http_call(session: &str, authorization: Option<&str>) -> HttpCall {
        let mut headers = HeaderMap::new();
        if let Some(value) = authorization {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        HttpCall::new(Some(SessionKey::from(session)), headers)
    }

    fn http_composer(secret: Option<&str>) -> (Arc<MemoryStore>, Composer<HttpCall>) {
        let store = Arc::new(MemoryStore::new());
        let composer = Composer::http(store.clone(), HeaderAuth::new(secret.map(String::from)));
        (store, composer)
    }

    #[test]
    fn test_step_order() {
        let (_, composer) = http_composer(None);
        assert_eq!(composer.step_names(), vec!["http_session", "header_token"]);

        let dir = TempDir::new().unwrap();
        let resolver = Arc::new(WorkspaceResolver::new(dir.path().join("c.toml"), None));
        let composer = Composer::stdio(resolver);
        assert_eq!(composer.step_names(), vec!["stdio_session", "config_token"]);
    }

    #[test]
    fn test_empty_context_is_absent() {
        let ctx = CallContext::default();
        assert!(ctx.session().is_none());
        assert!(ctx.api_token().is_none());
        assert!(matches!(
            ctx.require_api_token(),
            Err(AppError::AuthenticationRequired)
        ));
    }

    #[tokio::test]
    async fn test_wrong_token_with_shared_secret() {
        let (_, composer) = http_composer(Some("secret123"));
        let ctx = composer
            .compose(CancellationToken::new(), &http_call("s-1", Some("Bearer wrong")))
            .await
            .unwrap();

        assert!(ctx.api_token().is_none());
        // The call still gets its session
        assert_eq!(ctx.session().and_then(Session::key), Some(&SessionKey::from("s-1")));
    }

    #[tokio::test]
    async fn test_matching_token_with_shared_secret() {
        let (_, composer) = http_composer(Some("secret123"));
        let ctx = composer
            .compose(CancellationToken::new(), &http_call("s-1", Some("Bearer secret123")))
            .await
            .unwrap();

        assert_eq!(ctx.api_token(), Some("secret123"));
    }

    #[tokio::test]
    async fn test_header_token_without_shared_secret() {
        let (_, composer) = http_composer(None);

        let ctx = composer
            .compose(CancellationToken::new(), &http_call("s-1", Some("Bearer abc")))
            .await
            .unwrap();
        assert_eq!(ctx.api_token(), Some("abc"));

        let ctx = composer
            .compose(CancellationToken::new(), &http_call("s-1", None))
            .await
            .unwrap();
        assert!(ctx.api_token().is_none());
    }

    #[tokio::test]
    async fn test_http_session_is_shared_across_calls() {
        let (store, composer) = http_composer(None);

        let first = composer
            .compose(CancellationToken::new(), &http_call("s-1", None))
            .await
            .unwrap();
        first.select_workspace("ws-1").await.unwrap();

        let second = composer
            .compose(CancellationToken::new(), &http_call("s-1", None))
            .await
            .unwrap();
        assert_eq!(second.workspace().await.unwrap(), "ws-1");
        assert_eq!(
            store.get_workspace(&SessionKey::from("s-1")).await.unwrap(),
            "ws-1"
        );

        let other = composer
            .compose(CancellationToken::new(), &http_call("s-2", None))
            .await
            .unwrap();
        assert!(matches!(
            other.workspace().await,
            Err(AppError::NoWorkspaceSelected)
        ));
    }

    #[tokio::test]
    async fn test_missing_session_key_allocates_one() {
        let (_, composer) = http_composer(None);
        let ctx = composer
            .compose(CancellationToken::new(), &HttpCall::default())
            .await
            .unwrap();

        let key = ctx.session().and_then(Session::key).unwrap();
        assert!(!key.as_str().is_empty());
    }

    #[tokio::test]
    async fn test_stdio_composition() {
        let dir = TempDir::new().unwrap();
        let resolver = Arc::new(
            WorkspaceResolver::new(dir.path().join("c.toml"), Some("ws-seed".into()))
                .with_api_override(Some("key-1".into()), "https://api.example"),
        );

        let ctx = Composer::stdio(resolver)
            .compose(CancellationToken::new(), &())
            .await
            .unwrap();

        assert_eq!(ctx.api_token(), Some("key-1"));
        assert_eq!(ctx.workspace().await.unwrap(), "ws-seed");
    }

    #[tokio::test]
    async fn test_stdio_without_credentials_is_unauthenticated() {
        let dir = TempDir::new().unwrap();
        let resolver = Arc::new(WorkspaceResolver::new(dir.path().join("c.toml"), None));

        let ctx = Composer::stdio(resolver)
            .compose(CancellationToken::new(), &())
            .await
            .unwrap();

        assert!(ctx.session().is_some());
        assert!(ctx.api_token().is_none());
    }

    struct Expect {
        session: bool,
        token: bool,
    }

    #[async_trait]
    impl ContextStep<HttpCall> for Expect {
        fn name(&self) -> &'static str {
            "expect"
        }

        async fn apply(&self, ctx: CallContext, _: &HttpCall) -> Result<CallContext, AppError> {
            assert_eq!(ctx.session().is_some(), self.session);
            assert_eq!(ctx.api_token().is_some(), self.token);
            Ok(ctx)
        }
    }

    #[tokio::test]
    async fn test_later_steps_see_earlier_values() {
        let store = Arc::new(MemoryStore::new());
        let composer = Composer::<HttpCall>::new()
            .step(Expect { session: false, token: false })
            .step(HttpSessionStep::new(store))
            .step(Expect { session: true, token: false })
            .step(HeaderTokenStep::new(HeaderAuth::new(None)))
            .step(Expect { session: true, token: true });

        composer
            .compose(CancellationToken::new(), &http_call("s-1", Some("Bearer abc")))
            .await
            .unwrap();
    }

    #[test]
    fn test_http_call_from_request_parts() {
        let request = Request::builder()
            .header(SESSION_ID_HEADER, "s-42")
            .header(AUTHORIZATION, "Bearer abc")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();

        let call = HttpCall::from_parts(&parts);

        assert_eq!(call.session_key, Some(SessionKey::from("s-42")));
        assert!(call.headers.contains_key(AUTHORIZATION));
    }
}
