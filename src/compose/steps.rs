//! Built-in context steps.

use std::sync::Arc;

use async_trait::async_trait;

use super::{CallContext, ContextStep, HttpCall};
use crate::auth::{self, HeaderAuth};
use crate::error::AppError;
use crate::session::{cancellable, Session, SessionStore};
use crate::workspace::WorkspaceResolver;

/// Binds an HTTP call to its session in the store.
///
/// Calls that reach the composer without a session key get a freshly
/// allocated one. Nothing is stored for it unless the call selects a
/// workspace.
pub struct HttpSessionStep {
    store: Arc<dyn SessionStore>,
}

impl HttpSessionStep {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ContextStep<HttpCall> for HttpSessionStep {
    fn name(&self) -> &'static str {
        "http_session"
    }

    async fn apply(&self, ctx: CallContext, input: &HttpCall) -> Result<CallContext, AppError> {
        let key = match &input.session_key {
            Some(key) => key.clone(),
            None => {
                let key = cancellable(ctx.cancellation(), self.store.create_session()).await?;
                tracing::debug!(session = %key, "Allocated session for call without session id");
                key
            }
        };

        Ok(ctx.with_session(Session::Http {
            key,
            store: self.store.clone(),
        }))
    }
}

/// Attaches the bearer token from the request headers.
pub struct HeaderTokenStep {
    auth: HeaderAuth,
}

impl HeaderTokenStep {
    pub fn new(auth: HeaderAuth) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl ContextStep<HttpCall> for HeaderTokenStep {
    fn name(&self) -> &'static str {
        "header_token"
    }

    async fn apply(&self, ctx: CallContext, input: &HttpCall) -> Result<CallContext, AppError> {
        Ok(match self.auth.resolve(&input.headers) {
            Some(token) => ctx.with_api_token(token),
            None => ctx,
        })
    }
}

/// Binds a stdio call to the process-wide session.
pub struct StdioSessionStep {
    resolver: Arc<WorkspaceResolver>,
}

impl StdioSessionStep {
    pub fn new(resolver: Arc<WorkspaceResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl ContextStep<()> for StdioSessionStep {
    fn name(&self) -> &'static str {
        "stdio_session"
    }

    async fn apply(&self, ctx: CallContext, _: &()) -> Result<CallContext, AppError> {
        Ok(ctx.with_session(Session::Stdio(self.resolver.clone())))
    }
}

/// Attaches the locally configured API key.
///
/// The key is resolved again for every call so a `login` takes effect
/// immediately. Startup already refused to run without a key, so a failure
/// here leaves the call unauthenticated instead of stopping the process.
pub struct ConfigTokenStep {
    resolver: Arc<WorkspaceResolver>,
}

impl ConfigTokenStep {
    pub fn new(resolver: Arc<WorkspaceResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl ContextStep<()> for ConfigTokenStep {
    fn name(&self) -> &'static str {
        "config_token"
    }

    async fn apply(&self, ctx: CallContext, _: &()) -> Result<CallContext, AppError> {
        match auth::config_token(&self.resolver) {
            Ok(token) => Ok(ctx.with_api_token(token)),
            Err(e) => {
                tracing::error!(error = %e, "Error getting API token from config");
                Ok(ctx)
            }
        }
    }
}
