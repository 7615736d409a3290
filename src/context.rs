//! Application context shared by every call.

use std::sync::Arc;

use crate::client::PlatformClient;
use crate::config::Config;
use crate::error::AppError;
use crate::workspace::WorkspaceResolver;

/// Root application context.
///
/// Holds the process-wide dependencies. Per-call state (session, token) is
/// never stored here; it lives in [`CallContext`](crate::compose::CallContext).
#[derive(Clone)]
pub struct Context {
    /// Server configuration.
    pub config: Arc<Config>,
    /// Persisted workspace and credential resolution.
    pub resolver: Arc<WorkspaceResolver>,
    /// Platform API client.
    pub client: PlatformClient,
}

impl Context {
    /// Creates a new context with the given dependencies.
    pub fn new(config: Config, resolver: WorkspaceResolver, client: PlatformClient) -> Self {
        Self {
            config: Arc::new(config),
            resolver: Arc::new(resolver),
            client,
        }
    }

    /// Builds the context from server configuration.
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        let resolver = WorkspaceResolver::from_config(&config);
        let client = PlatformClient::new(&config.api_host)?;
        Ok(Self::new(config, resolver, client))
    }
}
