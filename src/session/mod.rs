//! Per-session workspace state.
//!
//! A session is the identity scope a workspace selection is bound to. Over
//! HTTP there is one per `Mcp-Session-Id`; over stdio the whole process is a
//! single implicit session.
//!
//! - [`SessionStore`] - backend contract for HTTP sessions
//! - [`MemoryStore`] - process-local backend
//! - [`PostgresStore`] - shared backend for multi-instance deployments
//! - [`SessionBackend`] - startup-time backend selection
//! - [`Session`] - the handle tool handlers see
//! - [`session_channel`] - issues and closes HTTP session keys
//!
//! HTTP sessions expire after a period without reads or writes and are
//! removed as soon as the client closes its channel.

mod channel;
mod memory;
mod postgres;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::AppError;
use crate::workspace::WorkspaceResolver;

pub use channel::{session_channel, session_key, SessionChannel, SESSION_ID_HEADER};
pub use memory::MemoryStore;
pub use postgres::{PostgresStore, RetryPolicy};

/// Idle lifetime of an HTTP session when none is configured.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    /// Generates a fresh random key.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for SessionKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage for per-session workspace selections.
///
/// Implementations must be safe to share across many concurrent sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Allocates a new session identity.
    ///
    /// Nothing is stored until a workspace is set, so keys that never select
    /// one cost nothing.
    async fn create_session(&self) -> Result<SessionKey, AppError>;

    /// Returns the workspace last set for `key` and extends its lifetime.
    ///
    /// Fails with [`AppError::NoWorkspaceSelected`] if none was set or the
    /// session expired.
    async fn get_workspace(&self, key: &SessionKey) -> Result<String, AppError>;

    /// Associates `workspace_id` with `key`. Last write wins.
    async fn set_workspace(&self, key: &SessionKey, workspace_id: &str) -> Result<(), AppError>;

    /// Forgets `key`. Removing an unknown key is not an error.
    async fn remove_session(&self, key: &SessionKey) -> Result<(), AppError>;

    /// Drops every expired session, returning how many were dropped.
    async fn purge_expired(&self) -> Result<u64, AppError>;
}

/// The session store backend, chosen once at startup.
pub enum SessionBackend {
    Memory(MemoryStore),
    Postgres(PostgresStore),
}

impl SessionBackend {
    /// Selects the shared backend when a store URL is configured, otherwise
    /// the in-memory one.
    ///
    /// Fails with [`AppError::BackendUnavailable`] if the shared backend is
    /// configured but cannot be reached.
    pub async fn from_config(config: &Config) -> Result<Self, AppError> {
        match config.session_store_url() {
            Some(url) => {
                tracing::info!("Using PostgreSQL session store");
                let retry = RetryPolicy {
                    timeout: config.session_op_timeout(),
                    max_attempts: config.session_max_attempts.max(1),
                    ..RetryPolicy::default()
                };
                let store = PostgresStore::connect(url, config.session_ttl(), retry).await?;
                Ok(Self::Postgres(store))
            }
            None => {
                tracing::info!("Using in-memory session store");
                Ok(Self::Memory(MemoryStore::with_ttl(config.session_ttl())))
            }
        }
    }

    /// Short backend name for status reporting.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Postgres(_) => "postgres",
        }
    }

    pub fn into_store(self) -> Arc<dyn SessionStore> {
        match self {
            Self::Memory(store) => Arc::new(store),
            Self::Postgres(store) => Arc::new(store),
        }
    }
}

/// The session a call belongs to.
///
/// Handlers read and change the workspace only through this handle, so the
/// same handler code serves both transports.
#[derive(Clone)]
pub enum Session {
    /// The single implicit session of a stdio process.
    Stdio(Arc<WorkspaceResolver>),
    /// An HTTP session stored in the configured backend.
    Http {
        key: SessionKey,
        store: Arc<dyn SessionStore>,
    },
}

impl Session {
    /// The session key, if this is an HTTP session.
    pub fn key(&self) -> Option<&SessionKey> {
        match self {
            Self::Stdio(_) => None,
            Self::Http { key, .. } => Some(key),
        }
    }

    /// Returns the selected workspace, aborting if `ct` is cancelled first.
    pub async fn get_workspace(&self, ct: &CancellationToken) -> Result<String, AppError> {
        match self {
            Self::Stdio(resolver) => resolver.workspace_id(),
            Self::Http { key, store } => cancellable(ct, store.get_workspace(key)).await,
        }
    }

    /// Selects a workspace, aborting if `ct` is cancelled first.
    pub async fn set_workspace(
        &self,
        ct: &CancellationToken,
        workspace_id: &str,
    ) -> Result<(), AppError> {
        match self {
            Self::Stdio(resolver) => {
                resolver.select_workspace(workspace_id);
                Ok(())
            }
            Self::Http { key, store } => {
                cancellable(ct, store.set_workspace(key, workspace_id)).await
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio(_) => f.write_str("Session::Stdio"),
            Self::Http { key, .. } => f.debug_struct("Session::Http").field("key", key).finish(),
        }
    }
}

/// Periodically drops expired sessions until `ct` is cancelled.
pub async fn sweep_expired(
    store: Arc<dyn SessionStore>,
    interval: Duration,
    ct: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ct.cancelled() => break,
            _ = ticker.tick() => match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Swept expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Failed to sweep expired sessions"),
            },
        }
    }
}

/// Races `fut` against cancellation of the call.
pub(crate) async fn cancellable<T>(
    ct: &CancellationToken,
    fut: impl Future<Output = Result<T, AppError>>,
) -> Result<T, AppError> {
    tokio::select! {
        biased;
        _ = ct.cancelled() => Err(AppError::Cancelled),
        result = fut => result,
    }
}
