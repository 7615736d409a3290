//! HTTP server command handler.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::middleware;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use color_eyre::Result;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::auth::HeaderAuth;
use crate::compose::Composer;
use crate::config::Config;
use crate::context::Context;
use crate::mcp::{McpServer, Transport};
use crate::session::{self, session_channel, SessionBackend, SessionChannel};

use super::App;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 10000;

/// Static facts reported by `/health`.
#[derive(Clone)]
struct HealthState {
    started_at: Instant,
    auth_token_configured: bool,
    session_store: &'static str,
    host: String,
    port: u16,
}

/// `/health` response body.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
    transport: &'static str,
    timestamp: String,
    uptime_seconds: f64,
    auth_token_configured: bool,
    session_store: &'static str,
    endpoints: Endpoints,
    listener: Listener,
}

#[derive(Serialize)]
struct Endpoints {
    mcp: &'static str,
    health: &'static str,
}

#[derive(Serialize)]
struct Listener {
    host: String,
    port: u16,
}

impl HealthState {
    fn status(&self) -> HealthStatus {
        HealthStatus {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            transport: "http",
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            auth_token_configured: self.auth_token_configured,
            session_store: self.session_store,
            endpoints: Endpoints {
                mcp: "/mcp",
                health: "/health",
            },
            listener: Listener {
                host: self.host.clone(),
                port: self.port,
            },
        }
    }
}

/// Handler for /health. Other methods get 405 from the router.
async fn health(State(state): State<HealthState>) -> Json<HealthStatus> {
    Json(state.status())
}

/// First non-empty value among the given environment variables.
fn first_non_empty_env(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.is_empty())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

impl App {
    /// Run the MCP server with HTTP transport.
    pub async fn run_serve(&self, host: Option<&str>, port: Option<u16>) -> Result<()> {
        tracing::info!("Starting Skyport HTTP server");

        let host = match host {
            Some(host) => host.to_string(),
            None => first_non_empty_env(&["HOST", "MCP_HOST"])
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        };
        let port = match port {
            Some(port) => port,
            None => match first_non_empty_env(&["PORT", "MCP_PORT"]) {
                Some(raw) => raw
                    .parse()
                    .map_err(|e| color_eyre::eyre::eyre!("Invalid port {}: {}", raw, e))?,
                None => DEFAULT_PORT,
            },
        };

        let config = Config::load()?;

        // Log auth status
        let auth = HeaderAuth::new(config.auth_token.clone());
        if auth.has_shared_secret() {
            tracing::info!("Shared secret authentication enabled");
        } else {
            tracing::warn!("No shared secret configured - caller tokens are passed through");
        }

        // A misconfigured shared store must stop startup
        let backend = SessionBackend::from_config(&config).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize session store");
            color_eyre::eyre::eyre!("Failed to initialize session store: {}", e)
        })?;
        let session_store = backend.name();
        let store = backend.into_store();

        let sweep = CancellationToken::new();
        tokio::spawn(session::sweep_expired(
            store.clone(),
            config.session_sweep_interval(),
            sweep.clone(),
        ));

        let ctx = Arc::new(Context::from_config(config)?);
        let transport = Transport::Http(Arc::new(Composer::http(store.clone(), auth.clone())));

        // rmcp runs stateless; session_channel owns the session header
        let service = StreamableHttpService::new(
            move || Ok(McpServer::new(ctx.clone(), transport.clone())),
            Arc::new(LocalSessionManager::default()),
            StreamableHttpServerConfig {
                stateful_mode: false,
                ..Default::default()
            },
        );
        let mcp = Router::new()
            .nest_service("/mcp", service)
            .layer(middleware::from_fn_with_state(
                SessionChannel::new(store),
                session_channel,
            ));

        let health_state = HealthState {
            started_at: Instant::now(),
            auth_token_configured: auth.has_shared_secret(),
            session_store,
            host: host.clone(),
            port,
        };

        let app = Router::new()
            .route("/health", get(health))
            .with_state(health_state)
            .merge(mcp);

        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .map_err(|e| color_eyre::eyre::eyre!("Invalid address {}:{}: {}", host, port, e))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| color_eyre::eyre::eyre!("Failed to bind to {}: {}", addr, e))?;

        tracing::info!("Skyport HTTP server listening on http://{}", addr);

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await;
        sweep.cancel();
        served.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            color_eyre::eyre::eyre!("HTTP server error: {}", e)
        })?;

        tracing::info!("HTTP server shutting down");
        Ok(())
    }
}
