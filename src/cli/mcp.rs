//! MCP server command handler.

use std::sync::Arc;

use color_eyre::Result;
use rmcp::ServiceExt;

use crate::auth;
use crate::compose::Composer;
use crate::config::Config;
use crate::context::Context;
use crate::mcp::{McpServer, Transport};

use super::App;

impl App {
    /// Run the MCP server with stdio transport.
    pub async fn run_mcp(&self) -> Result<()> {
        tracing::info!("Starting Skyport MCP server");

        let config = Config::load()?;
        let ctx = Arc::new(Context::from_config(config)?);

        // Every call in this process runs on the local credential, and there
        // is no per-call header to fall back on.
        auth::config_token(&ctx.resolver).map_err(|e| {
            tracing::error!(error = %e, "Error getting API token from config");
            color_eyre::eyre::eyre!("Error getting API token from config: {}", e)
        })?;

        let transport = Transport::Stdio(Arc::new(Composer::stdio(ctx.resolver.clone())));
        let server = McpServer::new(ctx, transport);

        let service = server.serve(rmcp::transport::stdio()).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to start MCP server");
            color_eyre::eyre::eyre!("Failed to start MCP server: {}", e)
        })?;

        tracing::info!("MCP server started, waiting for connections");

        service.waiting().await.map_err(|e| {
            tracing::error!(error = %e, "MCP server error");
            color_eyre::eyre::eyre!("MCP server error: {}", e)
        })?;

        tracing::info!("MCP server shutting down");
        Ok(())
    }
}
