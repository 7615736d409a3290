//! MCP server implementation for Skyport.

use std::sync::Arc;

use axum::http::request::Parts;
use rmcp::{
    handler::server::{router::tool::ToolRouter, ServerHandler},
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    service::RequestContext,
    tool_handler, ErrorData as McpError, RoleServer,
};

use crate::compose::{CallContext, Composer, HttpCall};
use crate::context::Context;

/// How calls reach this server, with the matching context composer.
#[derive(Clone)]
pub enum Transport {
    /// Single client over stdin/stdout.
    Stdio(Arc<Composer<()>>),
    /// Many clients over streamable HTTP.
    Http(Arc<Composer<HttpCall>>),
}

impl Transport {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stdio(_) => "stdio",
            Self::Http(_) => "http",
        }
    }
}

/// Skyport MCP Server for cloud platform workspace management.
///
/// This server provides AI assistants with tools to:
/// - List the workspaces the caller can access
/// - Select the workspace all further actions apply to
/// - Authenticate a local installation (stdio only)
#[derive(Clone)]
pub struct McpServer {
    pub(crate) ctx: Arc<Context>,
    transport: Transport,
    tool_router: ToolRouter<McpServer>,
}

impl McpServer {
    /// Create a new Skyport MCP server with the given context.
    pub fn new(ctx: Arc<Context>, transport: Transport) -> Self {
        tracing::info!(transport = transport.name(), "Initializing Skyport MCP server");

        let tool_router = Self::tool_router(&transport);
        Self {
            ctx,
            transport,
            tool_router,
        }
    }

    /// Build the combined tool router from all tool modules.
    ///
    /// `login` writes the local credentials file, so it is only offered to
    /// the single local client.
    fn tool_router(transport: &Transport) -> ToolRouter<Self> {
        match transport {
            Transport::Stdio(_) => Self::workspace_tools() + Self::auth_tools(),
            Transport::Http(_) => Self::workspace_tools(),
        }
    }

    /// Get direct access to the context.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Composes the session and auth context for one call.
    pub(crate) async fn call_context(
        &self,
        request: &RequestContext<RoleServer>,
    ) -> Result<CallContext, McpError> {
        let ct = request.ct.clone();
        let composed = match &self.transport {
            Transport::Stdio(composer) => composer.compose(ct, &()).await,
            Transport::Http(composer) => {
                let call = request
                    .extensions
                    .get::<Parts>()
                    .map(HttpCall::from_parts)
                    .unwrap_or_default();
                composer.compose(ct, &call).await
            }
        };

        composed.map_err(McpError::from)
    }
}

// ============================================================================
// Server Handler
// ============================================================================

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                r#"Skyport - Cloud Platform MCP Server

Acts on the user's cloud platform account. Every action applies to the
currently selected workspace.

## Getting Started

1. **list_workspaces** - List the workspaces you can access
2. **select_workspace** - Select one, ONLY after the user chose it explicitly
3. **get_selected_workspace** - Check which workspace is active

Never pick a workspace on the user's behalf: acting on the wrong workspace
can be destructive. The one exception is an account with exactly one
workspace, which list_workspaces selects automatically and reports.

## Authentication

- **login** - Store an API key locally (local installations only)
"#
                .to_string(),
            ),
        }
    }
}
