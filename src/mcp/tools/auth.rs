//! Authentication tools for local installations.

use rmcp::{
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    schemars::{self, JsonSchema},
    tool, tool_router, ErrorData as McpError,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::mcp::protocol;
use crate::mcp::server::McpServer;
use crate::workspace::ApiConfig;

/// Parameters for login tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginParams {
    /// Your platform API key.
    pub api_key: String,
}

#[tool_router(router = auth_tools, vis = "pub(crate)")]
impl McpServer {
    /// Store an API key in the local credentials file.
    ///
    /// Later calls pick it up on their next context composition.
    #[tool(
        description = "Authenticate with the platform API. You can get an API key from your \
                       account's API keys page."
    )]
    pub async fn login(
        &self,
        Parameters(params): Parameters<LoginParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!("Running login tool");

        let api_key = params.api_key.trim();
        if api_key.is_empty() {
            return Err(AppError::Validation("apiKey must not be empty".to_string()).into());
        }

        self.ctx
            .resolver
            .set_api_config(ApiConfig {
                api_key: api_key.to_string(),
                host: self.ctx.client.host().to_string(),
                ..Default::default()
            })
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to store API key");
                McpError::from(e)
            })?;

        protocol::text("Successfully authenticated")
    }
}
