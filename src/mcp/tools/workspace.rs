//! Workspace tools - listing, selecting and inspecting the active workspace.

use rmcp::{
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    schemars::{self, JsonSchema},
    service::RequestContext,
    tool, tool_router, ErrorData as McpError, RoleServer,
};
use serde::{Deserialize, Serialize};

use crate::client::Owner;
use crate::error::AppError;
use crate::mcp::protocol::{self, Response};
use crate::mcp::server::McpServer;

// ============================================================================
// Parameter Types
// ============================================================================

/// Parameters for select_workspace tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SelectWorkspaceParams {
    /// The ID of the owner (workspace) to select.
    #[serde(rename = "ownerID", alias = "ownerId")]
    pub owner_id: String,
}

// ============================================================================
// Response Types
// ============================================================================

/// Result of list_workspaces.
#[derive(Debug, Serialize)]
pub struct ListWorkspacesResult {
    /// Set when the only visible workspace was selected automatically.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_selected: Option<String>,
    pub workspaces: Vec<Owner>,
}

/// The workspace to select without asking, if any.
///
/// Only an account with exactly one workspace qualifies.
fn sole_workspace(owners: &[Owner]) -> Option<&Owner> {
    match owners {
        [only] => Some(only),
        _ => None,
    }
}

// ============================================================================
// Tool Router
// ============================================================================

#[tool_router(router = workspace_tools, vis = "pub(crate)")]
impl McpServer {
    /// List the workspaces the caller has access to.
    ///
    /// When exactly one workspace is visible it is selected for the session.
    #[tool(description = "List the workspaces that you have access to")]
    pub async fn list_workspaces(
        &self,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!("Running list_workspaces tool");

        let call = self.call_context(&context).await?;
        let workspaces = self
            .ctx
            .client
            .list_owners(call.api_token())
            .await
            .map_err(McpError::from)?;

        let auto_selected = match sole_workspace(&workspaces) {
            Some(only) => {
                call.select_workspace(&only.id)
                    .await
                    .map_err(McpError::from)?;
                tracing::info!(workspace = %only.id, "Only one workspace found, automatically selected it");
                Some(only.id.clone())
            }
            None => None,
        };

        tracing::info!(count = workspaces.len(), "Workspaces listed");

        Response(ListWorkspacesResult {
            auto_selected,
            workspaces,
        })
        .into()
    }

    /// Select the workspace used for all further actions in this session.
    #[tool(
        description = "Select a workspace to use for all actions. This tool should only be used \
                       after explicitly asking the user to select one, it should not be invoked \
                       as part of an automated process. Having the wrong workspace selected can \
                       lead to destructive actions being performed on unintended resources."
    )]
    pub async fn select_workspace(
        &self,
        Parameters(params): Parameters<SelectWorkspaceParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(workspace = %params.owner_id, "Running select_workspace tool");

        let owner_id = params.owner_id.trim();
        if owner_id.is_empty() {
            return Err(AppError::Validation("ownerID must not be empty".to_string()).into());
        }

        let call = self.call_context(&context).await?;
        call.select_workspace(owner_id)
            .await
            .map_err(McpError::from)?;

        protocol::text("Workspace selected")
    }

    /// Report the workspace selected for this session.
    #[tool(description = "Get the currently selected workspace")]
    pub async fn get_selected_workspace(
        &self,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!("Running get_selected_workspace tool");

        let call = self.call_context(&context).await?;
        let workspace = call.workspace().await.map_err(McpError::from)?;

        protocol::text(format!(
            "The currently selected workspace is: {}",
            workspace
        ))
    }
}
