//! MCP protocol response helpers.

use rmcp::model::{CallToolResult, Content};
use rmcp::ErrorData as McpError;
use serde::Serialize;

/// Single-item response that serializes as the raw inner value.
///
/// # Example
///
/// ```ignore
/// Response(workspaces).into()
/// ```
pub struct Response<T>(pub T);

impl<T: Serialize> From<Response<T>> for Result<CallToolResult, McpError> {
    fn from(response: Response<T>) -> Self {
        let value = serde_json::to_value(&response.0)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::json(value)?]))
    }
}

/// Plain-text tool response.
pub fn text(message: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(message.into())]))
}
