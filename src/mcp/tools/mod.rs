//! MCP tool implementations organized by domain.

pub mod auth;
pub mod workspace;
