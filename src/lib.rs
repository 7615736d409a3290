//! Skyport - Cloud platform MCP gateway
//!
//! Exposes a cloud platform's resource API as MCP tools over stdio (one local
//! client per process) or streamable HTTP (many remote clients per instance),
//! giving every call a correctly scoped session, workspace and credential.

pub mod auth;
pub mod cli;
pub mod client;
pub mod compose;
pub mod config;
pub mod context;
pub mod error;
pub mod mcp;
pub mod session;
pub mod workspace;
