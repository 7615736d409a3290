//! Model Context Protocol (MCP) server implementation for Skyport.
//!
//! This module provides an MCP server that lets AI assistants act on a cloud
//! platform account on behalf of the connected user.
//!
//! ## Architecture
//!
//! Every tool call first composes a [`CallContext`](crate::compose::CallContext)
//! through the transport's [`Composer`](crate::compose::Composer). Tools read
//! the session and token from that context only.
//!
//! ## Modules
//!
//! - `server`: MCP server implementation with tool router
//! - `protocol`: response helpers
//! - `tools`: Tool implementations organized by domain

mod protocol;
pub(crate) mod server;
mod tools;

pub use server::{McpServer, Transport};
