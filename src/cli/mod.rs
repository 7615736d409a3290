//! CLI module for Skyport.
//!
//! Subcommands:
//! - `mcp`: Run the MCP server (stdio transport)
//! - `serve`: Run the MCP server (HTTP transport)

mod mcp;
mod serve;

use clap::{Parser, Subcommand};

/// Skyport - Cloud platform MCP gateway
#[derive(Parser)]
#[command(name = "skyport")]
#[command(about = "Cloud platform gateway - MCP server with per-session workspace scoping")]
#[command(version)]
pub struct App {
    /// Run in verbose mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the MCP server (stdio transport for local use)
    Mcp,

    /// Run the MCP server (HTTP transport for remote access)
    Serve {
        /// Host address to bind to [env: HOST, MCP_HOST; default: 0.0.0.0]
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on [env: PORT, MCP_PORT; default: 10000]
        #[arg(long)]
        port: Option<u16>,
    },
}

impl App {
    /// Run the CLI application.
    pub async fn run(self) -> color_eyre::Result<()> {
        match self.command {
            Command::Mcp => self.run_mcp().await,
            Command::Serve { ref host, port } => self.run_serve(host.as_deref(), port).await,
        }
    }
}
