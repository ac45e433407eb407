//! Daemon entry point for the knowledge-base MCP server.
//!
//! Loads configuration from the command line and environment, builds the
//! bridge to the KB CLI, and serves the MCP protocol over stdio or HTTP.

mod config;

use std::sync::Arc;

use kb_core::bridge::KbBridge;
use kb_mcp::server::{McpHttpServerConfig, serve_stdio, serve_streamable_http};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{DaemonConfig, Transport};

const DEFAULT_LOG_FILTER: &str = "kb_mcpd=info,kb_mcp=info,kb_core=info";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // stdout belongs to the stdio transport.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = DaemonConfig::from_args()?;
    info!(
        interpreter = %config.interpreter,
        script = %config.script.display(),
        root = %config.root.display(),
        "starting kb-mcpd"
    );
    let bridge = Arc::new(KbBridge::new(config.kb_config()));

    match config.transport {
        Transport::Stdio => serve_stdio(bridge).await,
        Transport::Http => {
            let http = McpHttpServerConfig::new(config.mcp_http_addr)
                .with_stateful_mode(config.stateful);
            serve_streamable_http(bridge, http).await
        }
    }
}
