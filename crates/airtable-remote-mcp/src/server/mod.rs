//! MCP server over Streamable HTTP.
//!
//! ## Never-Failing Architecture
//!
//! The transport implements a robust "mailbox" pattern:
//! - Session-based message buffering with ring buffer
//! - Last-Event-ID support for reconnection recovery
//! - Broadcast channels for live event delivery
//! - Background cleanup of stale sessions and expired OAuth state

pub mod oauth;
pub mod session;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::client::AirtableClient;
use crate::config::Config;
use crate::tools::{self, McpTool, ToolContext};

/// MCP server for Airtable.
pub struct McpServer {
    /// Tool execution context.
    ctx: ToolContext,

    /// Registered tools.
    tools: Vec<Box<dyn McpTool>>,

    /// Embedded OAuth 2.1 authorization server.
    oauth_store: Arc<oauth::OAuthStore>,

    config: Config,
}

impl McpServer {
    /// Create a new MCP server.
    #[must_use]
    pub fn new(client: AirtableClient, config: Config) -> Self {
        let ctx = ToolContext::new(Arc::new(client));
        let tools = tools::register_all_tools();
        let oauth_store = Arc::new(oauth::OAuthStore::new(&config));

        Self { ctx, tools, oauth_store, config }
    }

    /// Run the HTTP server until shutdown.
    ///
    /// # Errors
    ///
    /// Returns error on bind or server failure.
    pub async fn run_http(self, port: u16) -> anyhow::Result<()> {
        tracing::info!(port, "Starting MCP server");
        tracing::info!(tools = self.tools.len(), "Registered tools");
        tracing::info!(base_url = %self.config.base_url, "Public base URL");
        tracing::info!(
            airtable_configured = self.config.has_api_key(),
            "Airtable API key status"
        );

        Arc::clone(&self.oauth_store).start_cleanup_task();

        let router = transport::create_router(
            self.tools,
            self.ctx,
            &self.config,
            Some(Arc::clone(&self.oauth_store)),
        );
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        tracing::info!("HTTP server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        // ConnectInfo feeds the per-IP rate limit keys.
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }

    /// Get tool by name.
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<&dyn McpTool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// List all available tools.
    #[must_use]
    pub fn list_tools(&self) -> Vec<(&str, &str)> {
        self.tools.iter().map(|t| (t.name(), t.description())).collect()
    }

    /// Get tool context for execution.
    #[must_use]
    pub const fn context(&self) -> &ToolContext {
        &self.ctx
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer").field("tools", &self.tools.len()).finish()
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("Failed to install CTRL+C handler");
    tracing::info!("Received shutdown signal");
}
