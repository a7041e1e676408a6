//! Airtable Remote MCP Server - Entry Point
//!
//! OAuth 2.1 protected Streamable HTTP transport for the Airtable API.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use airtable_remote_mcp::{config::Config, server::McpServer, AirtableClient};

#[derive(Parser, Debug)]
#[command(name = "airtable-remote-mcp")]
#[command(about = "Remote MCP server for the Airtable API")]
#[command(version)]
struct Cli {
    /// Airtable personal access token (tool calls fail upstream without it)
    #[arg(long, env = "AIRTABLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// HTTP server port
    #[arg(long, default_value = "8000", env = "PORT")]
    port: u16,

    /// Public base URL announced in OAuth metadata (e.g., https://mcp.example.com)
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before clap resolves env-backed arguments.
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cli.port,
        "Starting Airtable remote MCP server"
    );

    let mut config = Config::from_env()?;
    if cli.api_key.is_some() {
        config.api_key = cli.api_key;
    }
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    let client = AirtableClient::new(&config)?;
    let server = McpServer::new(client, config);

    server.run_http(cli.port).await?;

    Ok(())
}
