//! Airtable Remote MCP Server
//!
//! A remote Model Context Protocol (MCP) server for the Airtable API,
//! protected by a built-in OAuth 2.1 authorization server. Enables LLM
//! agents to inspect base schemas and read, create, update, and delete
//! records over the Streamable HTTP transport.
//!
//! # Features
//!
//! - **13 MCP Tools**: Base discovery, schema management, record CRUD and search
//! - **OAuth 2.1**: Dynamic client registration, PKCE (S256), refresh token rotation
//! - **Streamable HTTP**: JSON-RPC over POST with SSE streaming and event replay
//! - **Rate-limited**: Per-endpoint budgets on the OAuth surface, paced upstream calls
//!
//! # Example
//!
//! ```no_run
//! use airtable_remote_mcp::{client::AirtableClient, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let client = AirtableClient::new(&config)?;
//!
//!     // Use client for API calls
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod tools;

pub use client::AirtableClient;
pub use config::Config;
pub use error::{ClientError, ToolError};
