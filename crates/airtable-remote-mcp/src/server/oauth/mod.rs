//! OAuth 2.1 authorization server for MCP authentication.
//!
//! Implements a self-contained authorization server embedded in the binary,
//! supporting the MCP OAuth flow used by remote connectors.
//!
//! ## Supported Standards
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE (S256 only)
//! - RFC 7662: Token Introspection
//! - RFC 7009: Token Revocation
//! - RFC 6749: Authorization Code and Refresh Token Grants

pub mod codes;
pub mod handlers;
pub mod pkce;
pub mod rate_limit;
pub mod registry;
pub mod store;
pub mod tokens;
mod types;

pub use store::OAuthStore;
pub use types::{AccessToken, AuthCode, RefreshToken, RegisteredClient};
