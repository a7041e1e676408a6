//! Configuration for the Airtable remote MCP server.

use std::time::Duration;

use anyhow::Context;

/// Airtable API constants.
pub mod api {
    use std::time::Duration;

    /// Base URL for the Airtable REST API.
    pub const BASE_URL: &str = "https://api.airtable.com/v0";

    /// Request timeout.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Airtable enforces 5 requests/second per base.
    pub const RATE_LIMIT_PER_SECOND: u32 = 5;

    /// Schema cache TTL. Base/table schemas change rarely; record data is
    /// never cached.
    pub const SCHEMA_CACHE_TTL: Duration = Duration::from_secs(60);

    /// Maximum schema cache entries.
    pub const SCHEMA_CACHE_MAX_SIZE: u64 = 256;

    /// Maximum records per update/delete call, enforced by Airtable.
    pub const MAX_RECORDS_PER_WRITE: usize = 10;

    /// Maximum connections.
    pub const MAX_CONNECTIONS: usize = 20;

    /// Keepalive expiry.
    pub const KEEPALIVE_EXPIRY: Duration = Duration::from_secs(30);
}

/// OAuth lifetime constants.
pub mod oauth {
    use std::time::Duration;

    /// Authorization code lifetime.
    pub const CODE_TTL: Duration = Duration::from_secs(60);

    /// Access token lifetime.
    pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(3600);

    /// Refresh token lifetime.
    pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(86_400);

    /// Interval between background sweeps of expired entries.
    pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

    /// Grace period before swept entries are actually dropped.
    pub const SWEEP_GRACE: Duration = Duration::from_secs(60);

    /// Scopes this server understands.
    pub const SCOPES_SUPPORTED: &[&str] = &["mcp:read", "mcp:write", "mcp:admin"];

    /// Scope granted when an authorize request names none.
    pub const DEFAULT_SCOPE: &str = "mcp:read mcp:write";
}

/// MCP protocol constants.
pub mod protocol {
    use std::time::Duration;

    /// Protocol revision this server speaks.
    pub const VERSION: &str = "2025-03-26";

    /// Server name announced during initialization.
    pub const SERVER_NAME: &str = "airtable-remote-mcp";

    /// Sessions idle longer than this are expired by the sweep.
    pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(3600);

    /// Interval between session sweeps.
    pub const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

    /// Buffered events kept per session for Last-Event-ID replay.
    pub const EVENT_HISTORY_SIZE: usize = 100;
}

/// Request budget for one OAuth endpoint class.
#[derive(Debug, Clone, Copy)]
pub struct RateBudget {
    /// Requests allowed inside one window.
    pub max_requests: u32,

    /// Window duration.
    pub window: Duration,
}

impl RateBudget {
    /// Create a budget.
    #[must_use]
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self { max_requests, window: Duration::from_secs(window_secs) }
    }
}

/// Per-endpoint-class rate budgets for the OAuth surface.
#[derive(Debug, Clone, Copy)]
pub struct RateBudgets {
    /// Dynamic client registration, keyed by caller IP.
    pub register: RateBudget,

    /// Authorize endpoint, keyed by client id.
    pub authorize: RateBudget,

    /// Token endpoint, keyed by client id.
    pub token: RateBudget,

    /// Introspection and revocation, keyed by caller IP.
    pub introspect: RateBudget,
}

impl Default for RateBudgets {
    fn default() -> Self {
        Self {
            register: RateBudget::new(5, 300),
            authorize: RateBudget::new(10, 300),
            token: RateBudget::new(20, 300),
            introspect: RateBudget::new(30, 300),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Airtable personal access token. Tool calls fail upstream without it.
    pub api_key: Option<String>,

    /// Public base URL of this server, used in metadata documents and
    /// endpoint announcements.
    pub base_url: String,

    /// Airtable API base URL (overridable for mock servers).
    pub airtable_api_url: String,

    /// Upstream request timeout.
    pub request_timeout: Duration,

    /// Upstream connection timeout.
    pub connect_timeout: Duration,

    /// Upstream requests per second.
    pub upstream_rps: u32,

    /// Schema cache TTL. Zero disables caching.
    pub cache_ttl: Duration,

    /// Maximum schema cache entries.
    pub cache_max_size: u64,

    /// Authorization code lifetime.
    pub code_ttl: Duration,

    /// Access token lifetime.
    pub access_token_ttl: Duration,

    /// Refresh token lifetime.
    pub refresh_token_ttl: Duration,

    /// Interval between OAuth store sweeps.
    pub cleanup_interval: Duration,

    /// Idle time before a session is expired.
    pub session_idle_timeout: Duration,

    /// Whether OAuth endpoints enforce rate limits.
    pub rate_limit_enabled: bool,

    /// Per-endpoint-class budgets.
    pub rate_budgets: RateBudgets,
}

impl Config {
    /// Create a configuration with the given API key and public base URL.
    #[must_use]
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| "http://localhost:8000".to_string()),
            airtable_api_url: api::BASE_URL.to_string(),
            request_timeout: api::REQUEST_TIMEOUT,
            connect_timeout: api::CONNECT_TIMEOUT,
            upstream_rps: api::RATE_LIMIT_PER_SECOND,
            cache_ttl: api::SCHEMA_CACHE_TTL,
            cache_max_size: api::SCHEMA_CACHE_MAX_SIZE,
            code_ttl: oauth::CODE_TTL,
            access_token_ttl: oauth::ACCESS_TOKEN_TTL,
            refresh_token_ttl: oauth::REFRESH_TOKEN_TTL,
            cleanup_interval: oauth::CLEANUP_INTERVAL,
            session_idle_timeout: protocol::SESSION_IDLE_TIMEOUT,
            rate_limit_enabled: true,
            rate_budgets: RateBudgets::default(),
        }
    }

    /// Create a test configuration pointing the Airtable client at a mock
    /// server.
    #[must_use]
    pub fn for_testing(airtable_url: &str) -> Self {
        Self {
            api_key: Some("pat-test".to_string()),
            base_url: "http://localhost:8000".to_string(),
            airtable_api_url: airtable_url.to_string(),
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            upstream_rps: 100, // No pacing in tests
            cache_ttl: Duration::from_secs(0), // No caching in tests
            cache_max_size: 0,
            code_ttl: oauth::CODE_TTL,
            access_token_ttl: oauth::ACCESS_TOKEN_TTL,
            refresh_token_ttl: oauth::REFRESH_TOKEN_TTL,
            cleanup_interval: oauth::CLEANUP_INTERVAL,
            session_idle_timeout: protocol::SESSION_IDLE_TIMEOUT,
            rate_limit_enabled: true,
            rate_budgets: RateBudgets::default(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if a variable fails to parse or a lifetime falls
    /// outside its accepted range.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("AIRTABLE_API_KEY").ok();
        let base_url = std::env::var("BASE_URL").ok();
        let mut config = Self::new(api_key, base_url);

        if let Ok(url) = std::env::var("AIRTABLE_BASE_URL") {
            config.airtable_api_url = url;
        }
        if let Some(secs) = env_u64("AIRTABLE_TIMEOUT")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("OAUTH_CODE_EXPIRY")? {
            anyhow::ensure!(
                (30..=600).contains(&secs),
                "OAUTH_CODE_EXPIRY must be between 30 and 600 seconds, got {secs}"
            );
            config.code_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("OAUTH_TOKEN_EXPIRY")? {
            anyhow::ensure!(
                secs >= 300,
                "OAUTH_TOKEN_EXPIRY must be at least 300 seconds, got {secs}"
            );
            config.access_token_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("OAUTH_REFRESH_TOKEN_EXPIRY")? {
            config.refresh_token_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("CLEANUP_INTERVAL")? {
            config.cleanup_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("SESSION_IDLE_TIMEOUT")? {
            config.session_idle_timeout = Duration::from_secs(secs);
        }
        if let Ok(enabled) = std::env::var("RATE_LIMIT_ENABLED") {
            config.rate_limit_enabled = !matches!(
                enabled.to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            );
        }

        Ok(config)
    }

    /// Check if an Airtable API key is configured.
    #[must_use]
    pub const fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(None, None)
    }
}

fn env_u64(name: &str) -> anyhow::Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => {
            let value =
                raw.parse::<u64>().with_context(|| format!("{name} must be an integer"))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}
