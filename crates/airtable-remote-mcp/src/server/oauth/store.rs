//! Combined in-memory OAuth state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::codes::CodeStore;
use super::rate_limit::{EndpointClass, RateLimiter};
use super::registry::ClientRegistry;
use super::tokens::TokenStore;
use crate::config::Config;

/// Generate a random token using two UUIDs (256 bits).
pub(crate) fn generate_token() -> String {
    format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
}

/// OAuth state store: registered clients, authorization codes, tokens, and
/// endpoint rate limits. Each piece keys its entries by their own value, so
/// contention stays per-entry rather than store-wide.
pub struct OAuthStore {
    pub clients: ClientRegistry,
    pub codes: CodeStore,
    pub tokens: TokenStore,
    limiter: RateLimiter,
    rate_limit_enabled: bool,
    cleanup_interval: Duration,
}

impl OAuthStore {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            clients: ClientRegistry::new(),
            codes: CodeStore::new(config.code_ttl),
            tokens: TokenStore::new(
                config.access_token_ttl,
                config.refresh_token_ttl,
                crate::config::oauth::SWEEP_GRACE,
            ),
            limiter: RateLimiter::new(config.rate_budgets),
            rate_limit_enabled: config.rate_limit_enabled,
            cleanup_interval: config.cleanup_interval,
        }
    }

    /// Record a request against an endpoint class budget.
    ///
    /// # Errors
    ///
    /// Returns the suggested `Retry-After` duration when the subject is over
    /// budget. Always succeeds when rate limiting is disabled.
    pub fn check_rate_limit(
        &self,
        subject: &str,
        class: EndpointClass,
        now: Instant,
    ) -> Result<(), Duration> {
        if !self.rate_limit_enabled {
            return Ok(());
        }
        self.limiter.allow(subject, class, now)
    }

    /// Sweep expired codes, tokens, and stale rate-limit windows.
    pub fn sweep_expired(&self, now: DateTime<Utc>, now_mono: Instant) {
        let codes = self.codes.sweep(now);
        let tokens = self.tokens.sweep(now);
        let windows = self.limiter.evict_stale(now_mono);

        if codes + tokens + windows > 0 {
            tracing::debug!(codes, tokens, windows, "Swept expired OAuth state");
        }
    }

    /// Start the periodic sweep task.
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.cleanup_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                self.sweep_expired(Utc::now(), Instant::now());
            }
        });
    }
}

impl std::fmt::Debug for OAuthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthStore")
            .field("clients", &self.clients.len())
            .field("access_tokens", &self.tokens.access_count())
            .field("rate_limit_enabled", &self.rate_limit_enabled)
            .finish()
    }
}
