//! Access and refresh token lifecycle.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::store::generate_token;
use super::types::{AccessToken, RefreshToken};

/// A token pair returned from issuance or refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub scope: String,
}

/// Introspection data for an active access token (RFC 7662).
#[derive(Debug, Clone)]
pub struct Introspection {
    pub client_id: String,
    pub scope: String,
    pub exp: i64,
    pub iat: i64,
}

/// Issued tokens, keyed by token value.
///
/// Revocation flips a flag rather than removing the entry; the periodic
/// sweep removes entries once they are past expiry plus a grace period.
#[derive(Debug)]
pub struct TokenStore {
    access: DashMap<String, AccessToken>,
    refresh: DashMap<String, RefreshToken>,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    sweep_grace_secs: i64,
}

impl TokenStore {
    #[must_use]
    pub fn new(
        access_ttl: std::time::Duration,
        refresh_ttl: std::time::Duration,
        sweep_grace: std::time::Duration,
    ) -> Self {
        Self {
            access: DashMap::new(),
            refresh: DashMap::new(),
            access_ttl_secs: i64::try_from(access_ttl.as_secs()).unwrap_or(i64::MAX),
            refresh_ttl_secs: i64::try_from(refresh_ttl.as_secs()).unwrap_or(i64::MAX),
            sweep_grace_secs: i64::try_from(sweep_grace.as_secs()).unwrap_or(0),
        }
    }

    /// Issue a fresh access + refresh token pair.
    pub fn issue_pair(&self, client_id: &str, scope: &str, now: DateTime<Utc>) -> TokenPair {
        let access_value = generate_token();
        let refresh_value = generate_token();

        self.access.insert(
            access_value.clone(),
            AccessToken {
                client_id: client_id.to_owned(),
                scope: scope.to_owned(),
                issued_at: now,
                expires_at: now + chrono::Duration::seconds(self.access_ttl_secs),
                revoked: false,
            },
        );

        self.refresh.insert(
            refresh_value.clone(),
            RefreshToken {
                client_id: client_id.to_owned(),
                scope: scope.to_owned(),
                access_token: access_value.clone(),
                issued_at: now,
                expires_at: now + chrono::Duration::seconds(self.refresh_ttl_secs),
                revoked: false,
            },
        );

        TokenPair {
            access_token: access_value,
            refresh_token: refresh_value,
            expires_in: self.access_ttl_secs.unsigned_abs(),
            scope: scope.to_owned(),
        }
    }

    /// Rotate a refresh token: revoke it and its paired access token, then
    /// issue a new pair for the same client and scope.
    ///
    /// Returns `None` for unknown, expired, or already-rotated tokens, so a
    /// replayed rotation fails.
    pub fn refresh(&self, refresh_token: &str, now: DateTime<Utc>) -> Option<TokenPair> {
        let (client_id, scope, paired_access) = {
            let mut entry = self.refresh.get_mut(refresh_token)?;

            if !entry.is_active(now) {
                return None;
            }

            entry.revoked = true;
            (entry.client_id.clone(), entry.scope.clone(), entry.access_token.clone())
        };

        if let Some(mut access) = self.access.get_mut(&paired_access) {
            access.revoked = true;
        }

        Some(self.issue_pair(&client_id, &scope, now))
    }

    /// Introspect an access token (RFC 7662).
    ///
    /// Returns `None` for anything that is not an active access token. The
    /// caller decides how much of the metadata to disclose.
    #[must_use]
    pub fn introspect(&self, token: &str, now: DateTime<Utc>) -> Option<Introspection> {
        let entry = self.access.get(token)?;

        if !entry.is_active(now) {
            return None;
        }

        Some(Introspection {
            client_id: entry.client_id.clone(),
            scope: entry.scope.clone(),
            exp: entry.expires_at.timestamp(),
            iat: entry.issued_at.timestamp(),
        })
    }

    /// Revoke a token of either kind (RFC 7009).
    ///
    /// Revoking a refresh token also revokes its paired access token.
    /// Unknown tokens are ignored. Returns `true` if anything changed.
    pub fn revoke(&self, token: &str) -> bool {
        if let Some(mut access) = self.access.get_mut(token) {
            let changed = !access.revoked;
            access.revoked = true;
            return changed;
        }

        let paired_access = {
            let Some(mut entry) = self.refresh.get_mut(token) else {
                return false;
            };

            let changed = !entry.revoked;
            entry.revoked = true;
            if !changed {
                return false;
            }
            entry.access_token.clone()
        };

        if let Some(mut access) = self.access.get_mut(&paired_access) {
            access.revoked = true;
        }
        true
    }

    /// Drop tokens past expiry plus the grace period.
    ///
    /// Revoked tokens stay resident until their natural expiry so repeated
    /// revocations and introspections keep behaving the same.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::seconds(self.sweep_grace_secs);

        let before = self.access.len() + self.refresh.len();
        self.access.retain(|_, token| cutoff < token.expires_at);
        self.refresh.retain(|_, token| cutoff < token.expires_at);
        before - (self.access.len() + self.refresh.len())
    }

    /// Number of resident access tokens.
    #[must_use]
    pub fn access_count(&self) -> usize {
        self.access.len()
    }

    /// Number of resident refresh tokens.
    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.refresh.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn store() -> TokenStore {
        TokenStore::new(
            Duration::from_secs(3600),
            Duration::from_secs(86400),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_issue_and_introspect() {
        let tokens = store();
        let now = Utc::now();
        let pair = tokens.issue_pair("client1", "mcp:read mcp:write", now);

        assert_eq!(pair.expires_in, 3600);

        let info = tokens.introspect(&pair.access_token, now).unwrap();
        assert_eq!(info.client_id, "client1");
        assert_eq!(info.scope, "mcp:read mcp:write");
        assert_eq!(info.iat, now.timestamp());
        assert_eq!(info.exp, (now + chrono::Duration::seconds(3600)).timestamp());
    }

    #[test]
    fn test_expired_token_is_inactive() {
        let tokens = store();
        let now = Utc::now();
        let pair = tokens.issue_pair("client1", "mcp:read", now);

        let later = now + chrono::Duration::seconds(3601);
        assert!(tokens.introspect(&pair.access_token, later).is_none());
    }

    #[test]
    fn test_refresh_rotates_both_tokens() {
        let tokens = store();
        let now = Utc::now();
        let pair = tokens.issue_pair("client1", "mcp:read", now);

        let rotated = tokens.refresh(&pair.refresh_token, now).unwrap();
        assert_ne!(rotated.access_token, pair.access_token);
        assert_ne!(rotated.refresh_token, pair.refresh_token);
        assert_eq!(rotated.scope, "mcp:read");

        // Old access token is revoked, new one is live.
        assert!(tokens.introspect(&pair.access_token, now).is_none());
        assert!(tokens.introspect(&rotated.access_token, now).is_some());

        // Rotation replay fails.
        assert!(tokens.refresh(&pair.refresh_token, now).is_none());
    }

    #[test]
    fn test_revoke_access_token() {
        let tokens = store();
        let now = Utc::now();
        let pair = tokens.issue_pair("client1", "mcp:read", now);

        assert!(tokens.revoke(&pair.access_token));
        assert!(tokens.introspect(&pair.access_token, now).is_none());

        // Idempotent.
        assert!(!tokens.revoke(&pair.access_token));
        // Unknown token is a no-op.
        assert!(!tokens.revoke("unknown"));
    }

    #[test]
    fn test_revoke_refresh_revokes_paired_access() {
        let tokens = store();
        let now = Utc::now();
        let pair = tokens.issue_pair("client1", "mcp:read", now);

        assert!(tokens.revoke(&pair.refresh_token));
        assert!(tokens.introspect(&pair.access_token, now).is_none());
        assert!(tokens.refresh(&pair.refresh_token, now).is_none());
    }

    #[test]
    fn test_sweep_honors_grace() {
        let tokens = store();
        let now = Utc::now();
        let pair = tokens.issue_pair("client1", "mcp:read", now);

        // Expired but within grace: still resident.
        let expired = now + chrono::Duration::seconds(3630);
        assert_eq!(tokens.sweep(expired), 0);
        assert!(tokens.introspect(&pair.access_token, expired).is_none());

        // Past expiry plus grace: access token goes, refresh token stays.
        let past_grace = now + chrono::Duration::seconds(3661);
        assert_eq!(tokens.sweep(past_grace), 1);
        assert_eq!(tokens.access_count(), 0);
        assert_eq!(tokens.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_rotation_single_winner() {
        use std::sync::Arc;

        let tokens = Arc::new(store());
        let now = Utc::now();
        let pair = tokens.issue_pair("client1", "mcp:read", now);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let tokens = Arc::clone(&tokens);
            let refresh = pair.refresh_token.clone();
            handles.push(tokio::spawn(async move { tokens.refresh(&refresh, now).is_some() }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
    }
}
