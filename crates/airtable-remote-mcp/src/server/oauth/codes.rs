//! Authorization code issuance and one-time redemption.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::store::generate_token;
use super::types::AuthCode;

/// Authorization codes, keyed by code value.
///
/// Redemption marks the code consumed under the entry's own lock, so
/// concurrent redemptions of the same code succeed exactly once.
#[derive(Debug)]
pub struct CodeStore {
    codes: DashMap<String, AuthCode>,
    ttl_secs: i64,
}

impl CodeStore {
    #[must_use]
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            codes: DashMap::new(),
            ttl_secs: i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// Issue a fresh authorization code.
    pub fn issue(
        &self,
        client_id: String,
        redirect_uri: String,
        code_challenge: String,
        scope: String,
        now: DateTime<Utc>,
    ) -> String {
        let code = generate_token();

        self.codes.insert(
            code.clone(),
            AuthCode {
                client_id,
                redirect_uri,
                code_challenge,
                scope,
                issued_at: now,
                expires_at: now + chrono::Duration::seconds(self.ttl_secs),
                consumed: false,
            },
        );

        code
    }

    /// Redeem a code, consuming it.
    ///
    /// Returns `None` for unknown, expired, or already-consumed codes.
    pub fn redeem(&self, code: &str, now: DateTime<Utc>) -> Option<AuthCode> {
        let mut entry = self.codes.get_mut(code)?;

        if entry.consumed || entry.is_expired(now) {
            return None;
        }

        entry.consumed = true;
        Some(entry.clone())
    }

    /// Drop codes past expiry or already consumed.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.codes.len();
        self.codes.retain(|_, code| !code.consumed && !code.is_expired(now));
        before - self.codes.len()
    }

    /// Number of stored codes, consumed ones included until swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn issue_one(store: &CodeStore, now: DateTime<Utc>) -> String {
        store.issue(
            "client1".into(),
            "http://localhost/callback".into(),
            "challenge".into(),
            "mcp:read".into(),
            now,
        )
    }

    #[test]
    fn test_redeem_once() {
        let store = CodeStore::new(Duration::from_secs(60));
        let now = Utc::now();
        let code = issue_one(&store, now);

        let redeemed = store.redeem(&code, now).unwrap();
        assert_eq!(redeemed.client_id, "client1");
        assert_eq!(redeemed.scope, "mcp:read");

        // Second redemption fails.
        assert!(store.redeem(&code, now).is_none());
    }

    #[test]
    fn test_expired_code_rejected() {
        let store = CodeStore::new(Duration::from_secs(60));
        let now = Utc::now();
        let code = issue_one(&store, now);

        let later = now + chrono::Duration::seconds(61);
        assert!(store.redeem(&code, later).is_none());
    }

    #[test]
    fn test_unknown_code_rejected() {
        let store = CodeStore::new(Duration::from_secs(60));
        assert!(store.redeem("nope", Utc::now()).is_none());
    }

    #[test]
    fn test_sweep_drops_consumed_and_expired() {
        let store = CodeStore::new(Duration::from_secs(60));
        let now = Utc::now();

        let consumed = issue_one(&store, now);
        store.redeem(&consumed, now);
        issue_one(&store, now);

        // Consumed code goes, live code stays.
        assert_eq!(store.sweep(now), 1);
        assert_eq!(store.len(), 1);

        // Everything is expired later on.
        let later = now + chrono::Duration::seconds(120);
        assert_eq!(store.sweep(later), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_redemption_single_winner() {
        use std::sync::Arc;

        let store = Arc::new(CodeStore::new(Duration::from_secs(60)));
        let now = Utc::now();
        let code = issue_one(&store, now);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            let code = code.clone();
            handles.push(tokio::spawn(async move { store.redeem(&code, now).is_some() }));
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
