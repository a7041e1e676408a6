//! Dynamic client registration (RFC 7591).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use url::Url;

use super::types::RegisteredClient;

/// Client registration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// No redirect URIs were supplied.
    #[error("redirect_uris is required")]
    MissingRedirectUris,

    /// A redirect URI failed scheme or host rules.
    #[error("invalid redirect URI: {uri}")]
    InvalidRedirectUri { uri: String },
}

impl RegistrationError {
    /// RFC 7591 §3.2.2 error code for the registration response body.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::MissingRedirectUris => "invalid_client_metadata",
            Self::InvalidRedirectUri { .. } => "invalid_redirect_uri",
        }
    }
}

/// Registered OAuth clients, keyed by client ID.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<String, RegisteredClient>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { clients: DashMap::new() }
    }

    /// Register a new public client.
    ///
    /// All redirect URIs are validated before anything is stored.
    ///
    /// # Errors
    ///
    /// Returns `MissingRedirectUris` if the list is empty, or
    /// `InvalidRedirectUri` for the first URI that breaks the rules.
    pub fn register(
        &self,
        client_name: Option<String>,
        redirect_uris: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<RegisteredClient, RegistrationError> {
        if redirect_uris.is_empty() {
            return Err(RegistrationError::MissingRedirectUris);
        }

        for uri in &redirect_uris {
            if !redirect_uri_is_acceptable(uri) {
                return Err(RegistrationError::InvalidRedirectUri { uri: uri.clone() });
            }
        }

        let client = RegisteredClient {
            client_id: uuid::Uuid::new_v4().simple().to_string(),
            client_name,
            redirect_uris,
            created_at: now,
        };

        self.clients.insert(client.client_id.clone(), client.clone());

        Ok(client)
    }

    /// Look up a client by ID.
    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<RegisteredClient> {
        self.clients.get(client_id).map(|entry| entry.clone())
    }

    /// Check whether a redirect URI was registered for a client.
    #[must_use]
    pub fn redirect_uri_is_registered(&self, client_id: &str, redirect_uri: &str) -> bool {
        self.clients
            .get(client_id)
            .is_some_and(|entry| entry.redirect_uris.iter().any(|uri| uri == redirect_uri))
    }

    /// Number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Redirect URI rules for public clients:
/// `https` anywhere, `http` only on loopback hosts, and custom schemes
/// (native app callbacks like `myapp://callback`) anywhere.
fn redirect_uri_is_acceptable(uri: &str) -> bool {
    let Ok(parsed) = Url::parse(uri) else {
        return false;
    };

    match parsed.scheme() {
        "https" => true,
        "http" => match parsed.host() {
            Some(url::Host::Domain(domain)) => domain == "localhost",
            Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
            Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
            None => false,
        },
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = ClientRegistry::new();
        let client = registry
            .register(
                Some("Test App".into()),
                vec!["http://localhost:3000/callback".into()],
                Utc::now(),
            )
            .unwrap();

        assert!(!client.client_id.is_empty());

        let found = registry.get(&client.client_id).unwrap();
        assert_eq!(found.client_name.as_deref(), Some("Test App"));
        assert!(registry.redirect_uri_is_registered(
            &client.client_id,
            "http://localhost:3000/callback"
        ));
        assert!(!registry.redirect_uri_is_registered(&client.client_id, "http://localhost:9999/"));
    }

    #[test]
    fn test_empty_redirect_uris_rejected() {
        let registry = ClientRegistry::new();
        let result = registry.register(None, vec![], Utc::now());
        assert_eq!(result.unwrap_err(), RegistrationError::MissingRedirectUris);
    }

    #[test]
    fn test_redirect_uri_rules() {
        assert!(redirect_uri_is_acceptable("https://example.com/callback"));
        assert!(redirect_uri_is_acceptable("http://localhost/callback"));
        assert!(redirect_uri_is_acceptable("http://localhost:8080/callback"));
        assert!(redirect_uri_is_acceptable("http://127.0.0.1:3000/callback"));
        assert!(redirect_uri_is_acceptable("http://[::1]:3000/callback"));
        assert!(redirect_uri_is_acceptable("myapp://oauth/callback"));

        assert!(!redirect_uri_is_acceptable("http://example.com/callback"));
        assert!(!redirect_uri_is_acceptable("http://192.168.1.10/callback"));
        assert!(!redirect_uri_is_acceptable("not a url"));
    }

    #[test]
    fn test_invalid_uri_aborts_registration() {
        let registry = ClientRegistry::new();
        let result = registry.register(
            None,
            vec!["https://example.com/ok".into(), "http://example.com/bad".into()],
            Utc::now(),
        );

        let err = result.unwrap_err();
        assert_eq!(err.error_code(), "invalid_redirect_uri");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_client_ids_are_unique() {
        let registry = ClientRegistry::new();
        let a = registry
            .register(None, vec!["https://example.com/cb".into()], Utc::now())
            .unwrap();
        let b = registry
            .register(None, vec!["https://example.com/cb".into()], Utc::now())
            .unwrap();

        assert_ne!(a.client_id, b.client_id);
        assert_eq!(registry.len(), 2);
    }
}
