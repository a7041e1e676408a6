//! OAuth 2.1 endpoint handlers.
//!
//! Implements:
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE (S256)
//! - RFC 7662: Token Introspection
//! - RFC 7009: Token Revocation
//! - RFC 6749: Authorization Code and Refresh Token Grants
//!
//! Every endpoint checks its rate budget before doing anything else.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts, Query, State},
    http::{HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use url::Url;

use super::pkce;
use super::rate_limit::EndpointClass;
use super::store::OAuthStore;
use super::tokens::TokenPair;
use crate::config::oauth::{DEFAULT_SCOPE, SCOPES_SUPPORTED};
use crate::server::transport::HttpState;

// ─── Caller identity ─────────────────────────────────────────────────────────

/// Rate-limit subject for callers not identified by a client id: the first
/// `X-Forwarded-For` hop if present, else the socket peer address.
#[derive(Debug, Clone)]
pub struct PeerId(pub String);

impl<S> FromRequestParts<S> for PeerId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(|hop| hop.trim().to_string())
            .filter(|hop| !hop.is_empty());

        let peer = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|info| info.0.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self(peer))
    }
}

// ─── RFC 9728: Protected Resource Metadata ───────────────────────────────────

/// `GET /.well-known/oauth-protected-resource`
///
/// Tells clients where to find the authorization server for this resource.
pub async fn handle_protected_resource(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "resource": state.base_url,
        "authorization_servers": [state.base_url],
        "scopes_supported": SCOPES_SUPPORTED,
        "bearer_methods_supported": ["header"],
        "resource_documentation": "https://docs.airtable.com/api/introduction",
        "revocation_endpoint": format!("{}/oauth/revoke", state.base_url),
        "revocation_endpoint_auth_methods_supported": ["none"],
        "introspection_endpoint": format!("{}/oauth/introspect", state.base_url),
        "introspection_endpoint_auth_methods_supported": ["none"]
    }))
}

// ─── RFC 8414: Authorization Server Metadata ─────────────────────────────────

/// `GET /.well-known/oauth-authorization-server`
///
/// Describes the OAuth endpoints and capabilities.
pub async fn handle_auth_server_metadata(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "issuer": state.base_url,
        "authorization_endpoint": format!("{}/oauth/authorize", state.base_url),
        "token_endpoint": format!("{}/oauth/token", state.base_url),
        "registration_endpoint": format!("{}/oauth/register", state.base_url),
        "revocation_endpoint": format!("{}/oauth/revoke", state.base_url),
        "introspection_endpoint": format!("{}/oauth/introspect", state.base_url),
        "scopes_supported": SCOPES_SUPPORTED,
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "code_challenge_methods_supported": ["S256"],
        "token_endpoint_auth_methods_supported": ["none"],
        "subject_types_supported": ["public"],
        "registration_endpoint_auth_methods_supported": ["none"],
        "ui_locales_supported": ["en-US"],
        "service_documentation": "https://docs.airtable.com/api/introduction",
        "op_policy_uri": format!("{}/privacy", state.base_url),
        "op_tos_uri": format!("{}/terms", state.base_url)
    }))
}

// ─── RFC 7591: Dynamic Client Registration ───────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub client_name: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
    #[serde(default)]
    pub grant_types: Vec<String>,
    #[serde(default)]
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: Option<String>,
}

/// `POST /oauth/register`
///
/// Register a new public OAuth client.
pub async fn handle_register(
    State(state): State<Arc<HttpState>>,
    peer: PeerId,
    Json(req): Json<RegisterRequest>,
) -> Response {
    let Some(ref oauth_store) = state.oauth_store else {
        return (StatusCode::NOT_FOUND, "OAuth not configured").into_response();
    };

    if let Err(retry_after) =
        oauth_store.check_rate_limit(&peer.0, EndpointClass::Register, Instant::now())
    {
        return rate_limited(retry_after);
    }

    let Some(client_name) = req.client_name.filter(|name| !name.is_empty()) else {
        return registration_error("invalid_client_metadata", "client_name is required");
    };

    let now = Utc::now();
    let client = match oauth_store.clients.register(
        Some(client_name),
        req.redirect_uris.unwrap_or_default(),
        now,
    ) {
        Ok(client) => client,
        Err(err) => return registration_error(err.error_code(), &err.to_string()),
    };

    tracing::info!(client_id = %client.client_id, peer = %peer.0, "Registered OAuth client");

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "client_id": client.client_id,
            "client_id_issued_at": client.created_at.timestamp(),
            "client_name": client.client_name,
            "redirect_uris": client.redirect_uris,
            "grant_types": ["authorization_code", "refresh_token"],
            "response_types": ["code"],
            "scope": DEFAULT_SCOPE,
            "token_endpoint_auth_method": "none"
        })),
    )
        .into_response()
}

fn registration_error(error: &str, description: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": error,
            "error_description": description
        })),
    )
        .into_response()
}

// ─── Authorization Endpoint ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub state: Option<String>,
    pub scope: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// `GET /oauth/authorize`
///
/// Auto-approve the authorization request. The Airtable token is configured
/// server-side and there is a single logical user, so no consent page is
/// shown: any registered client presenting valid PKCE parameters gets a code.
///
/// Client identity problems (unknown client, unregistered redirect URI) are
/// reported as a 400 without redirecting; once the redirect URI is known to
/// be registered, remaining problems are reported to it per RFC 6749 §4.1.2.1.
pub async fn handle_authorize(
    State(state): State<Arc<HttpState>>,
    peer: PeerId,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    let Some(ref oauth_store) = state.oauth_store else {
        return (StatusCode::NOT_FOUND, "OAuth not configured").into_response();
    };

    let subject = query.client_id.clone().unwrap_or(peer.0);
    if let Err(retry_after) =
        oauth_store.check_rate_limit(&subject, EndpointClass::Authorize, Instant::now())
    {
        return rate_limited(retry_after);
    }

    // Identity errors: no redirect target can be trusted yet.
    let Some(client_id) = query.client_id.as_deref() else {
        return authorize_request_error("invalid_request", "client_id is required");
    };
    let Some(redirect_uri) = query.redirect_uri.as_deref() else {
        return authorize_request_error("invalid_request", "redirect_uri is required");
    };
    if oauth_store.clients.get(client_id).is_none() {
        return authorize_request_error("invalid_client", "Unknown client_id");
    }
    if !oauth_store.clients.redirect_uri_is_registered(client_id, redirect_uri) {
        return authorize_request_error(
            "invalid_request",
            "redirect_uri not registered for this client",
        );
    }

    // From here on, errors go back to the registered redirect URI.
    if query.response_type.as_deref() != Some("code") {
        return authorize_redirect_error(
            redirect_uri,
            "unsupported_response_type",
            "response_type must be 'code'",
            query.state.as_deref(),
        );
    }

    let method = query.code_challenge_method.as_deref().unwrap_or("S256");
    if pkce::validate_challenge_method(method).is_err() {
        return authorize_redirect_error(
            redirect_uri,
            "invalid_request",
            "code_challenge_method must be S256",
            query.state.as_deref(),
        );
    }

    let Some(code_challenge) = query.code_challenge.as_deref().filter(|c| !c.is_empty()) else {
        return authorize_redirect_error(
            redirect_uri,
            "invalid_request",
            "code_challenge is required",
            query.state.as_deref(),
        );
    };

    let scope = query.scope.as_deref().filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SCOPE);

    let code = oauth_store.codes.issue(
        client_id.to_owned(),
        redirect_uri.to_owned(),
        code_challenge.to_owned(),
        scope.to_owned(),
        Utc::now(),
    );

    tracing::info!(client_id = %client_id, scope = %scope, "Auto-approved authorization");

    let Ok(mut location) = Url::parse(redirect_uri) else {
        return authorize_request_error("invalid_request", "redirect_uri is not a valid URL");
    };
    {
        let mut pairs = location.query_pairs_mut();
        pairs.append_pair("code", &code);
        if let Some(ref oauth_state) = query.state {
            pairs.append_pair("state", oauth_state);
        }
    }

    redirect_to(location.as_str())
}

/// 400 response for errors found before the redirect URI is validated.
fn authorize_request_error(error: &str, description: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": error,
            "error_description": description
        })),
    )
        .into_response()
}

/// RFC 6749 §4.1.2.1 error delivery via the validated redirect URI.
fn authorize_redirect_error(
    redirect_uri: &str,
    error: &str,
    description: &str,
    state: Option<&str>,
) -> Response {
    let Ok(mut location) = Url::parse(redirect_uri) else {
        return authorize_request_error("invalid_request", "redirect_uri is not a valid URL");
    };
    {
        let mut pairs = location.query_pairs_mut();
        pairs.append_pair("error", error);
        pairs.append_pair("error_description", description);
        if let Some(state) = state {
            pairs.append_pair("state", state);
        }
    }

    redirect_to(location.as_str())
}

fn redirect_to(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => {
            authorize_request_error("invalid_request", "redirect target is not a valid header")
        }
    }
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub client_id: Option<String>,
    pub refresh_token: Option<String>,
}

/// `POST /oauth/token`
///
/// Exchange an authorization code for tokens, or rotate a refresh token.
pub async fn handle_token(
    State(state): State<Arc<HttpState>>,
    peer: PeerId,
    axum::Form(form): axum::Form<TokenRequest>,
) -> Response {
    let Some(ref oauth_store) = state.oauth_store else {
        return (StatusCode::NOT_FOUND, "OAuth not configured").into_response();
    };

    let subject = form.client_id.clone().unwrap_or(peer.0);
    if let Err(retry_after) =
        oauth_store.check_rate_limit(&subject, EndpointClass::Token, Instant::now())
    {
        return rate_limited(retry_after);
    }

    match form.grant_type.as_str() {
        "authorization_code" => authorization_code_grant(oauth_store, &form),
        "refresh_token" => refresh_token_grant(oauth_store, &form),
        _ => token_error("unsupported_grant_type", "Supported: authorization_code, refresh_token"),
    }
}

fn authorization_code_grant(store: &OAuthStore, form: &TokenRequest) -> Response {
    let Some(ref code) = form.code else {
        return token_error("invalid_request", "code is required");
    };
    let Some(ref client_id) = form.client_id else {
        return token_error("invalid_request", "client_id is required");
    };
    let Some(ref redirect_uri) = form.redirect_uri else {
        return token_error("invalid_request", "redirect_uri is required");
    };
    let Some(ref code_verifier) = form.code_verifier else {
        return token_error("invalid_request", "code_verifier is required");
    };

    let now = Utc::now();

    // One-time redemption. Anything stale, consumed, or unknown looks the same.
    let Some(auth_code) = store.codes.redeem(code, now) else {
        return token_error("invalid_grant", "Invalid or expired authorization code");
    };

    if auth_code.client_id != *client_id || auth_code.redirect_uri != *redirect_uri {
        return token_error("invalid_grant", "client_id or redirect_uri mismatch");
    }

    if let Err(err) = pkce::verify_s256(code_verifier, &auth_code.code_challenge) {
        return token_error("invalid_grant", &err.to_string());
    }

    let pair = store.tokens.issue_pair(&auth_code.client_id, &auth_code.scope, now);

    tracing::info!(client_id = %auth_code.client_id, "Issued token pair");

    token_success(&pair)
}

fn refresh_token_grant(store: &OAuthStore, form: &TokenRequest) -> Response {
    let Some(ref refresh_token) = form.refresh_token else {
        return token_error("invalid_request", "refresh_token is required");
    };

    let Some(pair) = store.tokens.refresh(refresh_token, Utc::now()) else {
        return token_error("invalid_grant", "Invalid or expired refresh token");
    };

    tracing::info!("Rotated refresh token");

    token_success(&pair)
}

/// Build a token response with required OAuth 2.0 cache headers (RFC 6749 §5.1).
fn token_success(pair: &TokenPair) -> Response {
    let mut response = Json(serde_json::json!({
        "access_token": pair.access_token,
        "token_type": "Bearer",
        "expires_in": pair.expires_in,
        "refresh_token": pair.refresh_token,
        "scope": pair.scope
    }))
    .into_response();

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

fn token_error(error: &str, description: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": error,
            "error_description": description
        })),
    )
        .into_response()
}

// ─── RFC 7662: Token Introspection ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IntrospectRequest {
    pub token: Option<String>,
    pub client_id: Option<String>,
}

/// `POST /oauth/introspect`
///
/// Report token metadata to the client that owns the token. Unknown tokens,
/// inactive tokens, and tokens owned by someone else all produce the same
/// `{"active": false}` body, so the endpoint cannot be used as an oracle.
pub async fn handle_introspect(
    State(state): State<Arc<HttpState>>,
    peer: PeerId,
    axum::Form(form): axum::Form<IntrospectRequest>,
) -> Response {
    let Some(ref oauth_store) = state.oauth_store else {
        return (StatusCode::NOT_FOUND, "OAuth not configured").into_response();
    };

    if let Err(retry_after) =
        oauth_store.check_rate_limit(&peer.0, EndpointClass::Introspect, Instant::now())
    {
        return rate_limited(retry_after);
    }

    let Some(ref token) = form.token else {
        return token_error("invalid_request", "token is required");
    };

    let info = oauth_store.tokens.introspect(token, Utc::now());

    match (info, form.client_id.as_deref()) {
        (Some(info), Some(client_id)) if info.client_id == client_id => {
            Json(serde_json::json!({
                "active": true,
                "client_id": info.client_id,
                "scope": info.scope,
                "token_type": "Bearer",
                "exp": info.exp,
                "iat": info.iat
            }))
            .into_response()
        }
        _ => Json(serde_json::json!({ "active": false })).into_response(),
    }
}

// ─── RFC 7009: Token Revocation ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub token: Option<String>,
}

/// `POST /oauth/revoke`
///
/// Revoke an access or refresh token. Succeeds no matter what the token was,
/// so repeated or speculative revocations are safe.
pub async fn handle_revoke(
    State(state): State<Arc<HttpState>>,
    peer: PeerId,
    axum::Form(form): axum::Form<RevokeRequest>,
) -> Response {
    let Some(ref oauth_store) = state.oauth_store else {
        return (StatusCode::NOT_FOUND, "OAuth not configured").into_response();
    };

    if let Err(retry_after) =
        oauth_store.check_rate_limit(&peer.0, EndpointClass::Introspect, Instant::now())
    {
        return rate_limited(retry_after);
    }

    let Some(ref token) = form.token else {
        return token_error("invalid_request", "token is required");
    };

    if oauth_store.tokens.revoke(token) {
        tracing::info!("Revoked token");
    }

    Json(serde_json::json!({ "revoked": true })).into_response()
}

// ─── Shared responses ────────────────────────────────────────────────────────

/// 429 with a `Retry-After` header.
fn rate_limited(retry_after: Duration) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "error": "rate_limit_exceeded",
            "error_description": "Rate limit exceeded"
        })),
    )
        .into_response();

    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after.as_secs().max(1)));
    response
}
