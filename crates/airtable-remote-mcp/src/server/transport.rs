//! MCP Streamable HTTP transport.
//!
//! A single `/mcp` endpoint carries the whole protocol:
//! - `POST` submits JSON-RPC messages (single or batched)
//! - `GET` opens the server-to-client SSE stream with Last-Event-ID replay
//! - `DELETE` closes the session
//!
//! Every `/mcp` request is authenticated against the embedded OAuth server
//! when one is configured. Sessions gate all tool methods: a client must
//! complete the `initialize` / `notifications/initialized` handshake before
//! anything else is dispatched.

use std::borrow::Cow;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::oauth::{OAuthStore, handlers as oauth_handlers};
use super::session::{Session, SessionError, SessionManager};
use crate::config::{Config, protocol};
use crate::tools::{McpTool, ToolContext};

// ─── JSON-RPC envelope ───────────────────────────────────────────────────────

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Notifications carry no id and receive no response.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Always serialized; null when the originating id could not be read.
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcResponse {
    const VERSION: &'static str = "2.0";

    #[must_use]
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: Some(result),
            error: None,
            id,
        }
    }

    #[must_use]
    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data: None }),
            id,
        }
    }

    #[must_use]
    pub fn error_with_data(
        id: Option<serde_json::Value>,
        code: i32,
        message: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: Some(serde_json::Value::String(data.into())),
            }),
            id,
        }
    }

    fn from_session_error(id: Option<serde_json::Value>, err: SessionError) -> Self {
        Self::error(id, err.jsonrpc_code(), err.to_string())
    }
}

/// Tool descriptor for `tools/list`.
#[derive(Debug, Serialize)]
pub struct McpToolInfo {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

// ─── Shared state and router ─────────────────────────────────────────────────

/// Shared state for HTTP handlers.
pub struct HttpState {
    pub tools: Vec<Box<dyn McpTool>>,
    pub ctx: ToolContext,
    pub sessions: Arc<SessionManager>,
    /// Authorization server; `None` disables bearer auth entirely.
    pub oauth_store: Option<Arc<OAuthStore>>,
    /// Public base URL for metadata documents and endpoint announcements.
    pub base_url: String,
    /// Whether an Airtable API key is configured.
    pub airtable_configured: bool,
}

/// Create the HTTP router.
pub fn create_router(
    tools: Vec<Box<dyn McpTool>>,
    ctx: ToolContext,
    config: &Config,
    oauth_store: Option<Arc<OAuthStore>>,
) -> Router {
    let sessions = Arc::new(SessionManager::new(config.session_idle_timeout));
    Arc::clone(&sessions).start_cleanup_task();

    let state = Arc::new(HttpState {
        tools,
        ctx,
        sessions,
        oauth_store,
        base_url: config.base_url.clone(),
        airtable_configured: config.has_api_key(),
    });

    Router::new()
        .route("/", get(root_info))
        .route("/setup", get(setup_info))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // OAuth 2.1 authorization server
        .route(
            "/.well-known/oauth-authorization-server",
            get(oauth_handlers::handle_auth_server_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(oauth_handlers::handle_protected_resource),
        )
        .route("/oauth/register", post(oauth_handlers::handle_register))
        .route("/oauth/authorize", get(oauth_handlers::handle_authorize))
        .route("/oauth/token", post(oauth_handlers::handle_token))
        .route("/oauth/introspect", post(oauth_handlers::handle_introspect))
        .route("/oauth/revoke", post(oauth_handlers::handle_revoke))
        // Streamable HTTP transport, one endpoint
        .route(
            "/mcp",
            post(handle_mcp_post).get(handle_mcp_get).delete(handle_mcp_delete),
        )
        // Deprecated SSE transport kept for old clients
        .route("/sse", get(handle_sse_deprecated))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Info endpoints ──────────────────────────────────────────────────────────

async fn root_info(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let base = &state.base_url;
    Json(serde_json::json!({
        "name": "airtable-remote-mcp-server",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Remote MCP server for Airtable with OAuth 2.1 and Streamable HTTP",
        "protocol_version": "2025-03-26",
        "transport": "Streamable HTTP (with SSE fallback)",
        "authentication": "OAuth 2.1 with Dynamic Client Registration",
        "endpoints": {
            "mcp": format!("{base}/mcp"),
            "oauth_metadata": format!("{base}/.well-known/oauth-authorization-server"),
            "protected_resource_metadata": format!("{base}/.well-known/oauth-protected-resource"),
            "registration": format!("{base}/oauth/register"),
            "authorization": format!("{base}/oauth/authorize"),
            "token": format!("{base}/oauth/token")
        },
        "setup_instructions": {
            "claude_web": {
                "step1": "Go to Settings -> Connectors in Claude",
                "step2": format!("Add custom connector with URL: {base}"),
                "step3": "Leave OAuth Client ID empty (Dynamic Client Registration is used)",
                "step4": "Claude will automatically register and authenticate"
            },
            "test_with_curl": format!(
                "curl -X POST {base}/oauth/register -H 'Content-Type: application/json' \
                 -d '{{\"client_name\": \"Test Client\", \"redirect_uris\": [\"https://example.com/callback\"]}}'"
            )
        }
    }))
}

async fn setup_info(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let base = &state.base_url;
    Json(serde_json::json!({
        "service": "Airtable Remote MCP Server",
        "version": env!("CARGO_PKG_VERSION"),
        "protocol_version": "2025-03-26",
        "for_claude": {
            "connector_url": base,
            "transport": "Streamable HTTP",
            "authentication": "OAuth 2.1 with Dynamic Client Registration",
            "oauth_client_id_field": "Leave empty - Dynamic Client Registration handles this automatically"
        },
        "endpoints": {
            "main_mcp": format!("{base}/mcp"),
            "oauth_metadata": format!("{base}/.well-known/oauth-authorization-server"),
            "resource_metadata": format!("{base}/.well-known/oauth-protected-resource"),
            "health": format!("{base}/health")
        },
        "tools_available": [
            "list_bases - List all accessible Airtable bases",
            "list_tables - List tables in a specific base",
            "describe_table - Get detailed table information",
            "list_records - List records from a table with filtering",
            "search_records - Search for records containing specific text",
            "get_record - Get a specific record by ID",
            "create_record - Create new records",
            "update_records - Update existing records",
            "delete_records - Delete records",
            "create_table - Create new tables",
            "update_table - Update table metadata",
            "create_field - Add new fields to tables",
            "update_field - Update field metadata"
        ]
    }))
}

async fn health_check(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "airtable-remote-mcp-server",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "components": {
            "airtable": if state.airtable_configured { "configured" } else { "not_configured" },
            "auth": if state.oauth_store.is_some() { "ready" } else { "disabled" },
            "mcp_transport": "ready"
        }
    }))
}

async fn readiness_check(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let session_count = state.sessions.session_count().await;
    Json(serde_json::json!({
        "status": "ready",
        "service": "airtable-remote-mcp-server",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": session_count,
        "tools": state.tools.len()
    }))
}

// ─── Bearer authentication ───────────────────────────────────────────────────

/// Token claims attached to an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub client_id: String,
    pub scope: String,
}

fn can_read(scope: &str) -> bool {
    scope.split_whitespace().any(|s| matches!(s, "mcp:read" | "mcp:admin"))
}

fn can_write(scope: &str) -> bool {
    scope.split_whitespace().any(|s| matches!(s, "mcp:write" | "mcp:admin"))
}

/// Validate the bearer token on an `/mcp` request.
///
/// Returns `Ok(None)` when no OAuth server is configured (auth disabled).
fn authenticate(state: &HttpState, headers: &HeaderMap) -> Result<Option<AuthContext>, Response> {
    let Some(ref oauth_store) = state.oauth_store else {
        return Ok(None);
    };

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let Some(token) = token else {
        return Err(missing_token_response(&state.base_url));
    };

    match oauth_store.tokens.introspect(token, Utc::now()) {
        Some(info) => Ok(Some(AuthContext { client_id: info.client_id, scope: info.scope })),
        None => Err(invalid_token_response()),
    }
}

fn missing_token_response(base_url: &str) -> Response {
    let challenge = format!(
        "Bearer realm=\"airtable-mcp\", \
         resource_metadata=\"{base_url}/.well-known/oauth-protected-resource\""
    );
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "unauthorized",
            "message": "Authentication required"
        })),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

fn invalid_token_response() -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "invalid_token",
            "message": "Invalid or expired token"
        })),
    )
        .into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Bearer realm=\"airtable-mcp\", error=\"invalid_token\""),
    );
    response
}

// ─── POST /mcp ───────────────────────────────────────────────────────────────

/// Result of handling one JSON-RPC message.
struct Outcome {
    /// `None` for notifications.
    response: Option<JsonRpcResponse>,
    /// Session id minted by `initialize`, echoed in the `Mcp-Session-Id` header.
    new_session_id: Option<String>,
}

impl Outcome {
    fn respond(response: JsonRpcResponse) -> Self {
        Self { response: Some(response), new_session_id: None }
    }

    const fn silent() -> Self {
        Self { response: None, new_session_id: None }
    }
}

async fn handle_mcp_post(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let auth = match authenticate(&state, &headers) {
        Ok(auth) => auth,
        Err(response) => return response,
    };

    let content_type =
        headers.get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok()).unwrap_or("");
    if !content_type.starts_with("application/json") {
        return plain_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Content-Type must be application/json",
        );
    }
    if body.is_empty() {
        return plain_error(StatusCode::BAD_REQUEST, "invalid_request", "Request body is required");
    }

    if let Some(version) = headers.get("mcp-protocol-version").and_then(|v| v.to_str().ok()) {
        if version != protocol::VERSION {
            tracing::warn!(requested = %version, "Unsupported protocol version");
        }
    }

    let message: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(err) => {
            let response = JsonRpcResponse::error(None, -32700, format!("Parse error: {err}"));
            return Json(response).into_response();
        }
    };

    let session_header = headers
        .get("mcp-session-id")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);

    match message {
        serde_json::Value::Array(batch) => {
            handle_batch(&state, auth.as_ref(), session_header.as_deref(), batch).await
        }
        single => {
            let outcome =
                handle_message(&state, auth.as_ref(), session_header.as_deref(), single).await;
            let response = match outcome.response {
                Some(response) => Json(response).into_response(),
                None => StatusCode::ACCEPTED.into_response(),
            };
            attach_session_header(response, outcome.new_session_id.as_deref())
        }
    }
}

/// Execute a batch concurrently. Responses carry the originating ids;
/// notifications produce no entries.
async fn handle_batch(
    state: &Arc<HttpState>,
    auth: Option<&AuthContext>,
    session_header: Option<&str>,
    batch: Vec<serde_json::Value>,
) -> Response {
    if batch.is_empty() {
        let response = JsonRpcResponse::error(None, -32600, "Invalid Request: empty batch");
        return Json(response).into_response();
    }

    let outcomes = join_all(
        batch.into_iter().map(|message| handle_message(state, auth, session_header, message)),
    )
    .await;

    let mut new_session_id = None;
    let mut responses = Vec::new();
    for outcome in outcomes {
        if new_session_id.is_none() {
            new_session_id = outcome.new_session_id;
        }
        if let Some(response) = outcome.response {
            responses.push(response);
        }
    }

    let response = if responses.is_empty() {
        StatusCode::ACCEPTED.into_response()
    } else {
        Json(responses).into_response()
    };
    attach_session_header(response, new_session_id.as_deref())
}

fn attach_session_header(mut response: Response, session_id: Option<&str>) -> Response {
    if let Some(id) = session_id {
        if let Ok(value) = HeaderValue::from_str(id) {
            response.headers_mut().insert("Mcp-Session-Id", value);
        }
    }
    response
}

fn plain_error(status: StatusCode, error: &str, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": error, "message": message }))).into_response()
}

/// Validate the JSON-RPC envelope shape.
fn parse_request(message: serde_json::Value) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let id = message.get("id").cloned();

    let Ok(request) = serde_json::from_value::<JsonRpcRequest>(message) else {
        return Err(JsonRpcResponse::error(id, -32600, "Invalid Request"));
    };
    if request.jsonrpc != "2.0" {
        return Err(JsonRpcResponse::error(request.id, -32600, "Invalid Request: jsonrpc must be \"2.0\""));
    }

    Ok(request)
}

/// Look up the session named by the `Mcp-Session-Id` header and require a
/// completed handshake.
async fn require_session(
    state: &HttpState,
    session_header: Option<&str>,
) -> Result<Arc<Session>, SessionError> {
    let id = session_header.ok_or(SessionError::UnknownSession)?;
    let session = state.sessions.get(id).await?;
    session.require_ready().await?;
    session.touch().await;
    Ok(session)
}

/// Route one JSON-RPC message.
async fn handle_message(
    state: &Arc<HttpState>,
    auth: Option<&AuthContext>,
    session_header: Option<&str>,
    message: serde_json::Value,
) -> Outcome {
    let request = match parse_request(message) {
        Ok(request) => request,
        Err(response) => return Outcome::respond(response),
    };

    tracing::debug!(method = %request.method, "Handling JSON-RPC message");
    let is_notification = request.is_notification();

    match request.method.as_str() {
        "initialize" => handle_initialize(state, &request).await,
        "notifications/initialized" | "initialized" => {
            let result = match session_header {
                Some(id) => state.sessions.complete_initialization(id).await,
                None => Err(SessionError::UnknownSession),
            };
            match (result, is_notification) {
                (Ok(()), true) => Outcome::silent(),
                (Ok(()), false) => {
                    Outcome::respond(JsonRpcResponse::success(request.id, serde_json::json!({})))
                }
                (Err(err), true) => {
                    tracing::warn!(error = %err, "Handshake completion failed");
                    Outcome::silent()
                }
                (Err(err), false) => {
                    Outcome::respond(JsonRpcResponse::from_session_error(request.id, err))
                }
            }
        }
        "ping" => Outcome::respond(JsonRpcResponse::success(
            request.id,
            serde_json::json!({
                "status": "pong",
                "timestamp": Utc::now().to_rfc3339()
            }),
        )),
        "tools/list" => match require_session(state, session_header).await {
            Ok(_) => {
                if let Some(denied) = check_scope(auth, request.id.clone(), can_read, "mcp:read") {
                    return Outcome::respond(denied);
                }
                Outcome::respond(tools_list_response(request.id, &state.tools))
            }
            Err(err) => Outcome::respond(JsonRpcResponse::from_session_error(request.id, err)),
        },
        "tools/call" => match require_session(state, session_header).await {
            Ok(session) => {
                Outcome::respond(handle_tools_call(state, auth, &session, request).await)
            }
            Err(err) => Outcome::respond(JsonRpcResponse::from_session_error(request.id, err)),
        },
        "resources/list" => match require_session(state, session_header).await {
            Ok(_) => {
                if let Some(denied) = check_scope(auth, request.id.clone(), can_read, "mcp:read") {
                    return Outcome::respond(denied);
                }
                Outcome::respond(JsonRpcResponse::success(
                    request.id,
                    serde_json::json!({ "resources": [] }),
                ))
            }
            Err(err) => Outcome::respond(JsonRpcResponse::from_session_error(request.id, err)),
        },
        "prompts/list" => match require_session(state, session_header).await {
            Ok(_) => {
                if let Some(denied) = check_scope(auth, request.id.clone(), can_read, "mcp:read") {
                    return Outcome::respond(denied);
                }
                Outcome::respond(JsonRpcResponse::success(
                    request.id,
                    serde_json::json!({ "prompts": [] }),
                ))
            }
            Err(err) => Outcome::respond(JsonRpcResponse::from_session_error(request.id, err)),
        },
        "resources/read" | "prompts/get" => Outcome::respond(JsonRpcResponse::error_with_data(
            request.id,
            -32601,
            "Method not found",
            format!("{} not implemented", request.method),
        )),
        "notifications/cancelled" => {
            if is_notification {
                Outcome::silent()
            } else {
                Outcome::respond(JsonRpcResponse::success(request.id, serde_json::json!({})))
            }
        }
        _ => {
            if is_notification {
                Outcome::silent()
            } else {
                Outcome::respond(JsonRpcResponse::error(
                    request.id,
                    -32601,
                    format!("Method not found: {}", request.method),
                ))
            }
        }
    }
}

/// `initialize`: allocate a session and start the handshake.
async fn handle_initialize(state: &Arc<HttpState>, request: &JsonRpcRequest) -> Outcome {
    let requested_version = request
        .params
        .get("protocolVersion")
        .and_then(|v| v.as_str())
        .unwrap_or(protocol::VERSION);

    if requested_version != protocol::VERSION {
        tracing::warn!(
            requested = %requested_version,
            supported = %protocol::VERSION,
            "Client requested a different protocol version"
        );
    }

    let session = state.sessions.create().await;
    if let Err(err) = session.begin_initialization(requested_version).await {
        // Freshly created sessions always accept the handshake.
        return Outcome::respond(JsonRpcResponse::from_session_error(request.id.clone(), err));
    }

    tracing::info!(session_id = %session.id, protocol = %requested_version, "MCP initialize");

    let result = serde_json::json!({
        "protocolVersion": protocol::VERSION,
        "capabilities": {
            "tools": { "listChanged": false },
            "resources": { "subscribe": false, "listChanged": false },
            "prompts": { "listChanged": false }
        },
        "serverInfo": {
            "name": protocol::SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    });

    Outcome {
        response: Some(JsonRpcResponse::success(request.id.clone(), result)),
        new_session_id: Some(session.id.clone()),
    }
}

/// Scope gate; `None` when access is allowed.
fn check_scope(
    auth: Option<&AuthContext>,
    id: Option<serde_json::Value>,
    allowed: fn(&str) -> bool,
    required: &str,
) -> Option<JsonRpcResponse> {
    let auth = auth?;
    if allowed(&auth.scope) {
        return None;
    }
    Some(JsonRpcResponse::error_with_data(
        id,
        -32603,
        "Insufficient permissions",
        format!("{required} scope required"),
    ))
}

fn tools_list_response(id: Option<serde_json::Value>, tools: &[Box<dyn McpTool>]) -> JsonRpcResponse {
    let tool_list: Vec<McpToolInfo> = tools
        .iter()
        .map(|t| McpToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect();

    JsonRpcResponse::success(id, serde_json::json!({ "tools": tool_list }))
}

async fn handle_tools_call(
    state: &Arc<HttpState>,
    auth: Option<&AuthContext>,
    session: &Arc<Session>,
    request: JsonRpcRequest,
) -> JsonRpcResponse {
    let JsonRpcRequest { params, id, .. } = request;

    if let Some(denied) = check_scope(auth, id.clone(), can_read, "mcp:read") {
        return denied;
    }

    let Some(tool_name) = params.get("name").and_then(|v| v.as_str()) else {
        return JsonRpcResponse::error_with_data(
            id,
            -32602,
            "Invalid params",
            "Tool name is required",
        );
    };

    let Some(tool) = state.tools.iter().find(|t| t.name() == tool_name) else {
        return JsonRpcResponse::error_with_data(
            id,
            -32601,
            "Tool not found",
            format!("Tool '{tool_name}' not found"),
        );
    };

    if tool.requires_write() {
        if let Some(auth) = auth {
            if !can_write(&auth.scope) {
                return JsonRpcResponse::error_with_data(
                    id,
                    -32603,
                    "Insufficient permissions",
                    "Write operations require mcp:write or mcp:admin scope",
                );
            }
        }
    }

    let arguments = params.get("arguments").cloned().unwrap_or_else(|| serde_json::json!({}));
    let progress_token = params.get("_meta").and_then(|meta| meta.get("progressToken")).cloned();

    if let Some(ref token) = progress_token {
        push_progress(session, token, 0).await;
    }

    tracing::info!(tool = %tool_name, session_id = %session.id, "Executing tool");

    match tool.execute(&state.ctx, arguments).await {
        Ok(text) => {
            let response = JsonRpcResponse::success(
                id,
                serde_json::json!({
                    "content": [{
                        "type": "text",
                        "text": text
                    }]
                }),
            );

            // Progress completion and the terminal response are enqueued in
            // order so stream consumers observe them sequenced.
            if let Some(ref token) = progress_token {
                push_progress(session, token, 1).await;
            }
            if let Ok(data) = serde_json::to_string(&response) {
                session.push_event("message", data).await;
            }

            response
        }
        Err(err) => {
            tracing::error!(tool = %tool_name, error = %err, "Tool execution failed");
            JsonRpcResponse::error(id, -32000, format!("Tool error: {}", err.to_user_message()))
        }
    }
}

/// Enqueue a `notifications/progress` event for a tracked tool call.
async fn push_progress(session: &Arc<Session>, token: &serde_json::Value, progress: u32) {
    let notification = serde_json::json!({
        "jsonrpc": "2.0",
        "method": "notifications/progress",
        "params": {
            "progressToken": token,
            "progress": progress,
            "total": 1
        }
    });
    session.push_event("message", notification.to_string()).await;
}

// ─── GET /mcp (SSE stream) ───────────────────────────────────────────────────

async fn handle_mcp_get(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }

    let Some(session_id) = headers.get("mcp-session-id").and_then(|v| v.to_str().ok()) else {
        return plain_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Mcp-Session-Id header is required",
        );
    };

    let session = match state.sessions.get(session_id).await {
        Ok(session) => session,
        Err(_) => {
            return plain_error(
                StatusCode::NOT_FOUND,
                "unknown_session",
                "Unknown or expired session",
            );
        }
    };
    if session.require_ready().await.is_err() {
        return plain_error(
            StatusCode::BAD_REQUEST,
            "not_initialized",
            "Session initialization has not completed",
        );
    }
    session.touch().await;

    let last_event_id: u64 = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    tracing::info!(
        session_id = %session.id,
        last_event_id,
        "Opening SSE stream"
    );

    let stream = build_sse_stream(session, last_event_id).await;

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
        .into_response();

    let headers = response.headers_mut();
    headers.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    if let Ok(value) = HeaderValue::from_str(session_id) {
        headers.insert("Mcp-Session-Id", value);
    }
    response
}

/// Replay missed events, then switch to the live broadcast.
async fn build_sse_stream(
    session: Arc<Session>,
    last_event_id: u64,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let missed = session.get_events_after(last_event_id).await;
    let replay = stream::iter(missed.into_iter().map(|event| {
        tracing::debug!(event_id = event.id, "Replaying missed event");
        Ok::<_, Infallible>(event.to_sse_event())
    }));

    let receiver = session.subscribe();
    let live = BroadcastStream::new(receiver).filter_map(|result| async move {
        match result {
            Ok(event) => Some(Ok(event.to_sse_event())),
            Err(err) => {
                tracing::debug!(error = %err, "Broadcast lag, client will catch up on reconnect");
                None
            }
        }
    });

    replay.chain(live)
}

// ─── DELETE /mcp ─────────────────────────────────────────────────────────────

async fn handle_mcp_delete(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }

    let Some(session_id) = headers.get("mcp-session-id").and_then(|v| v.to_str().ok()) else {
        return plain_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Mcp-Session-Id header is required",
        );
    };

    state.sessions.close(session_id).await;
    StatusCode::NO_CONTENT.into_response()
}

// ─── GET /sse (deprecated) ───────────────────────────────────────────────────

/// Legacy SSE endpoint. Announces the `/mcp` endpoint, signals deprecation,
/// and closes.
async fn handle_sse_deprecated(State(state): State<Arc<HttpState>>) -> Response {
    tracing::warn!("Deprecated SSE endpoint accessed, client should use /mcp");

    let endpoint = format!("{}/mcp", state.base_url);
    let stream = async_stream::stream! {
        yield Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint));
        yield Ok(Event::default()
            .event("deprecated")
            .data("This endpoint is deprecated. Please use Streamable HTTP transport at /mcp"));
    };

    let mut response = Sse::new(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("X-Deprecated", HeaderValue::from_static("true"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_checks() {
        assert!(can_read("mcp:read mcp:write"));
        assert!(can_read("mcp:admin"));
        assert!(!can_read("mcp:write"));

        assert!(can_write("mcp:read mcp:write"));
        assert!(can_write("mcp:admin"));
        assert!(!can_write("mcp:read"));
    }

    #[test]
    fn test_parse_request_valid() {
        let request = parse_request(serde_json::json!({
            "jsonrpc": "2.0",
            "method": "ping",
            "id": 1
        }))
        .unwrap();
        assert_eq!(request.method, "ping");
        assert!(!request.is_notification());
    }

    #[test]
    fn test_parse_request_notification() {
        let request = parse_request(serde_json::json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .unwrap();
        assert!(request.is_notification());
    }

    #[test]
    fn test_parse_request_rejects_wrong_version() {
        let err = parse_request(serde_json::json!({
            "jsonrpc": "1.0",
            "method": "ping",
            "id": 1
        }))
        .unwrap_err();
        assert_eq!(err.error.unwrap().code, -32600);
        assert_eq!(err.id, Some(serde_json::json!(1)));
    }

    #[test]
    fn test_parse_request_rejects_missing_method() {
        let err = parse_request(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 7
        }))
        .unwrap_err();
        assert_eq!(err.error.unwrap().code, -32600);
        assert_eq!(err.id, Some(serde_json::json!(7)));
    }

    #[test]
    fn test_parse_request_rejects_non_object() {
        let err = parse_request(serde_json::json!("hello")).unwrap_err();
        assert_eq!(err.error.unwrap().code, -32600);
        assert_eq!(err.id, None);
    }

    #[test]
    fn test_response_serializes_null_id() {
        let response = JsonRpcResponse::error(None, -32700, "Parse error");
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("id").is_some());
        assert!(value["id"].is_null());
    }
}
