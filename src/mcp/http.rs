//! HTTP/SSE MCP transport.
//!
//! Exposes the same JSON-RPC surface as the stdio transport for remote MCP
//! clients: an SSE channel per session, a POST endpoint for requests,
//! discovery and health endpoints, and an OAuth 2.0 authorization-code flow
//! with PKCE for clients that require it.

use crate::config::Config;
use crate::error::{GedmcpError, Result};
use crate::mcp::server::McpServer;
use crate::mcp::types::*;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Redirect, Response,
    },
    routing::{get, post},
    Form, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use futures_util::{stream, Stream};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

const OAUTH_CLIENT_ID: &str = "gedmcp-client";
const OAUTH_REDIRECT_URI: &str = "https://claude.ai/api/mcp/auth_callback";

/// HTTP MCP server wrapper
pub struct HttpMcpServer {
    server: Arc<McpServer>,
    api_key: String,
    config: Config,
}

impl HttpMcpServer {
    pub fn new(server: Arc<McpServer>, config: Config) -> Result<Self> {
        // API key is optional in authless mode
        let api_key = if config.http_server.authless {
            String::new()
        } else {
            std::env::var(&config.http_server.api_key_env).map_err(|_| {
                GedmcpError::Config(format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable, or enable authless mode.",
                    config.http_server.api_key_env
                ))
            })?
        };

        Ok(Self {
            server,
            api_key,
            config,
        })
    }

    /// Run the HTTP server
    pub async fn run(&self, port: u16) -> Result<()> {
        let app = self.create_router();

        let addr = format!("127.0.0.1:{}", port);
        log::info!("Starting HTTP MCP server on http://{}", addr);
        log::info!("MCP endpoint: http://{}/mcp", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            GedmcpError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to bind to {}: {}. If the port is taken, change http_server.port in config.toml.",
                    addr, e
                ),
            ))
        })?;

        axum::serve(listener, app).await.map_err(|e| {
            GedmcpError::Io(std::io::Error::other(format!("HTTP server error: {}", e)))
        })?;

        Ok(())
    }

    fn create_router(&self) -> Router {
        let allowed_origins = self.config.http_server.allowed_origins.clone();
        let authless = self.config.http_server.authless;

        // CORS must agree with the per-request origin validation: explicit
        // origin list when configured, otherwise open for local use.
        let cors = if allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .route("/sse", get(handle_sse))
            .route("/mcp", post(handle_post))
            .route("/.well-known/mcp-server", get(handle_discovery))
            .route("/.well-known/mcp.json", get(handle_discovery))
            .route("/health", get(handle_health))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
            .route("/.well-known/oauth-authorization-server", get(handle_oauth_discovery))
            .route("/authorize", get(handle_authorize))
            .route("/token", post(handle_token))
            .with_state(AppState::new(
                Arc::clone(&self.server),
                self.api_key.clone(),
                allowed_origins,
                authless,
            ))
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    server: Arc<McpServer>,
    api_key: String,
    allowed_origins: Vec<String>,
    auth_codes: Arc<Mutex<HashMap<String, AuthCodeData>>>,
    authless: bool,
    /// SSE session id -> response channel
    sessions: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<JsonRpcResponse>>>>,
}

/// OAuth authorization code data
#[derive(Clone, Debug)]
struct AuthCodeData {
    redirect_uri: String,
    code_challenge: String,
    code_challenge_method: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    fn new(
        server: Arc<McpServer>,
        api_key: String,
        allowed_origins: Vec<String>,
        authless: bool,
    ) -> Self {
        Self {
            server,
            api_key,
            allowed_origins,
            auth_codes: Arc::new(Mutex::new(HashMap::new())),
            authless,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Handle POST requests (JSON-RPC requests).
/// Per MCP spec, responses go out via the session's SSE channel.
async fn handle_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    body: axum::body::Bytes,
) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": format!("Invalid JSON: {}", e)})),
            )
                .into_response();
        }
    };

    if !state.authless {
        if let Err(response) = validate_auth(&headers, &state.api_key) {
            return response;
        }
        if let Err(response) = validate_origin(&headers, &state.allowed_origins) {
            return response;
        }
    }

    // HTTP requests are stateless; initialization is tracked but not enforced
    let mut initialized = false;
    let session_id = params.get("session_id").cloned().unwrap_or_default();
    let method = request.method.clone();

    match state.server.process_mcp_request(request, &mut initialized).await {
        Ok(Some(response)) => {
            let sessions = state.sessions.lock().unwrap();
            if let Some(tx) = sessions.get(&session_id) {
                let _ = tx.send(response);
                // 202 per MCP spec: the response travels over SSE
                StatusCode::ACCEPTED.into_response()
            } else {
                // No SSE session: answer inline for plain HTTP clients
                (StatusCode::OK, Json(response)).into_response()
            }
        }
        Ok(None) => {
            if method == "notifications/initialized" {
                StatusCode::ACCEPTED.into_response()
            } else {
                StatusCode::NO_CONTENT.into_response()
            }
        }
        Err(e) => {
            log::error!("Error processing MCP request: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Internal server error",
                    "details": e.to_string()
                })),
            )
                .into_response()
        }
    }
}

/// SSE endpoint. Sends the session's endpoint event first, then MCP
/// responses as message events, interleaved with keepalives.
async fn handle_sse(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    // Validation failures must not break the stream; the POST endpoint
    // enforces them for actual requests.
    if !state.authless {
        let _ = validate_auth(&headers, &state.api_key);
        let _ = validate_origin(&headers, &state.allowed_origins);
    }

    let session_id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
    {
        let mut sessions = state.sessions.lock().unwrap();
        sessions.insert(session_id.clone(), tx);
    }

    let endpoint_event = Event::default()
        .event("endpoint")
        .data(format!("/mcp?session_id={}", session_id));

    let response_stream =
        tokio_stream::wrappers::UnboundedReceiverStream::new(rx).map(|response| {
            let json = serde_json::to_string(&response).unwrap_or_default();
            std::result::Result::<Event, Infallible>::Ok(Event::default().event("message").data(json))
        });

    let combined = stream::once(async move {
        std::result::Result::<Event, Infallible>::Ok(endpoint_event)
    })
    .chain(response_stream);

    Sse::new(combined).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    )
}

/// Discovery endpoint: server metadata for MCP clients.
async fn handle_discovery(State(state): State<AppState>) -> Response {
    let mut discovery = serde_json::json!({
        "name": "gedmcp",
        "version": env!("CARGO_PKG_VERSION"),
        "protocolVersion": "2024-11-05",
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": "gedmcp",
            "version": env!("CARGO_PKG_VERSION")
        },
        "transport": {
            "type": "sse",
            "endpoint": "/sse"
        }
    });

    if state.authless {
        discovery["authentication"] = serde_json::json!({ "type": "none" });
    }

    (StatusCode::OK, Json(discovery)).into_response()
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "gedmcp",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

/// OAuth 2.0 authorization server metadata (RFC 8414). The issuer is
/// derived from the Host header so tunneled and local deployments both work.
async fn handle_oauth_discovery(headers: HeaderMap, State(_state): State<AppState>) -> Response {
    let issuer = headers
        .get("host")
        .and_then(|h| h.to_str().ok())
        .map(|host| {
            let is_local = host.starts_with("localhost") || host.starts_with("127.0.0.1");
            if is_local {
                format!("http://{}", host)
            } else {
                format!("https://{}", host)
            }
        })
        .unwrap_or_else(|| "http://localhost:8080".to_string());

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{}/authorize", issuer),
            "token_endpoint": format!("{}/token", issuer),
            "grant_types_supported": ["authorization_code"],
            "response_types_supported": ["code"],
            "code_challenge_methods_supported": ["S256"],
            "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post", "none"],
            "scopes_supported": ["claudeai"]
        })),
    )
        .into_response()
}

fn oauth_error(code: StatusCode, error: &str, description: &str) -> Response {
    (
        code,
        Json(serde_json::json!({
            "error": error,
            "error_description": description
        })),
    )
        .into_response()
}

/// OAuth authorization endpoint: authorization code flow with PKCE.
async fn handle_authorize(
    State(app_state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let client_id = params.get("client_id").cloned().unwrap_or_default();
    let redirect_uri = params.get("redirect_uri").cloned().unwrap_or_default();
    let oauth_state = params.get("state").cloned().unwrap_or_default();
    let code_challenge = params.get("code_challenge").cloned().unwrap_or_default();
    let code_challenge_method = params
        .get("code_challenge_method")
        .cloned()
        .unwrap_or_else(|| "S256".to_string());
    let response_type = params.get("response_type").cloned().unwrap_or_default();

    if client_id != OAUTH_CLIENT_ID {
        return oauth_error(StatusCode::BAD_REQUEST, "invalid_client", "Invalid client_id");
    }
    if response_type != "code" {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "unsupported_response_type",
            "Only 'code' response type is supported",
        );
    }
    if redirect_uri != OAUTH_REDIRECT_URI {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_redirect_uri",
            "Invalid redirect_uri",
        );
    }

    let auth_code = Uuid::new_v4().to_string();
    let code_data = AuthCodeData {
        redirect_uri: redirect_uri.clone(),
        code_challenge,
        code_challenge_method,
        expires_at: chrono::Utc::now() + chrono::Duration::minutes(10),
    };
    {
        let mut codes = app_state.auth_codes.lock().unwrap();
        codes.insert(auth_code.clone(), code_data);
    }

    let mut redirect_url = url::Url::parse(&redirect_uri).expect("redirect URI is a constant");
    redirect_url
        .query_pairs_mut()
        .append_pair("code", &auth_code)
        .append_pair("state", &oauth_state);

    Redirect::to(redirect_url.as_str()).into_response()
}

/// OAuth token endpoint: exchanges an authorization code for a token.
async fn handle_token(
    State(app_state): State<AppState>,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    let grant_type = params.get("grant_type").cloned().unwrap_or_default();
    let code = params.get("code").cloned().unwrap_or_default();
    let client_id = params.get("client_id").cloned().unwrap_or_default();
    let client_secret = params.get("client_secret").cloned().unwrap_or_default();
    let code_verifier = params.get("code_verifier").cloned().unwrap_or_default();
    let redirect_uri = params.get("redirect_uri").cloned().unwrap_or_default();

    if grant_type != "authorization_code" {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "unsupported_grant_type",
            "Only 'authorization_code' grant type is supported",
        );
    }
    if client_id != OAUTH_CLIENT_ID {
        return oauth_error(StatusCode::BAD_REQUEST, "invalid_client", "Invalid client_id");
    }
    if client_secret != app_state.api_key {
        return oauth_error(StatusCode::BAD_REQUEST, "invalid_client", "Invalid client_secret");
    }

    let code_data = {
        let mut codes = app_state.auth_codes.lock().unwrap();
        codes.remove(&code)
    };
    let code_data = match code_data {
        Some(data) => data,
        None => {
            return oauth_error(
                StatusCode::BAD_REQUEST,
                "invalid_grant",
                "Invalid or expired authorization code",
            );
        }
    };

    if code_data.expires_at < chrono::Utc::now() {
        return oauth_error(StatusCode::BAD_REQUEST, "invalid_grant", "Authorization code expired");
    }
    if code_data.redirect_uri != redirect_uri {
        return oauth_error(StatusCode::BAD_REQUEST, "invalid_grant", "redirect_uri mismatch");
    }

    if code_data.code_challenge_method == "S256" {
        let mut hasher = Sha256::new();
        hasher.update(code_verifier.as_bytes());
        let computed = URL_SAFE_NO_PAD.encode(hasher.finalize());
        if computed != code_data.code_challenge {
            return oauth_error(
                StatusCode::BAD_REQUEST,
                "invalid_grant",
                "Invalid code_verifier (PKCE verification failed)",
            );
        }
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "access_token": app_state.api_key,
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "claudeai"
        })),
    )
        .into_response()
}

/// Validate Authorization header
fn validate_auth(headers: &HeaderMap, expected_key: &str) -> std::result::Result<(), Response> {
    let auth_header = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": "Missing Authorization header",
                    "message": "Use 'Authorization: Bearer <api-key>' header"
                })),
            )
                .into_response()
        })?;

    let provided_key = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "Invalid Authorization header format",
                "message": "Use 'Authorization: Bearer <api-key>' header"
            })),
        )
            .into_response()
    })?;

    if provided_key != expected_key {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid API key" })),
        )
            .into_response());
    }

    Ok(())
}

/// Validate Origin header (prevents DNS rebinding attacks)
fn validate_origin(headers: &HeaderMap, allowed_origins: &[String]) -> std::result::Result<(), Response> {
    if allowed_origins.is_empty() {
        return Ok(());
    }

    // No Origin header means a direct (non-browser) request
    let origin = match headers.get("origin").and_then(|h| h.to_str().ok()) {
        Some(o) => o,
        None => return Ok(()),
    };

    if allowed_origins.iter().any(|allowed| origin == allowed) {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "error": "Origin not allowed",
                "message": format!("Origin '{}' is not in the allowed origins list", origin)
            })),
        )
            .into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_auth_accepts_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer secret".parse().unwrap());
        assert!(validate_auth(&headers, "secret").is_ok());
    }

    #[test]
    fn test_validate_auth_rejects_wrong_key() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer wrong".parse().unwrap());
        assert!(validate_auth(&headers, "secret").is_err());
    }

    #[test]
    fn test_validate_auth_rejects_missing_header() {
        let headers = HeaderMap::new();
        assert!(validate_auth(&headers, "secret").is_err());
    }

    #[test]
    fn test_validate_origin_empty_list_allows_all() {
        let mut headers = HeaderMap::new();
        headers.insert("origin", "https://evil.example".parse().unwrap());
        assert!(validate_origin(&headers, &[]).is_ok());
    }

    #[test]
    fn test_validate_origin_enforces_list() {
        let mut headers = HeaderMap::new();
        headers.insert("origin", "https://evil.example".parse().unwrap());
        let allowed = vec!["https://claude.ai".to_string()];
        assert!(validate_origin(&headers, &allowed).is_err());

        let mut headers = HeaderMap::new();
        headers.insert("origin", "https://claude.ai".parse().unwrap());
        assert!(validate_origin(&headers, &allowed).is_ok());
    }
}
