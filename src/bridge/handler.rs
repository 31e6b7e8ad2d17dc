//! HTTP handlers for the bridge endpoints.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/.well-known/oauth-authorization-server` | RFC 8414 metadata |
//! | `GET` | `/.well-known/oauth-protected-resource` | RFC 9728 metadata |
//! | `POST` | `/register` | RFC 7591 registration (stateless) |
//! | `GET` | `/authorize` | Open a session, redirect to the connection UI |
//! | `POST` | `/connections/{provider}` | Report an upstream code for a provider |
//! | `GET` | `/connect/complete` | Mint tokens, redirect to `/callback` |
//! | `GET` | `/connect/abort` | Cancel, redirect to the client with `access_denied` |
//! | `GET` | `/callback` | Relay the code to the client |
//! | `POST` | `/access-token`, `/token` | Code and refresh grants |
//! | `GET` | `/health` | Liveness |
//!
//! Browser-facing endpoints fail with an HTML page; programmatic ones with
//! an OAuth JSON error.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use super::{AuthorizeRequest, BridgeCore, CallbackParams, ConnectionReport, TokenRequest};
use crate::oauth::ErrorPage;
use crate::provider::ProviderKey;
use crate::{Error, Result};

/// Session id passed explicitly instead of via cookie
#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    /// Session id
    pub session: Option<String>,
}

// ── Route builder ─────────────────────────────────────────────────────────

/// Build the bridge router.
pub fn create_router(core: Arc<BridgeCore>) -> Router {
    // Programmatic endpoints are called cross-origin by browser-based clients
    let api = Router::new()
        .route(
            "/.well-known/oauth-authorization-server",
            get(authorization_server_metadata),
        )
        .route(
            "/.well-known/oauth-authorization-server/{*path}",
            get(authorization_server_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(protected_resource_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource/{*path}",
            get(protected_resource_metadata),
        )
        .route("/register", post(register))
        .route("/access-token", post(token))
        .route("/token", post(token))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/health", get(health))
        .route("/authorize", get(authorize))
        .route("/connections/{provider}", post(connect_provider))
        .route("/connect/complete", get(complete))
        .route("/connect/abort", get(abort))
        .route("/callback", get(callback))
        .merge(api)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(core)
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn authorization_server_metadata(State(core): State<Arc<BridgeCore>>) -> impl IntoResponse {
    Json(core.authorization_server_metadata())
}

async fn protected_resource_metadata(State(core): State<Arc<BridgeCore>>) -> impl IntoResponse {
    Json(core.protected_resource_metadata())
}

async fn register(State(core): State<Arc<BridgeCore>>, body: Bytes) -> Result<Response> {
    let response = core.register(&body)?;
    Ok((StatusCode::CREATED, no_store(), Json(response)).into_response())
}

/// `GET /authorize` - open a session and send the browser to the connection UI.
async fn authorize(
    State(core): State<Arc<BridgeCore>>,
    Query(request): Query<AuthorizeRequest>,
) -> std::result::Result<Response, ErrorPage> {
    let started = core.authorize(request)?;
    let cookie = session_cookie(&core, &started.session_id, core.sessions().ttl().as_secs());
    Ok(found_with_cookie(started.connect_url.as_str(), &cookie))
}

/// `POST /connections/{provider}` - exchange an upstream code for the session.
async fn connect_provider(
    State(core): State<Arc<BridgeCore>>,
    Path(provider): Path<String>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let report: ConnectionReport = serde_json::from_slice(&body)
        .map_err(|e| Error::invalid_request(format!("Malformed connection report: {e}")))?;
    let provider: ProviderKey = provider
        .parse()
        .map_err(|_| Error::invalid_request(format!("Unknown provider {provider:?}")))?;
    let session_id = resolve_session(&core, &headers, query.session.or(report.session.clone()))
        .ok_or_else(|| Error::invalid_request("Unknown or expired session"))?;

    let status = core.connect_provider(&session_id, provider, &report).await?;
    Ok(Json(status).into_response())
}

/// `GET /connect/complete` - mint tokens and continue to the callback.
async fn complete(
    State(core): State<Arc<BridgeCore>>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> std::result::Result<Response, ErrorPage> {
    let session_id = resolve_session(&core, &headers, query.session)
        .ok_or_else(|| Error::invalid_request("Unknown or expired session"))?;
    let url = core.complete(&session_id)?;
    Ok(found(url.as_str()))
}

/// `GET /connect/abort` - cancel and tell the client.
async fn abort(
    State(core): State<Arc<BridgeCore>>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> std::result::Result<Response, ErrorPage> {
    let session_id = resolve_session(&core, &headers, query.session)
        .ok_or_else(|| Error::invalid_request("Unknown or expired session"))?;
    let url = core.abort(&session_id)?;
    Ok(found_with_cookie(url.as_str(), &session_cookie(&core, "", 0)))
}

/// `GET /callback` - relay the code to the client redirect URI.
async fn callback(
    State(core): State<Arc<BridgeCore>>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Response {
    let session_id = cookie_value(&headers, core.cookie_name());
    let clear = session_cookie(&core, "", 0);

    match core.relay_callback(session_id.as_deref(), &params) {
        Ok(url) => found_with_cookie(url.as_str(), &clear),
        Err(e) => {
            let mut response = ErrorPage::from(e).into_response();
            if let Ok(value) = HeaderValue::from_str(&clear) {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
            response
        }
    }
}

/// `POST /access-token` - accepts form or JSON bodies.
async fn token(
    State(core): State<Arc<BridgeCore>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let request = parse_token_request(&headers, &body)?;
    let pair = core.token(&request).await?;
    Ok((StatusCode::OK, no_store(), Json(pair)).into_response())
}

// ── Helpers ───────────────────────────────────────────────────────────────

fn parse_token_request(headers: &HeaderMap, body: &[u8]) -> Result<TokenRequest> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    if is_json {
        serde_json::from_slice(body)
            .map_err(|e| Error::invalid_request(format!("Malformed JSON body: {e}")))
    } else {
        serde_urlencoded::from_bytes(body)
            .map_err(|e| Error::invalid_request(format!("Malformed form body: {e}")))
    }
}

/// Read one cookie from the `Cookie` header.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

/// Explicit session id wins over the cookie.
fn resolve_session(
    core: &BridgeCore,
    headers: &HeaderMap,
    explicit: Option<String>,
) -> Option<String> {
    explicit
        .filter(|s| !s.is_empty())
        .or_else(|| cookie_value(headers, core.cookie_name()))
}

fn session_cookie(core: &BridgeCore, value: &str, max_age: u64) -> String {
    let secure = if core.issuer().starts_with("https://") {
        "; Secure"
    } else {
        ""
    };
    format!(
        "{}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}{secure}",
        core.cookie_name()
    )
}

fn no_store() -> [(header::HeaderName, &'static str); 2] {
    [
        (header::CACHE_CONTROL, "no-store"),
        (header::PRAGMA, "no-cache"),
    ]
}

/// `302 Found`
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn found_with_cookie(location: &str, cookie: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location), (header::SET_COOKIE, cookie)],
    )
        .into_response()
}
