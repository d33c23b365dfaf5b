//! HTTP routes for the approval flow
//!
//! Everything except `/health` is a host route: it needs the host token as
//! `Authorization: Bearer <token>` or `x-beeconnect-token`. No CORS headers
//! are served, so browsers refuse the token-bearing preflight from any page.

use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::engine::{Engine, EventDisposition};
use crate::error::ConnectError;

pub const TOKEN_HEADER: &str = "x-beeconnect-token";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub app_name: String,
    pub api_token: String,
}

impl ServerConfig {
    pub fn new(app_name: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self { app_name: app_name.into(), api_token: api_token.into() }
    }

}

#[derive(Clone)]
pub struct EngineState {
    pub engine: Engine,
    pub app_name: String,
    token_digest: Arc<[u8; 32]>,
}

impl EngineState {
    pub fn new(engine: Engine, config: &ServerConfig) -> Self {
        Self {
            engine,
            app_name: config.app_name.clone(),
            token_digest: Arc::new(Sha256::digest(config.api_token.as_bytes()).into()),
        }
    }

    /// Digests compare in constant time whatever the presented length.
    fn accepts(&self, presented: &str) -> bool {
        let digest: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        bool::from(digest[..].ct_eq(&self.token_digest[..]))
    }
}

fn presented_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(bearer) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(bearer);
    }
    headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok())
}

async fn require_token(State(s): State<EngineState>, request: Request, next: Next) -> Response {
    match presented_token(request.headers()) {
        Some(token) if s.accepts(token) => next.run(request).await,
        _ => {
            warn!(path = %request.uri().path(), method = %request.method(), "host route refused: bad or missing token");
            (StatusCode::UNAUTHORIZED, Json(json!({"error": "host token required"}))).into_response()
        }
    }
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(e: ConnectError) -> ApiError {
    let status = match &e {
        ConnectError::UnknownRequest(_) | ConnectError::NoSession(_) => StatusCode::NOT_FOUND,
        ConnectError::AlreadySettled(_) => StatusCode::CONFLICT,
        ConnectError::NoWallet(_) | ConnectError::InvalidLink(_) | ConnectError::Protocol(_) => StatusCode::BAD_REQUEST,
        ConnectError::Transport(_)
        | ConnectError::Timeout(_)
        | ConnectError::Destroyed
        | ConnectError::Unacknowledged(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"error": e.to_string()})))
}

#[derive(Deserialize)]
pub struct LinkRequest { link: String }

#[derive(Deserialize, Default)]
pub struct ApproveRequest { #[serde(default)] wallet: Option<String> }

#[derive(Deserialize, Default)]
pub struct RejectRequest { #[serde(default)] reason: Option<String> }

#[derive(Serialize)]
pub struct CountResponse { removed: usize }

pub fn create_router(engine: Engine, config: &ServerConfig) -> Router {
    let state = EngineState::new(engine, config);
    let host = Router::new()
        .route("/wallets", get(list_wallets))
        .route("/sessions", get(list_sessions).delete(disconnect_all))
        .route("/sessions/:id", delete(disconnect_session))
        .route("/links", post(submit_link))
        .route("/requests", get(list_requests))
        .route("/requests/:key/approve", post(approve_request))
        .route("/requests/:key/reject", post(reject_request))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .merge(host)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(s): State<EngineState>) -> impl IntoResponse {
    Json(json!({"status": "ok", "service": s.app_name, "engine": s.engine.status()}))
}

async fn list_wallets(State(s): State<EngineState>) -> impl IntoResponse {
    let wallets = s.engine.wallets();
    Json(json!({"count": wallets.len(), "wallets": wallets, "stored": s.engine.stored_wallets()}))
}

async fn list_sessions(State(s): State<EngineState>) -> impl IntoResponse {
    let sessions = s.engine.sessions();
    Json(json!({"count": sessions.len(), "sessions": sessions}))
}

async fn disconnect_all(State(s): State<EngineState>) -> Json<CountResponse> {
    Json(CountResponse { removed: s.engine.disconnect_all().await })
}

async fn disconnect_session(State(s): State<EngineState>, Path(id): Path<String>) -> Result<Json<CountResponse>, ApiError> {
    if s.engine.disconnect_session(&id).await {
        Ok(Json(CountResponse { removed: 1 }))
    } else {
        Err(api_error(ConnectError::NoSession(id)))
    }
}

async fn submit_link(State(s): State<EngineState>, Json(body): Json<LinkRequest>) -> Result<Json<Value>, ApiError> {
    match s.engine.handle_connection_link(&body.link).await.map_err(api_error)? {
        EventDisposition::Pending(key) => Ok(Json(json!({"status": "pending", "key": key}))),
        EventDisposition::Answered => Ok(Json(json!({"status": "answered"}))),
        EventDisposition::Dropped => Ok(Json(json!({"status": "dropped"}))),
    }
}

async fn list_requests(State(s): State<EngineState>) -> impl IntoResponse {
    let pending = s.engine.pending_requests();
    Json(json!({"count": pending.len(), "requests": pending}))
}

async fn approve_request(
    State(s): State<EngineState>,
    Path(key): Path<String>,
    body: Option<Json<ApproveRequest>>,
) -> Result<Json<Value>, ApiError> {
    let wallet = body.and_then(|Json(b)| b.wallet);
    let result = s.engine.approve_pending(&key, wallet.as_deref()).await.map_err(api_error)?;
    Ok(Json(json!({"approved": key, "result": result})))
}

async fn reject_request(
    State(s): State<EngineState>,
    Path(key): Path<String>,
    body: Option<Json<RejectRequest>>,
) -> Result<Json<Value>, ApiError> {
    let reason = body.and_then(|Json(b)| b.reason);
    s.engine.reject_pending(&key, reason.as_deref()).await.map_err(api_error)?;
    Ok(Json(json!({"rejected": key})))
}
