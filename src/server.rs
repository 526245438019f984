//! HTTP surface.
//!
//! Thin axum layer over the chat core. All state lives in [`AppState`];
//! handlers authenticate the bearer token, call into the pipeline or the
//! index manager, and map failures to the JSON error contract.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/signup` | Register a new account |
//! | `POST` | `/token` | Exchange credentials for a bearer token |
//! | `POST` | `/chat` | Ask a question (authenticated) |
//! | `GET`  | `/chat/history` | Ordered conversation turns (authenticated) |
//! | `POST` | `/update-docs` | Manual reindex trigger |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses carry a machine-readable code:
//!
//! ```json
//! { "error": { "code": "invalid_token", "message": "Token expired" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::auth::{self, UserStore};
use crate::config::Config;
use crate::generation::ChatPipeline;
use crate::history::MessageStore;
use crate::index::IndexManager;
use crate::models::UserInfo;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    users: UserStore,
    messages: MessageStore,
    index: Arc<IndexManager>,
    pipeline: Arc<ChatPipeline>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        users: UserStore,
        messages: MessageStore,
        index: Arc<IndexManager>,
        pipeline: Arc<ChatPipeline>,
    ) -> Self {
        Self {
            config,
            users,
            messages,
            index,
            pipeline,
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/signup", post(handle_signup))
        .route("/token", post(handle_token))
        .route("/chat", post(handle_chat))
        .route("/chat/history", get(handle_history))
        .route("/update-docs", post(handle_update_docs))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process is terminated.
pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let bind_addr = state.config.server.bind.clone();
    let app = build_router(state);

    info!(addr = %bind_addr, "chat server listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn conflict(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "conflict".to_string(),
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "invalid_token".to_string(),
        message: message.into(),
    }
}

fn internal(code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: code.to_string(),
        message: message.into(),
    }
}

/// Resolve the authenticated user id from the `Authorization` header.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<i64, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("Missing Authorization header"))?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("Expected a bearer token"))?;

    auth::verify_token(&state.config.auth, token).map_err(|e| unauthorized(e.to_string()))
}

// ============ POST /signup ============

#[derive(Deserialize)]
struct SignupRequest {
    username: String,
    email: String,
    password: String,
}

async fn handle_signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<UserInfo>, AppError> {
    if req.username.is_empty() || req.password.is_empty() {
        return Err(bad_request("username and password must not be empty"));
    }

    let user = state
        .users
        .create_user(&req.username, &req.email, &req.password)
        .await
        .map_err(|e| {
            if e.to_string().contains("already registered") {
                conflict(e.to_string())
            } else {
                internal("internal", e.to_string())
            }
        })?;

    Ok(Json(user))
}

// ============ POST /token ============

#[derive(Deserialize)]
struct TokenRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
}

async fn handle_token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let user_id = state
        .users
        .authenticate(&req.username, &req.password)
        .await
        .map_err(|e| internal("internal", e.to_string()))?
        .ok_or_else(|| unauthorized("Incorrect username or password"))?;

    let access_token = auth::issue_token(&state.config.auth, user_id)
        .map_err(|e| internal("internal", e.to_string()))?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let user_id = authorize(&state, &headers)?;

    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    // Fire-and-forget document sync check; the answer path below reads
    // whatever index is current when it fetches its retriever.
    let index = state.index.clone();
    tokio::spawn(async move {
        if let Err(e) = index.check_and_update().await {
            warn!(error = %e, "background index update failed");
        }
    });

    let response = state
        .pipeline
        .answer(user_id, &req.message)
        .await
        .map_err(|e| internal("generation_failed", e.to_string()))?;

    Ok(Json(ChatResponse { response }))
}

// ============ GET /chat/history ============

#[derive(Serialize)]
struct HistoryEntry {
    role: String,
    content: String,
}

async fn handle_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<HistoryEntry>>, AppError> {
    let user_id = authorize(&state, &headers)?;

    let messages = state
        .messages
        .history(user_id)
        .await
        .map_err(|e| internal("internal", e.to_string()))?;

    Ok(Json(
        messages
            .into_iter()
            .map(|m| HistoryEntry {
                role: m.role.as_str().to_string(),
                content: m.content,
            })
            .collect(),
    ))
}

// ============ POST /update-docs ============

#[derive(Serialize)]
struct UpdateDocsResponse {
    updated: bool,
}

async fn handle_update_docs(
    State(state): State<AppState>,
) -> Result<Json<UpdateDocsResponse>, AppError> {
    let updated = state
        .index
        .check_and_update()
        .await
        .map_err(|e| internal("internal", e.to_string()))?;

    Ok(Json(UpdateDocsResponse { updated }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
