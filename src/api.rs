//! REST API Server for the Intent Dispatch Core
//!
//! Exposes authentication, message dispatch and job polling via HTTP
//! Integrates with frontend UI

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::classifier::IntentClassifier;
use crate::dispatcher::TaskDispatcher;
use crate::jobs::JobSupervisor;
use crate::models::ResultKind;
use crate::profile::ProfileService;
use crate::session::SessionManager;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub user_id: String,
    pub display_name: String,
    pub credential: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    pub credential: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub classifier: Arc<IntentClassifier>,
    pub dispatcher: Arc<TaskDispatcher>,
    pub sessions: Arc<SessionManager>,
    pub profiles: ProfileService,
    pub jobs: JobSupervisor,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Auth Endpoints
/// =============================

async fn register(
    State(state): State<ApiState>,
    Json(req): Json<RegisterRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    match state
        .profiles
        .register(&req.user_id, &req.display_name, &req.credential)
        .await
    {
        Ok(profile) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "user_id": profile.user_id,
                "display_name": profile.display_name,
                "credential_strength": crate::profile::password_strength(&req.credential),
            }))),
        ),
        Err(e) => (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string()))),
    }
}

async fn login(
    State(state): State<ApiState>,
    Json(req): Json<LoginRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    match state
        .sessions
        .authenticate(&req.user_id, &req.credential)
        .await
    {
        Ok(session) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": session.session_id,
                "user_id": session.user_id,
                "display_name": session.display_name,
                "started_at": session.started_at,
            }))),
        ),
        Err(e) => (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

async fn logout(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    let ended = state.sessions.logout().await;
    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({ "ended": ended }))),
    )
}

/// =============================
/// Message Endpoint
/// =============================

async fn message(
    State(state): State<ApiState>,
    Json(req): Json<MessageRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let intent = state.classifier.classify(&req.text).await;
    info!(kind = %intent.kind, confidence = intent.confidence, "classified message");

    match state.dispatcher.dispatch(intent).await {
        Ok(result) => {
            // System actions may carry a directive the presentation
            // layer applies; do it here for the HTTP surface.
            if result.kind == ResultKind::Action {
                match result.payload.get("directive").and_then(|v| v.as_str()) {
                    Some("clear_context") => {
                        if let Err(e) = state.sessions.clear_context().await {
                            warn!(error = %e, "could not clear session context");
                        }
                    }
                    Some("logout") => {
                        state.sessions.logout().await;
                    }
                    _ => {}
                }
            }
            (StatusCode::OK, Json(ApiResponse::success(result)))
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

/// =============================
/// Job Polling Endpoint
/// =============================

async fn job_status(
    State(state): State<ApiState>,
    Path(job_id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.jobs.handle(job_id).await {
        Some(handle) => (StatusCode::OK, Json(ApiResponse::success(handle))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("unknown job: {}", job_id))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/message", post(message))
        .route("/api/jobs/:id", get(job_status))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
