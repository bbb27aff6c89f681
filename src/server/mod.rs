//! HTTP control surface
//!
//! Thin axum layer over the scheduler engine: configuration, start/stop,
//! manual runs, and status reporting. All scheduling logic lives in the
//! engine; handlers only translate between HTTP and engine calls.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::UserConfig;
use crate::scheduler::{Engine, SchedulerError, StatusRecord, StatusSummary, UserView};

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The scheduling engine
    pub engine: Arc<Engine>,

    /// Server start time
    pub start_time: Instant,
}

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Simple error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub users: usize,
    pub targets: usize,
}

/// Response for a stored configuration
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub user_id: String,
    pub message: String,
}

/// Per-user status response: configuration view plus live target records
#[derive(Debug, Serialize)]
pub struct UserStatusResponse {
    pub user: UserView,
    pub targets: Vec<StatusRecord>,
}

/// Configured user listing
#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<String>,
}

fn error_status(err: &SchedulerError) -> StatusCode {
    match err {
        SchedulerError::UnknownUser(_) => StatusCode::NOT_FOUND,
        SchedulerError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        SchedulerError::Client(_) => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(err: SchedulerError) -> axum::response::Response {
    (error_status(&err), Json(ErrorResponse::new(err.to_string()))).into_response()
}

// ============================================================================
// Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Per-user control
        .route("/config/{user_id}", post(set_config))
        .route("/start/{user_id}", post(start_user))
        .route("/stop/{user_id}", post(stop_user))
        .route("/test/{user_id}", post(run_once))
        .route("/status/{user_id}", get(user_status))
        .route("/users", get(list_users))
        // System-wide reporting
        .route("/system/health", get(health_check))
        .route("/system/status-summary", get(status_summary))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Store (or replace) a user's configuration
async fn set_config(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(config): Json<UserConfig>,
) -> axum::response::Response {
    match state.engine.set_config(&user_id, config).await {
        Ok(()) => Json(ApiResponse::success(ConfigResponse {
            user_id: user_id.clone(),
            message: format!("Configuration stored for user '{user_id}'"),
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Start scheduling for a configured user
async fn start_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> axum::response::Response {
    match state.engine.start(&user_id).await {
        Ok(report) => Json(ApiResponse::success(report)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Stop scheduling for a user, destroying all their targets
async fn stop_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> axum::response::Response {
    match state.engine.stop(&user_id).await {
        Ok(report) => Json(ApiResponse::success(report)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Fire every current target of a user once, outside the schedule
async fn run_once(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> axum::response::Response {
    match state.engine.run_once(&user_id).await {
        Ok(report) => Json(ApiResponse::success(report)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Configuration view and live target status for one user
async fn user_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> axum::response::Response {
    match state.engine.user_view(&user_id).await {
        Some(user) => {
            let targets = state.engine.status_snapshot(Some(&user_id)).await;
            Json(ApiResponse::success(UserStatusResponse { user, targets })).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("User not found: {user_id}"))),
        )
            .into_response(),
    }
}

/// List configured user IDs
async fn list_users(State(state): State<AppState>) -> impl IntoResponse {
    let users = state.engine.user_ids().await;
    Json(ApiResponse::success(UsersResponse { users }))
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        users: state.engine.user_ids().await.len(),
        targets: state.engine.target_count().await,
    }))
}

/// Aggregated status summary across all users
async fn status_summary(State(state): State<AppState>) -> Json<ApiResponse<StatusSummary>> {
    Json(ApiResponse::success(state.engine.status_summary().await))
}

// ============================================================================
// Server
// ============================================================================

/// Serve the control surface until the shutdown future resolves
pub async fn serve(
    addr: SocketAddr,
    engine: Arc<Engine>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let state = AppState {
        engine,
        start_time: Instant::now(),
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Control surface listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Control surface shutdown complete");
    Ok(())
}
