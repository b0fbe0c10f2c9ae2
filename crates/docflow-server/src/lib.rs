//! HTTP trigger surface for the generation orchestrator.
//!
//! Two entry points: an explicit start request and a status poll, both of
//! which may (re)launch the orchestrator for a session as a detached task.
//! Handlers are thin wrappers over [`GenerationService`]; every pipeline
//! condition is answered with a normal status payload, and only a missing
//! questionnaire record yields an error status (404).

pub mod payloads;
mod service;

pub use payloads::{
    SessionStatus, StageFlags, StartRequest, StartResponse, StartStatus, StatusResponse,
};
pub use service::{GenerationService, ServiceError};

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::info;

use docflow_utils::SessionId;

/// Build the trigger-surface router.
pub fn router(service: Arc<GenerationService>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/generation/start", post(start_generation))
        .route("/generation/status/:session_id", get(generation_status))
        .with_state(service)
}

/// Bind and serve until the listener fails.
pub async fn serve(
    bind: &str,
    service: Arc<GenerationService>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr: std::net::SocketAddr = bind.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "docflow trigger surface listening");
    axum::serve(listener, router(service)).await?;
    Ok(())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn start_generation(
    State(service): State<Arc<GenerationService>>,
    Json(request): Json<StartRequest>,
) -> Response {
    // An id that fails validation can name no record.
    let Ok(session_id) = SessionId::parse(&request.session_id) else {
        return not_found(&request.session_id);
    };

    match service.start(&session_id).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn generation_status(
    State(service): State<Arc<GenerationService>>,
    Path(raw_session_id): Path<String>,
) -> Response {
    let Ok(session_id) = SessionId::parse(&raw_session_id) else {
        return not_found(&raw_session_id);
    };

    match service.status(&session_id).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => error_response(&e),
    }
}

fn not_found(raw_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": format!("no generation record for session '{raw_id}'"),
        })),
    )
        .into_response()
}

fn error_response(error: &ServiceError) -> Response {
    let status = match error {
        ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
        ServiceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(serde_json::json!({ "error": error.to_string() })),
    )
        .into_response()
}
