use crate::relay::RelayHub;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RelayHub>,
}

/// Success response for a hardware push
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponse {
    success: bool,
    timestamp: DateTime<Utc>,
    entity_id: String,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

/// Create API router with ingest and health endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/hardware/data", post(ingest_hardware_data))
        .route("/health", get(health))
        .with_state(Arc::new(state))
}

/// POST /api/hardware/data - Accept one pushed reading
///
/// Bodies that are not JSON objects are accepted as empty readings.
async fn ingest_hardware_data(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let body = body.map_err(|e| {
        warn!(status = %e.status(), error = %e, "Rejected ingest body");
        AppError::Rejected(e.status(), e.body_text())
    })?;

    let payload = serde_json::from_slice::<Value>(&body).unwrap_or_else(|e| {
        debug!(error = %e, "Ingest body is not JSON, treating as empty");
        Value::Null
    });

    let receipt = state.hub.ingest(&payload);

    Ok(Json(IngestResponse {
        success: receipt.success,
        timestamp: receipt.timestamp,
        entity_id: receipt.reading.entity_id,
    }))
}

/// GET /health - Relay status and connected client count
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.hub.health())
}

/// Application error types
enum AppError {
    /// The body could not be read at all (e.g. over the size limit)
    Rejected(StatusCode, String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Rejected(status, msg) => (status, msg),
        };
        let body = Json(ErrorResponse {
            success: false,
            error: error_message,
        });
        (status, body).into_response()
    }
}
