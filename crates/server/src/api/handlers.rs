use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use seatrace_core::session::STATUS_LOG_TAIL;
use seatrace_core::{
    AttemptOutcome, AttemptRequest, LogEvent, RequestSummary, RunState, SanitizedConfig,
};

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::{AppState, StartError, StopError};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub ok: bool,
    pub session_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub ok: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl ErrorResponse {
    fn new(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                ok: false,
                error: error.into(),
            }),
        )
    }
}

/// Status of the latest run, or an idle placeholder before the first one.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub state: Option<RunState>,
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestSummary>,
    pub logs: Vec<LogEvent>,
    pub result: Option<AttemptOutcome>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Start a run
pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AttemptRequest>,
) -> Result<Json<StartResponse>, impl IntoResponse> {
    match state.start(request).await {
        Ok(session) => Ok(Json(StartResponse {
            ok: true,
            session_id: session.id(),
        })),
        Err(StartError::AlreadyRunning) => Err(ErrorResponse::new(
            StatusCode::CONFLICT,
            "a run is already in progress",
        )),
        Err(StartError::Invalid(e)) => {
            Err(ErrorResponse::new(StatusCode::BAD_REQUEST, e.to_string()))
        }
    }
}

/// Stop the running session
pub async fn stop(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StopResponse>, impl IntoResponse> {
    match state.stop().await {
        Ok(session) => {
            info!(session = %session.id(), "stop requested");
            Ok(Json(StopResponse { ok: true }))
        }
        Err(StopError::NoSession) | Err(StopError::NotRunning) => Err(ErrorResponse::new(
            StatusCode::CONFLICT,
            "no run in progress",
        )),
    }
}

/// Status of the latest session
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let Some(session) = state.current().await else {
        return Json(StatusResponse {
            running: false,
            state: None,
            session_id: None,
            started_at: None,
            finished_at: None,
            request: None,
            logs: Vec::new(),
            result: None,
        });
    };

    let status = session.status(STATUS_LOG_TAIL).await;
    Json(StatusResponse {
        running: status.running,
        state: Some(status.state),
        session_id: Some(status.session_id),
        started_at: Some(status.started_at),
        finished_at: status.finished_at,
        request: Some(status.request),
        logs: status.logs,
        result: status.result,
    })
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state).await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
