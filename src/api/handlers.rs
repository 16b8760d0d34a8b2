//! HTTP request handlers

use super::types::{ErrorResponse, GradeScaleResponse, HistoryResponse, ScoreRequest, ValueRequest};
use super::AppState;
use crate::runtime::{Command, StepError, StepReply};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session actions
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/count", post(declare_count))
        .route("/api/sessions/:id/credit", post(supply_credit))
        .route("/api/sessions/:id/score", post(supply_score))
        .route("/api/sessions/:id/reset", post(reset_session))
        // Stored results
        .route("/api/sessions/:id/history", get(get_history))
        // Grade table
        .route("/api/grade-scale", get(get_grade_scale))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Session Actions
// ============================================================

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StepReply>, AppError> {
    dispatch(&state, &id, Command::Inspect).await
}

async fn declare_count(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ValueRequest>,
) -> Result<Json<StepReply>, AppError> {
    dispatch(&state, &id, Command::Start { raw: req.value }).await
}

async fn supply_credit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ValueRequest>,
) -> Result<Json<StepReply>, AppError> {
    dispatch(&state, &id, Command::SupplyCredit { raw: req.value }).await
}

async fn supply_score(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ScoreRequest>,
) -> Result<Json<StepReply>, AppError> {
    let command = Command::SupplyScore {
        raw: req.value,
        index: req.index,
    };
    dispatch(&state, &id, command).await
}

async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StepReply>, AppError> {
    dispatch(&state, &id, Command::Reset).await
}

async fn dispatch(
    state: &AppState,
    session_id: &str,
    command: Command,
) -> Result<Json<StepReply>, AppError> {
    if session_id.trim().is_empty() {
        return Err(AppError::BadRequest("Session id must not be empty".to_string()));
    }
    let reply = state.runtime.dispatch(session_id, command).await?;
    Ok(Json(reply))
}

// ============================================================
// History & Scale
// ============================================================

async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let runs = state
        .runtime
        .db()
        .list_gpa_runs(&id)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(HistoryResponse { sender_id: id, runs }))
}

async fn get_grade_scale(State(state): State<AppState>) -> Json<GradeScaleResponse> {
    let scale = state.runtime.scale();
    Json(GradeScaleResponse {
        name: scale.name().to_string(),
        max_point: scale.max_point(),
        tiers: scale.tiers().to_vec(),
    })
}

async fn get_version() -> &'static str {
    concat!("gpa-assistant ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    Conflict(StepError),
    Internal(String),
    Step(StepError),
}

impl From<StepError> for AppError {
    fn from(error: StepError) -> Self {
        match error {
            StepError::OutOfSequence { .. } => AppError::Conflict(error),
            StepError::Storage(_) | StepError::Unavailable(_) => AppError::Step(error),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::new(msg)),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::new(msg))
            }
            AppError::Conflict(error) => (
                StatusCode::CONFLICT,
                ErrorResponse::new(error.to_string()).with_kind(error.kind()),
            ),
            AppError::Step(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(error.to_string()).with_kind(error.kind()),
            ),
        };

        (status, Json(body)).into_response()
    }
}
