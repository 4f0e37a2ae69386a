use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::EngineError;
use crate::models::action::Submission;
use crate::models::game::CreateSession;
use crate::models::seat::SeatId;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedSession {
    pub session_id: String,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/create", post(create_session))
        .route("/:session_id", delete(delete_session))
        .route("/:session_id/view/:seat_id", get(get_view))
        .route("/:session_id/actions", post(submit_action))
        .route("/:session_id/step", post(step_session))
        .route("/:session_id/debug", get(debug_session))
        .with_state(state)
}

fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::NotFound(_) | EngineError::SeatNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::StaleVersion { .. } => StatusCode::CONFLICT,
        EngineError::IllegalAction(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::CapacityExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::InvalidRoster(_) => StatusCode::BAD_REQUEST,
        EngineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: EngineError) -> (StatusCode, Json<serde_json::Value>) {
    let mut body = json!({
        "code": err.code(),
        "message": err.to_string(),
        "refetch": err.requires_refetch(),
        "retryable": err.is_retryable(),
    });
    if let EngineError::IllegalAction(reason) = &err {
        body["detail"] = json!(reason);
    }
    (status_for(&err), Json(body))
}

fn ok_response<T: Serialize>(value: T) -> (StatusCode, Json<serde_json::Value>) {
    match serde_json::to_value(value) {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "code": "ENCODE", "message": e.to_string() })),
        ),
    }
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSession>,
) -> impl IntoResponse {
    match state.store.create(request).await {
        Ok(session_id) => ok_response(CreatedSession { session_id }),
        Err(e) => error_response(e),
    }
}

pub async fn get_view(
    State(state): State<AppState>,
    Path((session_id, seat_id)): Path<(String, SeatId)>,
) -> impl IntoResponse {
    match state.store.get_view(&session_id, seat_id).await {
        Ok(view) => ok_response(view),
        Err(e) => error_response(e),
    }
}

async fn submit_action(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(submission): Json<Submission>,
) -> impl IntoResponse {
    match state.store.submit_action(&session_id, submission).await {
        Ok(receipt) => ok_response(receipt),
        Err(e) => error_response(e),
    }
}

async fn step_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.store.step(&session_id).await {
        Ok(report) => ok_response(report),
        Err(e) => error_response(e),
    }
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete(&session_id).await {
        Ok(()) => ok_response(json!({ "deleted": session_id })),
        Err(e) => error_response(e),
    }
}

// Full session including hidden roles; only served with debug views on.
async fn debug_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    if !state.config.debug_views {
        return error_response(EngineError::NotFound(session_id));
    }
    match state.store.get(&session_id).await {
        Ok(session) => ok_response(session),
        Err(e) => error_response(e),
    }
}
