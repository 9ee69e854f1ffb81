//! Validation workflow endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::{api_error, error_response};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateValidationRequest {
    pub draft_summary_id: Uuid,
    /// Identity of the human validator (e.g. the sales rep's email).
    pub validator: String,
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateValidationRequest>,
) -> Response {
    // Drafts live in the store once their session finalized; the
    // generator map covers drafts still in flight.
    let draft = state
        .store
        .draft(req.draft_summary_id)
        .or_else(|| state.summaries.draft_by_id(req.draft_summary_id));
    let Some(draft) = draft else {
        return api_error(
            StatusCode::NOT_FOUND,
            format!("draft summary {} not found", req.draft_summary_id),
        );
    };

    match state.validation.create_session(&draft, &req.validator) {
        Ok(session) => {
            (StatusCode::CREATED, Json(json!({ "validation_session": session })))
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn get_questions(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.validation.questions(id) {
        Ok(questions) => {
            Json(json!({ "validation_questions": questions })).into_response()
        }
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct SubmitResponseRequest {
    pub question_id: String,
    pub response: Value,
}

pub async fn submit_response(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitResponseRequest>,
) -> Response {
    match state
        .validation
        .submit_response(id, &req.question_id, req.response)
    {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn complete_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.validation.complete(id) {
        Ok(session) => Json(json!({ "validated": session })).into_response(),
        Err(e) => error_response(e),
    }
}
