//! Live call-session endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::api::{api_error, error_response};
use crate::state::AppState;

pub async fn list_sessions(State(state): State<AppState>) -> Response {
    let sessions = state.manager.list_active();
    Json(json!({ "sessions": sessions, "count": sessions.len() })).into_response()
}

pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    // Live sessions always answer with a fresh snapshot (and re-warm
    // the cache); the cache serves readers that race a session teardown.
    if let Some(session) = state.manager.status(&id) {
        let snapshot = json!(session);
        state.cache_session(&id, snapshot.clone());
        return Json(json!({ "session": snapshot, "cached": false })).into_response();
    }

    if let Some(cached) = state.cached_session(&id) {
        return Json(json!({ "session": cached, "cached": true })).into_response();
    }

    // Stopped sessions answer with their cached summary.
    if let Some(summary) = state.manager.summary(&id) {
        return Json(json!({ "summary": summary })).into_response();
    }

    api_error(StatusCode::NOT_FOUND, format!("call session {id} not found"))
}

#[derive(Deserialize, Default)]
pub struct StopSessionRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn stop_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<StopSessionRequest>>,
) -> Response {
    let reason = body
        .and_then(|Json(req)| req.reason)
        .unwrap_or_else(|| "manual_stop".into());

    match state.manager.stop(&id, &reason).await {
        Ok(summary) => {
            state.invalidate_session(&id);
            Json(json!({ "summary": summary })).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn retry_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.manager.retry(&id) {
        Ok(session) => {
            state.cache_session(&id, json!(session));
            Json(json!({ "session": session })).into_response()
        }
        Err(e) => error_response(e),
    }
}
