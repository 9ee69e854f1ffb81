//! Health and metrics endpoints.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// Public health probe.
pub async fn health(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_sessions": state.manager.list_active().len(),
    }))
    .into_response()
}

/// Counts snapshot across the pipeline's stores and live workers.
pub async fn metrics(State(state): State<AppState>) -> Response {
    let (meetings, bot_sessions, drafts) = state.store.counts();
    Json(json!({
        "meetings": meetings,
        "bot_sessions": bot_sessions,
        "draft_summaries": drafts,
        "validation_sessions": state.validation.len(),
        "crm_sync_records": state.crm_sync.record_count(),
        "active_call_sessions": state.manager.list_active().len(),
        "active_transcriptions": state.transcription.list_active().len(),
        "active_bot_connections": state.call_bots.list_active().len(),
        "session_cache_entries": state.session_cache.read().len(),
    }))
    .into_response()
}
