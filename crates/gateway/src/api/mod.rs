pub mod admin;
pub mod auth;
pub mod meetings;
pub mod sessions;
pub mod validation;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};

use cs_domain::error::Error;

use crate::state::AppState;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Map a domain error onto an HTTP error envelope. Adapter internals
/// never leak past the envelope message.
pub(crate) fn error_response(error: Error) -> Response {
    let status = match &error {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::ValidationGate(_) => StatusCode::CONFLICT,
        Error::PermanentConnection(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::TransientConnection(_) | Error::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::CrmAdapter { .. } | Error::Engine { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, error.to_string())
}

/// Build the full API router.
///
/// Routes are split into **public** (health probe) and **protected**
/// (gated behind the bearer-token middleware).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/v1/health", get(admin::health));

    let protected = Router::new()
        // Leads (ingest mirror)
        .route("/v1/leads", post(meetings::upsert_lead))
        // Meetings
        .route("/v1/meetings", post(meetings::create_meeting))
        .route("/v1/meetings/:id/match-lead", post(meetings::match_lead))
        .route("/v1/meetings/:id", get(meetings::get_meeting))
        .route("/v1/meetings/:id", delete(meetings::delete_meeting))
        .route("/v1/meetings/:id/start", post(meetings::start_session))
        .route("/v1/meetings/:id/end", post(meetings::end_session))
        .route("/v1/meetings/:id/sync-crm", post(meetings::sync_crm))
        // Producer push (test/simulation surface)
        .route(
            "/v1/meetings/sessions/:session_id/transcript",
            post(meetings::push_transcript_chunk),
        )
        // Live call sessions
        .route("/v1/sessions", get(sessions::list_sessions))
        .route("/v1/sessions/:id", get(sessions::get_session))
        .route("/v1/sessions/:id/stop", post(sessions::stop_session))
        .route("/v1/sessions/:id/retry", post(sessions::retry_session))
        // Validation workflow
        .route("/v1/validation/sessions", post(validation::create_session))
        .route(
            "/v1/validation/sessions/:id/questions",
            get(validation::get_questions),
        )
        .route(
            "/v1/validation/sessions/:id/responses",
            post(validation::submit_response),
        )
        .route(
            "/v1/validation/sessions/:id/complete",
            post(validation::complete_session),
        )
        // Metrics
        .route("/v1/metrics", get(admin::metrics))
        // Apply API auth middleware to all protected routes.
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
