//! Meeting endpoints: ingest, session start/end, the producer push
//! surface, and CRM sync.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use cs_domain::types::{Lead, Meeting, MeetingStatus, Platform};
use cs_sessions::CallSessionConfig;

use crate::api::{api_error, error_response};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/meetings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct CreateMeetingRequest {
    pub calendar_event_id: String,
    pub title: String,
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attendees: Vec<String>,
}

pub async fn create_meeting(
    State(state): State<AppState>,
    Json(req): Json<CreateMeetingRequest>,
) -> Response {
    let start_time = req.start_time.unwrap_or_else(Utc::now);
    let meeting = Meeting {
        id: Uuid::new_v4(),
        calendar_event_id: req.calendar_event_id,
        lead_id: req.lead_id,
        title: req.title,
        start_time,
        end_time: req.end_time.unwrap_or(start_time + Duration::hours(1)),
        attendees: req.attendees,
        status: MeetingStatus::Scheduled,
    };

    match state.store.insert_meeting(meeting.clone()) {
        Ok(()) => (StatusCode::CREATED, Json(json!(meeting))).into_response(),
        Err(e) => error_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/leads and POST /v1/meetings/:id/match-lead
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ingest helper: mirror a CRM lead so meetings can be matched to it.
pub async fn upsert_lead(State(state): State<AppState>, Json(lead): Json<Lead>) -> Response {
    state.store.upsert_lead(lead.clone());
    (StatusCode::CREATED, Json(json!(lead))).into_response()
}

#[derive(Deserialize)]
pub struct MatchLeadRequest {
    pub lead_email: String,
}

pub async fn match_lead(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<MatchLeadRequest>,
) -> Response {
    match state.store.match_meeting_lead(id, &req.lead_email) {
        Ok(lead) => Json(json!({ "lead": lead })).into_response(),
        Err(e) => error_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET / DELETE /v1/meetings/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_meeting(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let Some(meeting) = state.store.meeting(id) else {
        return api_error(StatusCode::NOT_FOUND, format!("meeting {id} not found"));
    };
    let bot_session = state.store.bot_session_for_meeting(id);
    let draft = bot_session
        .as_ref()
        .and_then(|s| state.store.draft_for_bot_session(s.id));
    Json(json!({
        "meeting": meeting,
        "bot_session": bot_session,
        "draft_summary": draft,
    }))
    .into_response()
}

/// Cascade delete: the meeting's bot session, draft, validation
/// sessions, and sync records all go with it. Leads survive.
pub async fn delete_meeting(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.store.delete_meeting(id) {
        Ok(draft_ids) => {
            for draft_id in draft_ids {
                for validation_id in state.validation.delete_for_draft(draft_id) {
                    state.crm_sync.delete_for_validation(validation_id);
                }
            }
            Json(json!({ "deleted": id })).into_response()
        }
        Err(e) => error_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/meetings/:id/start
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct StartSessionRequest {
    pub meeting_url: String,
    /// Explicit platform override; wins over URL detection.
    #[serde(default)]
    pub platform: Option<String>,
}

pub async fn start_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<StartSessionRequest>,
) -> Response {
    let platform = match req.platform.as_deref() {
        Some(name) => match Platform::parse(name) {
            Some(p) => Some(p),
            None => {
                return api_error(
                    StatusCode::BAD_REQUEST,
                    format!("unsupported platform override: {name}"),
                )
            }
        },
        None => None,
    };

    let mut config =
        CallSessionConfig::new(id, req.meeting_url, state.manager.defaults());
    config.platform = platform;

    match state.manager.start(config) {
        Ok(session) => {
            state.cache_session(&session.session_id, json!(session));
            (
                StatusCode::CREATED,
                Json(json!({
                    "session_id": session.session_id,
                    "status": session.status,
                })),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/meetings/sessions/:session_id/transcript
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct TranscriptPushRequest {
    pub transcript_chunk: String,
}

/// Producer push for test/simulation: feeds one chunk of audio into the
/// session's transcription queue. The chunk bytes stand in for the audio
/// the platform bot would capture.
pub async fn push_transcript_chunk(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<TranscriptPushRequest>,
) -> Response {
    let Some(session) = state.manager.status(&session_id) else {
        return api_error(
            StatusCode::NOT_FOUND,
            format!("call session {session_id} not found"),
        );
    };
    let Some(tid) = session.transcription_session_id else {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!("call session {session_id} is not transcribing"),
        );
    };

    let timestamp = (Utc::now() - session.started_at).num_milliseconds() as f64 / 1000.0;
    let duration = state.config.transcription.chunk_duration_s;
    match state.transcription.process_audio_chunk(
        &tid,
        req.transcript_chunk.into_bytes(),
        timestamp,
        duration,
    ) {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => error_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/meetings/:id/end
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct EndMeetingRequest {
    /// Authoritative transcript from the caller, appended if the live
    /// capture missed it.
    #[serde(default)]
    pub final_transcript: Option<String>,
    #[serde(default)]
    pub meeting_duration: Option<f64>,
}

pub async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<EndMeetingRequest>,
) -> Response {
    let active = state
        .manager
        .list_active()
        .into_iter()
        .find(|s| s.meeting_id == id && !s.status.is_terminal());

    let Some(session) = active else {
        // Idempotent end: a finished meeting answers with its draft.
        if let Some(bot_session) = state.store.bot_session_for_meeting(id) {
            if let Some(draft) = state.store.draft_for_bot_session(bot_session.id) {
                return Json(json!({ "summary_id": draft.id })).into_response();
            }
        }
        return api_error(
            StatusCode::NOT_FOUND,
            format!("no active session for meeting {id}"),
        );
    };

    // Merge in the caller-supplied transcript before stopping, so the
    // draft sees everything.
    if let Some(final_transcript) = req.final_transcript.filter(|t| !t.trim().is_empty()) {
        if let Some(record) = state.store.bot_session_for_meeting(id) {
            let existing = record.raw_transcript;
            let suffix = if existing.is_empty() {
                final_transcript
            } else if let Some(tail) = final_transcript.strip_prefix(existing.as_str()) {
                tail.to_string()
            } else {
                format!(" {final_transcript}")
            };
            if let Err(e) = state.store.append_transcript(record.id, &suffix) {
                return error_response(e);
            }
        }
    }

    match state.manager.stop(&session.session_id, "external_end").await {
        Ok(summary) => {
            state.invalidate_session(&session.session_id);
            Json(json!({
                "summary_id": summary.draft_summary_id,
                "session_summary": summary,
                "meeting_duration": req.meeting_duration,
            }))
            .into_response()
        }
        Err(e) => error_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/meetings/:id/sync-crm
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn sync_crm(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let Some(bot_session) = state.store.bot_session_for_meeting(id) else {
        return api_error(
            StatusCode::NOT_FOUND,
            format!("meeting {id} has no bot session"),
        );
    };
    let Some(draft) = state.store.draft_for_bot_session(bot_session.id) else {
        return api_error(
            StatusCode::NOT_FOUND,
            format!("meeting {id} has no draft summary"),
        );
    };

    let sessions = state.validation.sessions_for_draft(draft.id);
    let Some(validation) = sessions.first() else {
        return api_error(
            StatusCode::CONFLICT,
            "no validation session exists for this meeting's draft",
        );
    };
    if !validation.is_completed() {
        // The gate also rejects inside the sync engine; failing early
        // keeps the envelope message precise.
        return api_error(
            StatusCode::CONFLICT,
            format!(
                "validation session {} is {:?}; CRM sync requires completed",
                validation.id, validation.status
            ),
        );
    }

    let results = state.crm_sync.sync_all(validation, &draft).await;
    let mut records = Vec::new();
    let mut errors = Vec::new();
    for (system, result) in results {
        match result {
            Ok(record) => records.push(json!(record)),
            Err(e) => errors.push(json!({ "crm_system": system, "error": e.to_string() })),
        }
    }

    let status = if errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (
        status,
        Json(json!({ "sync_records": records, "errors": errors })),
    )
        .into_response()
}
