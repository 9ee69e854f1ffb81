//! HTTP surface tests: routing, auth, error envelopes, and the full
//! workflow driven end-to-end through the JSON API.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use cs_crm::{CrmConnector, CrmPayload, CrmRegistry};
use cs_domain::config::Config;
use cs_domain::error::Result;
use cs_engines::mock::MockEngine;
use cs_gateway::api;
use cs_gateway::state::AppState;
use cs_platforms::PlatformRegistry;
use cs_sessions::SessionStatus;

fn fast_config() -> Config {
    let mut config = Config::default();
    config.session.tick_interval_ms = 10;
    config.session.monitor_interval_s = 1;
    config.transcription.quality_check_interval_s = 1;
    // Point auth at an env var the test environment never sets, so the
    // suite runs in dev mode regardless of the host's CS_API_TOKEN.
    config.server.api_token_env = "CS_TEST_UNSET_TOKEN".into();
    config
}

struct OkCrm(&'static str);

#[async_trait::async_trait]
impl CrmConnector for OkCrm {
    fn system(&self) -> &str {
        self.0
    }
    async fn write(&self, payload: &CrmPayload) -> Result<String> {
        Ok(format!("REC_{}", payload.idempotency_token))
    }
}

fn crm_registry() -> CrmRegistry {
    let mut crm = CrmRegistry::empty();
    crm.register(Arc::new(OkCrm("salesforce")));
    crm.register(Arc::new(OkCrm("hubspot")));
    crm.register(Arc::new(OkCrm("creatio")));
    crm
}

fn build_app(config: Config) -> (AppState, Router) {
    let state = AppState::build(
        Arc::new(config),
        Arc::new(MockEngine::new()),
        PlatformRegistry::with_default_bots(),
        crm_registry(),
        false,
    )
    .unwrap();
    let app = api::router(state.clone()).with_state(state.clone());
    (state, app)
}

async fn request(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    request_with_token(app, method, uri, body, None).await
}

async fn request_with_token(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create_meeting(app: &Router) -> Uuid {
    let (status, body) = request(
        app,
        "POST",
        "/v1/meetings",
        Some(json!({
            "calendar_event_id": format!("cal_{}", Uuid::new_v4().simple()),
            "title": "Sales Call - Test Company",
            "attendees": ["john.smith@testcompany.com"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().parse().unwrap()
}

/// Start a session over HTTP and wait until it transcribes.
async fn start_session(state: &AppState, app: &Router, meeting_id: Uuid) -> String {
    let (status, body) = request(
        app,
        "POST",
        &format!("/v1/meetings/{meeting_id}/start"),
        Some(json!({"meeting_url": "https://meet.google.com/abc-defg-hij"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if state.manager.status(&session_id).map(|s| s.status)
            == Some(SessionStatus::Transcribing)
        {
            return session_id;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session {session_id} never reached transcribing");
}

#[tokio::test]
async fn health_is_public_and_metrics_respond() {
    let (_state, app) = build_app(fast_config());

    let (status, body) = request(&app, "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = request(&app, "GET", "/v1/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meetings"], 0);
}

#[tokio::test]
async fn protected_routes_require_token_when_configured() {
    // The token env var is read at build time; use a test-unique name.
    std::env::set_var("CS_TEST_HTTP_TOKEN", "sekrit");
    let mut config = fast_config();
    config.server.api_token_env = "CS_TEST_HTTP_TOKEN".into();
    let (_state, app) = build_app(config);

    // Health stays public.
    let (status, _) = request(&app, "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);

    // Protected route without a token.
    let (status, body) = request(&app, "GET", "/v1/sessions", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("API token"));

    // Wrong token.
    let (status, _) =
        request_with_token(&app, "GET", "/v1/sessions", None, Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Correct token.
    let (status, _) =
        request_with_token(&app, "GET", "/v1/sessions", None, Some("sekrit")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn start_rejects_unknown_meeting_and_bad_platform() {
    let (_state, app) = build_app(fast_config());
    let ghost = Uuid::new_v4();

    let (status, body) = request(
        &app,
        "POST",
        &format!("/v1/meetings/{ghost}/start"),
        Some(json!({"meeting_url": "https://meet.google.com/abc"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not found"));

    let meeting_id = create_meeting(&app).await;
    let (status, body) = request(
        &app,
        "POST",
        &format!("/v1/meetings/{meeting_id}/start"),
        Some(json!({"meeting_url": "https://meet.google.com/abc", "platform": "webex"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("unsupported platform"));

    // Unsupported URL domain fails before any state mutation.
    let (status, _) = request(
        &app,
        "POST",
        &format!("/v1/meetings/{meeting_id}/start"),
        Some(json!({"meeting_url": "https://webex.com/meet/x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_calendar_event_is_rejected() {
    let (_state, app) = build_app(fast_config());
    let body = json!({
        "calendar_event_id": "cal_dup",
        "title": "First",
    });
    let (status, _) = request(&app, "POST", "/v1/meetings", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, resp) = request(&app, "POST", "/v1/meetings", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(resp["error"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn full_workflow_over_http() {
    let (state, app) = build_app(fast_config());

    // Lead ingest + meeting + matching.
    let (status, _) = request(
        &app,
        "POST",
        "/v1/leads",
        Some(json!({
            "crm_id": "E2E_LEAD_001",
            "name": "John Smith",
            "email": "john.smith@testcompany.com",
            "company": "Test Company Inc",
            "status": "qualified",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let meeting_id = create_meeting(&app).await;
    let (status, body) = request(
        &app,
        "POST",
        &format!("/v1/meetings/{meeting_id}/match-lead"),
        Some(json!({"lead_email": "john.smith@testcompany.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lead"]["crm_id"], "E2E_LEAD_001");

    // Bot joins; transcript chunks stream in over the sim surface.
    let session_id = start_session(&state, &app, meeting_id).await;
    for chunk in [
        "Thanks for taking the time to meet today.",
        "We're looking at a Q1 implementation with a budget of around $50K.",
        "The technical requirements look good. When can we start?",
    ] {
        let (status, body) = request(
            &app,
            "POST",
            &format!("/v1/meetings/sessions/{session_id}/transcript"),
            Some(json!({"transcript_chunk": chunk})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    // Live sessions always serve a fresh snapshot.
    let (status, body) = request(&app, "GET", &format!("/v1/sessions/{session_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cached"], false);
    assert_eq!(body["session"]["status"], "transcribing");

    // Wait for the worker to drain the queue before ending.
    let tid = state
        .manager
        .status(&session_id)
        .unwrap()
        .transcription_session_id
        .unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline
        && state.transcription.transcript_chunks(&tid, None).len() < 3
    {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // External end produces the draft summary.
    let (status, body) = request(
        &app,
        "POST",
        &format!("/v1/meetings/{meeting_id}/end"),
        Some(json!({"meeting_duration": 45})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let draft_id = body["summary_id"].as_str().unwrap().to_string();

    // CRM sync before validation is gated off.
    let (status, body) = request(
        &app,
        "POST",
        &format!("/v1/meetings/{meeting_id}/sync-crm"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("validation"));

    // Validation workflow.
    let (status, body) = request(
        &app,
        "POST",
        "/v1/validation/sessions",
        Some(json!({"draft_summary_id": draft_id, "validator": "sales@ourcompany.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let validation_id = body["validation_session"]["id"].as_str().unwrap().to_string();

    let (status, body) = request(
        &app,
        "GET",
        &format!("/v1/validation/sessions/{validation_id}/questions"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let questions = body["validation_questions"].as_array().unwrap().clone();
    assert!(questions.len() >= 4);

    for question in &questions {
        let response = match question["type"].as_str().unwrap() {
            "confirmation" => json!({"confirmed": true, "notes": "Confirmed accurate"}),
            "action_items_review" => {
                json!({"approved_items": question["items"].clone(), "notes": "All approved"})
            }
            "crm_approval" => json!({"approved": true, "notes": "CRM updates approved"}),
            other => panic!("unexpected question type {other}"),
        };
        let (status, _) = request(
            &app,
            "POST",
            &format!("/v1/validation/sessions/{validation_id}/responses"),
            Some(json!({"question_id": question["id"], "response": response})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = request(
        &app,
        "POST",
        &format!("/v1/validation/sessions/{validation_id}/complete"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["validated"]["status"], "completed");

    // CRM sync now succeeds for all three systems.
    let (status, body) = request(
        &app,
        "POST",
        &format!("/v1/meetings/{meeting_id}/sync-crm"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let records = body["sync_records"].as_array().unwrap();
    assert_eq!(records.len(), 3);
    for record in records {
        assert_eq!(record["sync_status"], "completed");
        assert_eq!(record["attempts"], 1);
    }
    assert!(body["errors"].as_array().unwrap().is_empty());

    // Idempotent re-sync returns the same completed records.
    let (status, body) = request(
        &app,
        "POST",
        &format!("/v1/meetings/{meeting_id}/sync-crm"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    for record in body["sync_records"].as_array().unwrap() {
        assert_eq!(record["attempts"], 1);
    }

    // Meeting snapshot ties the chain together.
    let (status, body) = request(&app, "GET", &format!("/v1/meetings/{meeting_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meeting"]["status"], "completed");
    assert_eq!(body["meeting"]["lead_id"], "E2E_LEAD_001");
    assert!(!body["bot_session"]["raw_transcript"]
        .as_str()
        .unwrap()
        .is_empty());
    assert_eq!(body["draft_summary"]["id"].as_str().unwrap(), draft_id);

    // Idempotent end: repeating the call answers with the same draft.
    let (status, body) = request(
        &app,
        "POST",
        &format!("/v1/meetings/{meeting_id}/end"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary_id"].as_str().unwrap(), draft_id);
}

#[tokio::test]
async fn bad_validation_responses_are_rejected() {
    let (state, app) = build_app(fast_config());
    let meeting_id = create_meeting(&app).await;
    let session_id = start_session(&state, &app, meeting_id).await;

    let (_, _) = request(
        &app,
        "POST",
        &format!("/v1/meetings/sessions/{session_id}/transcript"),
        Some(json!({"transcript_chunk": "short call"})),
    )
    .await;
    let tid = state
        .manager
        .status(&session_id)
        .unwrap()
        .transcription_session_id
        .unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline
        && state.transcription.transcript_chunks(&tid, None).is_empty()
    {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let (_, body) = request(
        &app,
        "POST",
        &format!("/v1/meetings/{meeting_id}/end"),
        Some(json!({})),
    )
    .await;
    let draft_id = body["summary_id"].as_str().unwrap().to_string();

    let (_, body) = request(
        &app,
        "POST",
        "/v1/validation/sessions",
        Some(json!({"draft_summary_id": draft_id, "validator": "v"})),
    )
    .await;
    let validation_id = body["validation_session"]["id"].as_str().unwrap().to_string();

    // Wrong shape.
    let (status, body) = request(
        &app,
        "POST",
        &format!("/v1/validation/sessions/{validation_id}/responses"),
        Some(json!({"question_id": "confirm_summary", "response": {"confirmed": "yes"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("confirmed"));

    // Unknown question.
    let (status, _) = request(
        &app,
        "POST",
        &format!("/v1/validation/sessions/{validation_id}/responses"),
        Some(json!({"question_id": "nope", "response": {"confirmed": true}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Completing with unanswered questions fails.
    let (status, body) = request(
        &app,
        "POST",
        &format!("/v1/validation/sessions/{validation_id}/complete"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("unanswered"));
}

#[tokio::test]
async fn unknown_draft_cannot_start_validation() {
    let (_state, app) = build_app(fast_config());
    let (status, _) = request(
        &app,
        "POST",
        "/v1/validation/sessions",
        Some(json!({"draft_summary_id": Uuid::new_v4(), "validator": "v"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
