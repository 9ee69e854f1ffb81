//! End-to-end pipeline scenarios: call join through transcription,
//! draft summary, validation, and CRM sync.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use cs_crm::{CrmConnector, CrmPayload, CrmRegistry, SyncStatus};
use cs_domain::config::Config;
use cs_domain::error::{Error, Result};
use cs_domain::types::{
    AudioQuality, ConnectionStatus, Meeting, MeetingStatus, Platform,
};
use cs_engines::mock::MockEngine;
use cs_gateway::state::AppState;
use cs_platforms::meet::MeetBot;
use cs_platforms::service::spawn_connection_monitor;
use cs_platforms::{PlatformBot, PlatformRegistry};
use cs_sessions::{CallSessionConfig, SessionStatus};
use cs_validation::QuestionType;
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Test fixtures
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn fast_config() -> Config {
    let mut config = Config::default();
    config.session.tick_interval_ms = 10;
    config.session.monitor_interval_s = 1;
    config.session.reconnect_delay_base_s = 0;
    config.transcription.quality_check_interval_s = 1;
    config
}

fn build_state(config: Config, platforms: PlatformRegistry, crm: CrmRegistry) -> AppState {
    AppState::build(
        Arc::new(config),
        Arc::new(MockEngine::new()),
        platforms,
        crm,
        false,
    )
    .expect("state builds")
}

fn insert_meeting(state: &AppState) -> Uuid {
    let meeting = Meeting {
        id: Uuid::new_v4(),
        calendar_event_id: format!("cal_{}", Uuid::new_v4().simple()),
        lead_id: Some("E2E_LEAD_001".into()),
        title: "Sales Call - Test Company".into(),
        start_time: Utc::now(),
        end_time: Utc::now() + chrono::Duration::hours(1),
        attendees: vec!["john.smith@testcompany.com".into()],
        status: MeetingStatus::Scheduled,
    };
    let id = meeting.id;
    state.store.insert_meeting(meeting).unwrap();
    id
}

async fn wait_for<F: FnMut() -> bool>(mut cond: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Start a session and wait for TRANSCRIBING; returns (session_id,
/// transcription session id).
async fn start_transcribing(state: &AppState, meeting_id: Uuid, url: &str) -> (String, String) {
    let session = state
        .manager
        .start(CallSessionConfig::new(
            meeting_id,
            url,
            state.manager.defaults(),
        ))
        .unwrap();

    assert!(
        wait_for(
            || {
                state
                    .manager
                    .status(&session.session_id)
                    .map(|s| s.status == SessionStatus::Transcribing)
                    .unwrap_or(false)
            },
            Duration::from_secs(5)
        )
        .await,
        "session never reached transcribing"
    );

    let tid = state
        .manager
        .status(&session.session_id)
        .unwrap()
        .transcription_session_id
        .unwrap();
    (session.session_id, tid)
}

/// Answer and complete a validation session for a draft.
fn complete_validation(state: &AppState, draft_id: Uuid) -> cs_validation::ValidationSession {
    let draft = state.store.draft(draft_id).unwrap();
    let session = state
        .validation
        .create_session(&draft, "sales@ourcompany.com")
        .unwrap();
    for q in &session.questions {
        let response = match q.question_type {
            QuestionType::Confirmation => json!({"confirmed": true, "notes": "Confirmed accurate"}),
            QuestionType::ActionItemsReview => {
                json!({"approved_items": q.items.clone().unwrap_or_default(), "notes": "All approved"})
            }
            QuestionType::CrmApproval => json!({"approved": true, "notes": "CRM updates approved"}),
        };
        state
            .validation
            .submit_response(session.id, &q.id, response)
            .unwrap();
    }
    state.validation.complete(session.id).unwrap()
}

/// CRM connector scripted to fail a fixed number of times, counting
/// every write that reaches the CRM.
struct ScriptedCrm {
    system: String,
    failures: AtomicU32,
    creates: AtomicU32,
}

impl ScriptedCrm {
    fn new(system: &str, failures: u32) -> Self {
        Self {
            system: system.into(),
            failures: AtomicU32::new(failures),
            creates: AtomicU32::new(0),
        }
    }
}

#[async_trait::async_trait]
impl CrmConnector for ScriptedCrm {
    fn system(&self) -> &str {
        &self.system
    }

    async fn write(&self, payload: &CrmPayload) -> Result<String> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::crm(&self.system, "503 service unavailable", true));
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(format!("CRM_RECORD_{}", payload.idempotency_token))
    }
}

/// Platform bot whose SDK always reports DISCONNECTED after joining.
struct AlwaysDroppingBot {
    inner: MeetBot,
}

#[async_trait::async_trait]
impl PlatformBot for AlwaysDroppingBot {
    async fn authenticate(&self, credentials: &HashMap<String, String>) -> Result<()> {
        self.inner.authenticate(credentials).await
    }
    async fn join(&self, meeting_url: &str, session_id: &str) -> Result<()> {
        self.inner.join(meeting_url, session_id).await
    }
    async fn start_transcription(&self, session_id: &str) -> Result<String> {
        self.inner.start_transcription(session_id).await
    }
    async fn leave(&self, session_id: &str) -> Result<()> {
        self.inner.leave(session_id).await
    }
    async fn connection_status(&self, _session_id: &str) -> ConnectionStatus {
        ConnectionStatus::Disconnected
    }
    fn platform(&self) -> Platform {
        Platform::Meet
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Happy path: join, transcribe, stop, draft
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn happy_path_produces_ordered_transcript_and_confident_draft() {
    let state = build_state(
        fast_config(),
        PlatformRegistry::with_default_bots(),
        CrmRegistry::empty(),
    );
    let meeting_id = insert_meeting(&state);
    let (session_id, tid) =
        start_transcribing(&state, meeting_id, "https://meet.google.com/abc-defg-hij").await;

    for i in 0..3 {
        state
            .transcription
            .process_audio_chunk(&tid, vec![0u8; 300], i as f64 * 2.0, 2.0)
            .unwrap();
    }
    assert!(
        wait_for(
            || state.transcription.transcript_chunks(&tid, None).len() == 3,
            Duration::from_secs(5)
        )
        .await
    );

    let chunks = state.transcription.transcript_chunks(&tid, None);
    for pair in chunks.windows(2) {
        assert!(pair[0].start_time <= pair[1].start_time);
    }

    let summary = state.manager.stop(&session_id, "manual_stop").await.unwrap();
    assert_eq!(summary.status, SessionStatus::Completed);
    assert!(summary.audio_quality >= AudioQuality::Good);

    let draft_id = summary.draft_summary_id.expect("draft created");
    let draft = state.store.draft(draft_id).unwrap();
    assert!(draft.confidence_score >= 0.85);
    assert_eq!(draft.suggested_crm_updates.len(), 3);
    assert_eq!(
        state.store.meeting(meeting_id).unwrap().status,
        MeetingStatus::Completed
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backpressure: saturated queue, non-blocking producers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn backpressure_bounds_queue_and_never_fails_producers() {
    let mut config = fast_config();
    config.transcription.max_chunk_queue_size = 5;
    let state = build_state(
        config,
        PlatformRegistry::with_default_bots(),
        CrmRegistry::empty(),
    );
    let meeting_id = insert_meeting(&state);
    let (session_id, tid) =
        start_transcribing(&state, meeting_id, "https://meet.google.com/backpressure").await;

    for i in 0..12 {
        // No producer call may fail, no matter how far ahead of the
        // engine we run.
        state
            .transcription
            .process_audio_chunk(&tid, vec![0u8; 300], i as f64 * 2.0, 2.0)
            .unwrap();
    }

    assert!(
        wait_for(
            || state.transcription.transcript_chunks(&tid, None).len() >= 5,
            Duration::from_secs(5)
        )
        .await
    );

    let summary = state.manager.stop(&session_id, "manual_stop").await.unwrap();
    assert!(summary.transcript_length > 0);
    let processed = state.transcription.transcript_chunks(&tid, None).len();
    assert!((5..=12).contains(&processed));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recoverable disconnect: one drop, one bot-level reconnect
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn single_disconnect_reconnects_at_bot_level() {
    let mut config = fast_config();
    // Keep the session monitor slow so the shared connection monitor
    // owns the recovery.
    config.session.monitor_interval_s = 30;
    let meet = Arc::new(MeetBot::new());
    let mut platforms = PlatformRegistry::empty();
    platforms.register(meet.clone());
    let state = build_state(config, platforms, CrmRegistry::empty());

    let cancel = CancellationToken::new();
    spawn_connection_monitor(
        state.call_bots.clone(),
        Duration::from_millis(50),
        cancel.clone(),
    );

    let meeting_id = insert_meeting(&state);
    let (session_id, _tid) =
        start_transcribing(&state, meeting_id, "https://meet.google.com/drop-once").await;
    let bot_id = state
        .manager
        .status(&session_id)
        .unwrap()
        .bot_session_id
        .unwrap();

    // One simulated drop at the SDK boundary.
    meet.sessions()
        .force_status(&bot_id, ConnectionStatus::Disconnected);

    assert!(
        wait_for(
            || {
                state
                    .call_bots
                    .session_status(&bot_id)
                    .map(|s| s.status == ConnectionStatus::Connected
                        && s.reconnect_attempts == 1)
                    .unwrap_or(false)
            },
            Duration::from_secs(5)
        )
        .await,
        "bot session should reconnect exactly once"
    );

    cancel.cancel();
    state.manager.stop(&session_id, "manual_stop").await.unwrap();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persistent drops: reconnect budget exhausted, session fails
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn persistent_disconnects_exhaust_budget_and_fail_session() {
    let mut config = fast_config();
    config.session.max_reconnect_attempts = 2;
    let mut platforms = PlatformRegistry::empty();
    platforms.register(Arc::new(AlwaysDroppingBot {
        inner: MeetBot::new(),
    }));
    let state = build_state(config, platforms, CrmRegistry::empty());

    let meeting_id = insert_meeting(&state);
    let (session_id, _tid) =
        start_transcribing(&state, meeting_id, "https://meet.google.com/always-down").await;
    let bot_id = state
        .manager
        .status(&session_id)
        .unwrap()
        .bot_session_id
        .unwrap();

    // Start probing only once the pipeline is up, so the budget burns on
    // the scripted drops rather than a join race.
    let cancel = CancellationToken::new();
    spawn_connection_monitor(
        state.call_bots.clone(),
        Duration::from_millis(50),
        cancel.clone(),
    );

    // The monitor burns both reconnect attempts, then marks the bot
    // session errored; the session manager then fails the call session.
    assert!(
        wait_for(
            || {
                state
                    .manager
                    .status(&session_id)
                    .map(|s| s.status == SessionStatus::Failed)
                    .unwrap_or(false)
            },
            Duration::from_secs(10)
        )
        .await,
        "session should fail after budget exhaustion"
    );

    let live = state.manager.status(&session_id).unwrap();
    assert!(live
        .last_error
        .unwrap()
        .contains("Max reconnection attempts"));

    let bot = state.call_bots.session_status(&bot_id).unwrap();
    assert_eq!(bot.reconnect_attempts, 2);
    assert_eq!(
        bot.error_message.as_deref(),
        Some("Max reconnection attempts exceeded")
    );

    cancel.cancel();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation gate: pending review blocks CRM writes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn pending_validation_blocks_crm_sync() {
    let crm_connector = Arc::new(ScriptedCrm::new("salesforce", 0));
    let mut crm = CrmRegistry::empty();
    crm.register(crm_connector.clone());
    let state = build_state(fast_config(), PlatformRegistry::with_default_bots(), crm);

    let meeting_id = insert_meeting(&state);
    let (session_id, tid) =
        start_transcribing(&state, meeting_id, "https://meet.google.com/gate").await;
    state
        .transcription
        .process_audio_chunk(&tid, vec![0u8; 300], 0.0, 2.0)
        .unwrap();
    wait_for(
        || !state.transcription.transcript_chunks(&tid, None).is_empty(),
        Duration::from_secs(5),
    )
    .await;
    let summary = state.manager.stop(&session_id, "manual_stop").await.unwrap();
    let draft = state.store.draft(summary.draft_summary_id.unwrap()).unwrap();

    // Validation session exists but is still pending.
    let validation = state
        .validation
        .create_session(&draft, "sales@ourcompany.com")
        .unwrap();

    let err = state
        .crm_sync
        .sync(&validation, &draft, "salesforce")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ValidationGate(_)));
    assert!(state.crm_sync.records_for_validation(validation.id).is_empty());
    assert_eq!(crm_connector.creates.load(Ordering::SeqCst), 0);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CRM idempotency: retries never duplicate objects
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn transient_crm_failure_retries_without_duplicates() {
    let crm_connector = Arc::new(ScriptedCrm::new("salesforce", 1));
    let mut crm = CrmRegistry::empty();
    crm.register(crm_connector.clone());
    let mut config = fast_config();
    config.crm.retry_delay_base_s = 0;
    let state = build_state(config, PlatformRegistry::with_default_bots(), crm);

    let meeting_id = insert_meeting(&state);
    let (session_id, tid) =
        start_transcribing(&state, meeting_id, "https://meet.google.com/idem").await;
    state
        .transcription
        .process_audio_chunk(&tid, vec![0u8; 300], 0.0, 2.0)
        .unwrap();
    wait_for(
        || !state.transcription.transcript_chunks(&tid, None).is_empty(),
        Duration::from_secs(5),
    )
    .await;
    let summary = state.manager.stop(&session_id, "manual_stop").await.unwrap();
    let draft = state.store.draft(summary.draft_summary_id.unwrap()).unwrap();

    let validation = complete_validation(&state, draft.id);

    // First sync: one 503, then success.
    let record = state
        .crm_sync
        .sync(&validation, &draft, "salesforce")
        .await
        .unwrap();
    assert_eq!(record.sync_status, SyncStatus::Completed);
    assert_eq!(record.attempts, 2);
    assert_eq!(crm_connector.creates.load(Ordering::SeqCst), 1);

    // Re-running the same pair is a no-op.
    let again = state
        .crm_sync
        .sync(&validation, &draft, "salesforce")
        .await
        .unwrap();
    assert_eq!(again.crm_record_id, record.crm_record_id);
    assert_eq!(crm_connector.creates.load(Ordering::SeqCst), 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Full workflow: end-to-end through validation questions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn complete_workflow_from_join_to_crm_sync() {
    let crm_connector = Arc::new(ScriptedCrm::new("salesforce", 0));
    let hubspot = Arc::new(ScriptedCrm::new("hubspot", 0));
    let creatio = Arc::new(ScriptedCrm::new("creatio", 0));
    let mut crm = CrmRegistry::empty();
    crm.register(crm_connector.clone());
    crm.register(hubspot.clone());
    crm.register(creatio.clone());
    let state = build_state(fast_config(), PlatformRegistry::with_default_bots(), crm);

    let meeting_id = insert_meeting(&state);
    let (session_id, tid) =
        start_transcribing(&state, meeting_id, "https://meet.google.com/full-flow").await;

    for i in 0..4 {
        state
            .transcription
            .process_audio_chunk(&tid, vec![0u8; 300], i as f64 * 2.0, 2.0)
            .unwrap();
    }
    wait_for(
        || state.transcription.transcript_chunks(&tid, None).len() == 4,
        Duration::from_secs(5),
    )
    .await;

    let summary = state.manager.stop(&session_id, "external_end").await.unwrap();
    let draft = state.store.draft(summary.draft_summary_id.unwrap()).unwrap();

    // Questions cover all three categories.
    let validation = state
        .validation
        .create_session(&draft, "sales@ourcompany.com")
        .unwrap();
    let kinds: Vec<QuestionType> = validation
        .questions
        .iter()
        .map(|q| q.question_type)
        .collect();
    assert!(kinds.contains(&QuestionType::Confirmation));
    assert!(kinds.contains(&QuestionType::ActionItemsReview));
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == QuestionType::CrmApproval)
            .count(),
        3
    );

    let completed = complete_validation(&state, draft.id);
    assert!(completed.is_completed());
    assert_eq!(completed.approved_crm_updates.as_ref().unwrap().len(), 3);

    let results = state.crm_sync.sync_all(&completed, &draft).await;
    assert_eq!(results.len(), 3);
    for (_system, result) in &results {
        assert_eq!(result.as_ref().unwrap().sync_status, SyncStatus::Completed);
    }
    assert_eq!(crm_connector.creates.load(Ordering::SeqCst), 1);
    assert_eq!(hubspot.creates.load(Ordering::SeqCst), 1);
    assert_eq!(creatio.creates.load(Ordering::SeqCst), 1);

    // Cascade delete tears down the whole ownership chain; the lead is
    // referenced, not owned, so it survives by construction.
    let draft_ids = state.store.delete_meeting(meeting_id).unwrap();
    for draft_id in draft_ids {
        for validation_id in state.validation.delete_for_draft(draft_id) {
            state.crm_sync.delete_for_validation(validation_id);
        }
    }
    assert!(state.store.meeting(meeting_id).is_none());
    assert_eq!(state.validation.len(), 0);
    assert_eq!(state.crm_sync.record_count(), 0);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation expiry blocks sync
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn expired_validation_blocks_sync_forever() {
    let crm_connector = Arc::new(ScriptedCrm::new("salesforce", 0));
    let mut crm = CrmRegistry::empty();
    crm.register(crm_connector.clone());
    let mut config = fast_config();
    config.validation.expiry_s = 0;
    let state = build_state(config, PlatformRegistry::with_default_bots(), crm);

    let meeting_id = insert_meeting(&state);
    let (session_id, tid) =
        start_transcribing(&state, meeting_id, "https://meet.google.com/expiry").await;
    state
        .transcription
        .process_audio_chunk(&tid, vec![0u8; 300], 0.0, 2.0)
        .unwrap();
    wait_for(
        || !state.transcription.transcript_chunks(&tid, None).is_empty(),
        Duration::from_secs(5),
    )
    .await;
    let summary = state.manager.stop(&session_id, "manual_stop").await.unwrap();
    let draft = state.store.draft(summary.draft_summary_id.unwrap()).unwrap();

    let validation = state
        .validation
        .create_session(&draft, "sales@ourcompany.com")
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Completion is no longer possible, and the sweep marks it expired.
    assert!(state.validation.complete(validation.id).is_err());
    state.validation.expire_overdue();
    let expired = state.validation.get(validation.id).unwrap();
    let err = state
        .crm_sync
        .sync(&expired, &draft, "salesforce")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ValidationGate(_)));
    assert_eq!(crm_connector.creates.load(Ordering::SeqCst), 0);
}
