//! The call-session lifecycle manager.
//!
//! One worker task per active session owns the state machine and is the
//! sole mutator of its state: join → connect → transcribe → disconnect
//! recovery, partial-transcript persistence, timeout forcing, and the
//! final teardown that produces the cached session summary.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use cs_domain::config::SessionConfig;
use cs_domain::error::{Error, Result};
use cs_domain::trace::TraceEvent;
use cs_domain::types::ConnectionStatus;
use cs_platforms::service::MAX_RECONNECT_MESSAGE;
use cs_platforms::CallBotService;
use cs_summary::SummaryGenerator;
use cs_transcription::TranscriptionService;

use crate::events::{EventBus, EventKind};
use crate::state::{CallSessionConfig, CallSessionState, SessionStatus, SessionSummary};
use crate::store::MeetingStore;

struct Shared {
    state: CallSessionState,
    /// Byte offset of the current transcription session already flushed
    /// to the store. Resets when a new transcription session starts.
    flushed_offset: usize,
    finalized: bool,
}

struct SessionHandle {
    config: CallSessionConfig,
    shared: Mutex<Shared>,
    cancel: CancellationToken,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SessionHandle {
    fn snapshot(&self) -> CallSessionState {
        self.shared.lock().state.clone()
    }
}

pub struct CallSessionManager {
    call_bots: Arc<CallBotService>,
    transcription: Arc<TranscriptionService>,
    summaries: Arc<SummaryGenerator>,
    store: Arc<MeetingStore>,
    events: Arc<EventBus>,
    defaults: SessionConfig,
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    completed: RwLock<HashMap<String, SessionSummary>>,
    /// Self-reference handed to spawned lifecycle workers.
    self_ref: Weak<CallSessionManager>,
}

impl CallSessionManager {
    pub fn new(
        call_bots: Arc<CallBotService>,
        transcription: Arc<TranscriptionService>,
        summaries: Arc<SummaryGenerator>,
        store: Arc<MeetingStore>,
        events: Arc<EventBus>,
        defaults: SessionConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            call_bots,
            transcription,
            summaries,
            store,
            events,
            defaults,
            sessions: RwLock::new(HashMap::new()),
            completed: RwLock::new(HashMap::new()),
            self_ref: weak.clone(),
        })
    }

    fn arc(&self) -> Arc<Self> {
        self.self_ref.upgrade().expect("manager outlives its workers")
    }

    pub fn defaults(&self) -> &SessionConfig {
        &self.defaults
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &Arc<MeetingStore> {
        &self.store
    }

    pub fn transcription(&self) -> &Arc<TranscriptionService> {
        &self.transcription
    }

    pub fn summaries(&self) -> &Arc<SummaryGenerator> {
        &self.summaries
    }

    /// Start a call session: validates the meeting, registers the
    /// session, and kicks off the state-machine worker.
    pub fn start(&self, config: CallSessionConfig) -> Result<CallSessionState> {
        if self.store.meeting(config.meeting_id).is_none() {
            return Err(Error::Validation(format!(
                "meeting {} not found",
                config.meeting_id
            )));
        }

        let mut sessions = self.sessions.write();
        let duplicate = sessions.values().any(|handle| {
            let shared = handle.shared.lock();
            handle.config.meeting_id == config.meeting_id
                && !shared.state.status.is_terminal()
        });
        if duplicate {
            return Err(Error::Validation(format!(
                "an active session already exists for meeting {}",
                config.meeting_id
            )));
        }

        let session_id = format!("call_session_{}", Uuid::new_v4().simple());
        let handle = Arc::new(SessionHandle {
            shared: Mutex::new(Shared {
                state: CallSessionState::new(session_id.clone(), config.meeting_id),
                flushed_offset: 0,
                finalized: false,
            }),
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
            config,
        });
        sessions.insert(session_id.clone(), handle.clone());
        drop(sessions);

        let _ = self
            .store
            .advance_meeting_status(handle.config.meeting_id, cs_domain::types::MeetingStatus::InProgress);

        let worker = tokio::spawn(run_lifecycle(self.arc(), handle.clone()));
        *handle.worker.lock() = Some(worker);

        TraceEvent::SessionStarted {
            session_id: session_id.clone(),
            meeting_id: handle.config.meeting_id.to_string(),
            platform: handle
                .config
                .platform
                .map(|p| p.to_string())
                .unwrap_or_else(|| "auto".into()),
        }
        .emit();
        self.events.emit(
            EventKind::SessionStarted,
            &session_id,
            SessionStatus::Initializing,
            None,
        );
        tracing::info!(session_id = %session_id, meeting_id = %handle.config.meeting_id, "call session started");

        Ok(handle.snapshot())
    }

    /// Gracefully stop a session. Idempotent: repeated stops return the
    /// cached summary of the first.
    pub async fn stop(&self, session_id: &str, reason: &str) -> Result<SessionSummary> {
        if let Some(summary) = self.completed.read().get(session_id) {
            return Ok(summary.clone());
        }

        let Some(handle) = self.sessions.read().get(session_id).cloned() else {
            // The session may have finalized between the two lookups.
            if let Some(summary) = self.completed.read().get(session_id) {
                return Ok(summary.clone());
            }
            return Err(Error::Validation(format!(
                "call session {session_id} not found"
            )));
        };

        {
            let mut shared = handle.shared.lock();
            if shared.state.stop_reason.is_none() {
                shared.state.stop_reason = Some(reason.to_string());
            }
            if !shared.state.status.is_terminal() {
                set_status(&mut shared.state, SessionStatus::Completed);
            }
        }
        handle.cancel.cancel();

        let worker = handle.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }

        // The worker finalizes completed sessions on its way out; failed
        // sessions (and lost workers) are finalized here.
        if let Some(summary) = self.completed.read().get(session_id) {
            return Ok(summary.clone());
        }
        Ok(self.finalize(&handle).await)
    }

    /// Retry a failed session. Only legal from FAILED; the lifecycle
    /// loop owns recovery from DISCONNECTED.
    pub fn retry(&self, session_id: &str) -> Result<CallSessionState> {
        let handle = self
            .sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("call session {session_id} not found")))?;

        {
            let mut shared = handle.shared.lock();
            if shared.state.status != SessionStatus::Failed {
                return Err(Error::Validation(format!(
                    "call session {session_id} is {}, retry requires failed",
                    shared.state.status.as_str()
                )));
            }
            shared.state.retry_count += 1;
            shared.state.last_error = None;
            shared.state.end_time = None;
            set_status(&mut shared.state, SessionStatus::Initializing);
        }

        let worker = tokio::spawn(run_lifecycle(self.arc(), handle.clone()));
        *handle.worker.lock() = Some(worker);
        tracing::info!(session_id, "retrying failed call session");
        Ok(handle.snapshot())
    }

    /// Read-only snapshot of a live session.
    pub fn status(&self, session_id: &str) -> Option<CallSessionState> {
        self.sessions
            .read()
            .get(session_id)
            .map(|handle| handle.snapshot())
    }

    /// Cached summary of a stopped session.
    pub fn summary(&self, session_id: &str) -> Option<SessionSummary> {
        self.completed.read().get(session_id).cloned()
    }

    pub fn list_active(&self) -> Vec<CallSessionState> {
        self.sessions
            .read()
            .values()
            .map(|handle| handle.snapshot())
            .collect()
    }

    /// Stop every live session. Used on shutdown.
    pub async fn cleanup(&self) {
        let ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.stop(&id, "cleanup").await {
                tracing::error!(session_id = %id, error = %e, "cleanup stop failed");
            }
        }
    }

    /// One-time teardown: leave the meeting, stop transcription, flush
    /// the final transcript, generate the draft summary, cache the
    /// session summary, and drop the session from the registry.
    async fn finalize(&self, handle: &Arc<SessionHandle>) -> SessionSummary {
        // Exactly-once guard: the loser of a finalize race waits for the
        // winner's cached summary instead of tearing down twice.
        loop {
            let session_id = {
                let mut shared = handle.shared.lock();
                if !shared.finalized {
                    shared.finalized = true;
                    if shared.state.end_time.is_none() {
                        shared.state.end_time = Some(Utc::now());
                    }
                    break;
                }
                shared.state.session_id.clone()
            };
            if let Some(summary) = self.completed.read().get(&session_id) {
                return summary.clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let (session_id, status, bot_session_id, bot_record_id, transcription_session_id) = {
            let shared = handle.shared.lock();
            (
                shared.state.session_id.clone(),
                shared.state.status,
                shared.state.bot_session_id.clone(),
                shared.state.bot_record_id,
                shared.state.transcription_session_id.clone(),
            )
        };

        // Final transcript flush, then stop the transcription workers.
        if let Some(tid) = &transcription_session_id {
            self.flush_partial(handle);
            if let Err(e) = self.transcription.stop_session(tid).await {
                tracing::warn!(session_id = %session_id, error = %e, "error stopping transcription");
            }
        }

        // Leave the meeting.
        if let Some(bot_id) = &bot_session_id {
            match self.call_bots.end_session(bot_id).await {
                Ok(bot_summary) => {
                    if let Some(record_id) = bot_record_id {
                        let _ = self.store.update_bot_session(record_id, |s| {
                            s.connection_status = ConnectionStatus::Disconnected;
                            s.leave_time = Some(Utc::now());
                            s.reconnect_attempts = bot_summary.reconnect_attempts;
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "error leaving meeting");
                }
            }
            self.call_bots.remove_session(bot_id);
        }

        // Draft summary, only for completed sessions with a transcript.
        // An engine failure here is fatal to the draft, not the stop.
        let mut draft_summary_id = None;
        if status == SessionStatus::Completed {
            if let Some(record_id) = bot_record_id {
                if let Some(record) = self.store.bot_session(record_id) {
                    match self.summaries.generate_draft(&record).await {
                        Ok(Some(draft)) => {
                            draft_summary_id = Some(draft.id);
                            self.store.insert_draft(draft);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::error!(
                                session_id = %session_id,
                                error = %e,
                                "draft summary generation failed"
                            );
                        }
                    }
                }
            }
            let _ = self.store.advance_meeting_status(
                handle.config.meeting_id,
                cs_domain::types::MeetingStatus::Completed,
            );
        } else {
            let _ = self.store.advance_meeting_status(
                handle.config.meeting_id,
                cs_domain::types::MeetingStatus::Failed,
            );
        }

        let summary = {
            let shared = handle.shared.lock();
            let state = &shared.state;
            let transcript_length = bot_record_id
                .and_then(|id| self.store.bot_session(id))
                .map(|s| s.raw_transcript.len())
                .unwrap_or(0);
            SessionSummary {
                session_id: state.session_id.clone(),
                meeting_id: state.meeting_id,
                status: state.status,
                duration_s: state
                    .end_time
                    .map(|end| (end - state.started_at).num_milliseconds() as f64 / 1000.0)
                    .unwrap_or(0.0),
                retry_count: state.retry_count,
                error_count: state.error_count,
                reason: state
                    .stop_reason
                    .clone()
                    .unwrap_or_else(|| "completed".into()),
                transcript_length,
                audio_quality: state.audio_quality,
                draft_summary_id,
            }
        };

        self.completed
            .write()
            .insert(session_id.clone(), summary.clone());
        self.sessions.write().remove(&session_id);

        TraceEvent::SessionStopped {
            session_id: session_id.clone(),
            reason: summary.reason.clone(),
            duration_s: summary.duration_s,
            transcript_chars: summary.transcript_length,
        }
        .emit();
        self.events.emit(
            EventKind::SessionStopped,
            &session_id,
            summary.status,
            Some(summary.reason.clone()),
        );
        tracing::info!(
            session_id = %session_id,
            reason = %summary.reason,
            transcript_chars = summary.transcript_length,
            "call session stopped"
        );

        summary
    }

    /// Persist any new transcript bytes and the current speaker map and
    /// audio quality. Append-only: only the unflushed suffix is written.
    fn flush_partial(&self, handle: &Arc<SessionHandle>) {
        if !handle.config.save_partial_transcripts {
            return;
        }
        let (tid, record_id, offset) = {
            let shared = handle.shared.lock();
            (
                shared.state.transcription_session_id.clone(),
                shared.state.bot_record_id,
                shared.flushed_offset,
            )
        };
        let (Some(tid), Some(record_id)) = (tid, record_id) else {
            return;
        };

        let full = self.transcription.full_transcript(&tid);
        if full.len() > offset {
            let mut suffix = full[offset..].to_string();
            // First flush of a reconnected stream: keep a word boundary
            // against whatever the previous stream persisted.
            if offset == 0
                && self
                    .store
                    .bot_session(record_id)
                    .is_some_and(|s| !s.raw_transcript.is_empty())
            {
                suffix.insert(0, ' ');
            }
            if let Err(e) = self.store.append_transcript(record_id, &suffix) {
                tracing::error!(error = %e, "partial transcript flush failed");
                return;
            }
            let mut shared = handle.shared.lock();
            shared.flushed_offset = full.len();
            shared.state.partial_transcript_len += suffix.len();
        }

        let speakers = self.transcription.speaker_mapping(&tid);
        if !speakers.is_empty() {
            let _ = self.store.set_speakers(record_id, speakers);
        }
        if let Some(snapshot) = self.transcription.session_status(&tid) {
            let mut shared = handle.shared.lock();
            shared.state.audio_quality = snapshot.audio_quality;
            drop(shared);
            let _ = self
                .store
                .update_bot_session(record_id, |s| s.audio_quality = snapshot.audio_quality);
        }
    }
}

fn set_status(state: &mut CallSessionState, to: SessionStatus) {
    if state.status != to {
        TraceEvent::SessionStateChanged {
            session_id: state.session_id.clone(),
            from: state.status.as_str().to_string(),
            to: to.as_str().to_string(),
        }
        .emit();
        state.status = to;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lifecycle worker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_lifecycle(manager: Arc<CallSessionManager>, handle: Arc<SessionHandle>) {
    let session_id = handle.shared.lock().state.session_id.clone();
    let tick = Duration::from_millis(handle.config.tick_interval_ms.max(10));

    loop {
        if handle.cancel.is_cancelled() {
            break;
        }

        let status = {
            let shared = handle.shared.lock();
            shared.state.status
        };
        if status.is_terminal() {
            break;
        }

        // Hard wall-clock cap: force a graceful completion.
        let elapsed = {
            let shared = handle.shared.lock();
            (Utc::now() - shared.state.started_at).num_seconds()
        };
        if elapsed >= handle.config.session_timeout_s as i64 {
            tracing::warn!(session_id = %session_id, "session timed out");
            let mut shared = handle.shared.lock();
            if shared.state.stop_reason.is_none() {
                shared.state.stop_reason = Some("timeout".into());
            }
            set_status(&mut shared.state, SessionStatus::Completed);
            break;
        }

        match status {
            SessionStatus::Initializing => {
                // Collaborators are injected pre-initialized; this step
                // exists so a retried session re-enters through the top.
                let mut shared = handle.shared.lock();
                set_status(&mut shared.state, SessionStatus::Joining);
                drop(shared);
                manager.events.emit(
                    EventKind::SessionInitialized,
                    &session_id,
                    SessionStatus::Joining,
                    None,
                );
            }
            SessionStatus::Joining => {
                if let Err(e) = step_join(&manager, &handle).await {
                    handle_error(&manager, &handle, e);
                }
            }
            SessionStatus::Connected => {
                // A transcription start error is not recoverable.
                if let Err(e) = step_start_transcription(&manager, &handle).await {
                    fail_session(&manager, &handle, &e.to_string());
                }
            }
            SessionStatus::Transcribing => {
                if let Err(e) = step_monitor(&manager, &handle).await {
                    handle_error(&manager, &handle, e);
                }
            }
            SessionStatus::Disconnected => {
                step_reconnect(&manager, &handle).await;
            }
            SessionStatus::Completed | SessionStatus::Failed => break,
        }

        tokio::select! {
            _ = handle.cancel.cancelled() => break,
            _ = tokio::time::sleep(tick) => {}
        }
    }

    let status = handle.shared.lock().state.status;
    match status {
        SessionStatus::Completed => {
            manager.finalize(&handle).await;
        }
        SessionStatus::Failed => {
            // Failed sessions stay registered so a caller can retry;
            // persist what we have.
            manager.flush_partial(&handle);
            tracing::debug!(session_id = %session_id, "lifecycle worker exited in failed state");
        }
        _ => {
            // Cancelled mid-flight by stop(), which drives finalize.
            tracing::debug!(session_id = %session_id, "lifecycle worker cancelled");
        }
    }
}

async fn step_join(
    manager: &Arc<CallSessionManager>,
    handle: &Arc<SessionHandle>,
) -> Result<()> {
    let (session_id, previous_bot) = {
        let mut shared = handle.shared.lock();
        (
            shared.state.session_id.clone(),
            shared.state.bot_session_id.take(),
        )
    };
    tracing::info!(session_id = %session_id, "joining meeting");

    // Drop any bot session left over from a failed attempt.
    if let Some(old_bot) = previous_bot {
        manager.call_bots.remove_session(&old_bot);
    }

    let bot = manager
        .call_bots
        .join_meeting(&handle.config.meeting_url, handle.config.platform)
        .await?;

    let record = manager.store.create_bot_session(
        handle.config.meeting_id,
        &bot.session_id,
        bot.platform,
        bot.join_time,
    )?;

    {
        let mut shared = handle.shared.lock();
        shared.state.bot_session_id = Some(bot.session_id.clone());
        shared.state.bot_record_id = Some(record.id);
        shared.state.join_time = bot.join_time;
        set_status(&mut shared.state, SessionStatus::Connected);
    }

    TraceEvent::MeetingJoined {
        session_id: session_id.clone(),
        platform: bot.platform.to_string(),
        bot_session_id: bot.session_id,
    }
    .emit();
    manager.events.emit(
        EventKind::MeetingJoined,
        &session_id,
        SessionStatus::Connected,
        None,
    );
    Ok(())
}

async fn step_start_transcription(
    manager: &Arc<CallSessionManager>,
    handle: &Arc<SessionHandle>,
) -> Result<()> {
    let (session_id, bot_session_id, attempt) = {
        let shared = handle.shared.lock();
        (
            shared.state.session_id.clone(),
            shared.state.bot_session_id.clone(),
            shared.state.retry_count,
        )
    };

    if !handle.config.auto_transcribe {
        let mut shared = handle.shared.lock();
        set_status(&mut shared.state, SessionStatus::Transcribing);
        return Ok(());
    }

    let bot_session_id = bot_session_id
        .ok_or_else(|| Error::Other("connected session has no bot session".into()))?;

    // A retried session may still hold the transcription session of the
    // failed attempt; stop it before starting a fresh one.
    let stale = handle.shared.lock().state.transcription_session_id.take();
    if let Some(stale_tid) = stale {
        if let Err(e) = manager.transcription.stop_session(&stale_tid).await {
            tracing::debug!(error = %e, "stopping stale transcription session");
        }
    }

    let stream = manager.call_bots.start_transcription(&bot_session_id).await?;

    // Each (re)connection gets its own transcription session so a stale
    // one never accumulates chunks from two streams.
    let transcription_id = format!("{session_id}_t{attempt}");
    manager
        .transcription
        .start_session(&transcription_id, &stream.stream_id)?;

    {
        let mut shared = handle.shared.lock();
        shared.state.transcription_session_id = Some(transcription_id);
        shared.flushed_offset = 0;
        set_status(&mut shared.state, SessionStatus::Transcribing);
    }
    if let Some(record_id) = handle.shared.lock().state.bot_record_id {
        let _ = manager
            .store
            .update_bot_session(record_id, |s| {
                s.connection_status = ConnectionStatus::Transcribing
            });
    }
    manager.events.emit(
        EventKind::TranscriptionStarted,
        &session_id,
        SessionStatus::Transcribing,
        None,
    );
    Ok(())
}

/// One monitoring pass: bot health, partial persistence, natural end.
async fn step_monitor(
    manager: &Arc<CallSessionManager>,
    handle: &Arc<SessionHandle>,
) -> Result<()> {
    let (session_id, bot_session_id, bot_record_id) = {
        let shared = handle.shared.lock();
        (
            shared.state.session_id.clone(),
            shared.state.bot_session_id.clone(),
            shared.state.bot_record_id,
        )
    };

    if let Some(bot_id) = &bot_session_id {
        if let Some(bot) = manager.call_bots.session_status(bot_id) {
            if let Some(record_id) = bot_record_id {
                let _ = manager.store.update_bot_session(record_id, |s| {
                    s.reconnect_attempts = bot.reconnect_attempts
                });
            }
            match bot.status {
                ConnectionStatus::Error => {
                    let message = bot
                        .error_message
                        .unwrap_or_else(|| "bot session error".into());
                    fail_session(manager, handle, &message);
                    return Ok(());
                }
                ConnectionStatus::Disconnected => {
                    tracing::warn!(session_id = %session_id, "bot lost, entering reconnect");
                    let mut shared = handle.shared.lock();
                    set_status(&mut shared.state, SessionStatus::Disconnected);
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    manager.flush_partial(handle);

    // Natural end: the scheduled meeting window elapsed.
    if let Some(meeting) = manager.store.meeting(handle.config.meeting_id) {
        if Utc::now() >= meeting.end_time {
            tracing::info!(session_id = %session_id, "meeting end time reached");
            let mut shared = handle.shared.lock();
            if shared.state.stop_reason.is_none() {
                shared.state.stop_reason = Some("meeting_end".into());
            }
            set_status(&mut shared.state, SessionStatus::Completed);
            return Ok(());
        }
    }

    tokio::select! {
        _ = handle.cancel.cancelled() => {}
        _ = tokio::time::sleep(Duration::from_secs(handle.config.monitor_interval_s.max(1))) => {}
    }
    Ok(())
}

/// Reconnect after a lost bot: spend one unit of retry budget, back off
/// exponentially, and re-enter JOINING with fresh bot and transcription
/// sessions.
async fn step_reconnect(manager: &Arc<CallSessionManager>, handle: &Arc<SessionHandle>) {
    manager.flush_partial(handle);

    let (session_id, retry_count, old_bot, old_transcription) = {
        let shared = handle.shared.lock();
        (
            shared.state.session_id.clone(),
            shared.state.retry_count,
            shared.state.bot_session_id.clone(),
            shared.state.transcription_session_id.clone(),
        )
    };

    if retry_count >= handle.config.max_retry_attempts {
        fail_session(manager, handle, MAX_RECONNECT_MESSAGE);
        return;
    }

    let attempt = retry_count + 1;
    let delay_s = handle.config.reconnect_delay_base_s.pow(attempt);
    TraceEvent::SessionReconnecting {
        session_id: session_id.clone(),
        attempt,
        delay_s,
    }
    .emit();
    manager.events.emit(
        EventKind::SessionReconnecting,
        &session_id,
        SessionStatus::Disconnected,
        Some(format!("attempt {attempt}")),
    );
    tracing::info!(session_id = %session_id, attempt, delay_s, "reconnecting session");

    tokio::select! {
        _ = handle.cancel.cancelled() => return,
        _ = tokio::time::sleep(Duration::from_secs(delay_s)) => {}
    }

    // Tear down the lost attempt before rejoining.
    if let Some(tid) = old_transcription {
        if let Err(e) = manager.transcription.stop_session(&tid).await {
            tracing::debug!(error = %e, "stopping stale transcription session");
        }
    }
    if let Some(bot_id) = old_bot {
        manager.call_bots.remove_session(&bot_id);
    }

    let mut shared = handle.shared.lock();
    shared.state.retry_count = attempt;
    shared.state.bot_session_id = None;
    shared.state.transcription_session_id = None;
    set_status(&mut shared.state, SessionStatus::Joining);
}

/// Route a step error: recoverable errors take the DISCONNECTED path,
/// everything else fails the session. The reconnect step owns the retry
/// budget, so exhaustion always fails with its canonical message.
fn handle_error(manager: &Arc<CallSessionManager>, handle: &Arc<SessionHandle>, error: Error) {
    let session_id = {
        let mut shared = handle.shared.lock();
        shared.state.error_count += 1;
        shared.state.last_error = Some(error.to_string());
        shared.state.session_id.clone()
    };
    tracing::error!(session_id = %session_id, error = %error, "session step failed");
    manager.flush_partial(handle);

    if error.is_recoverable() {
        let mut shared = handle.shared.lock();
        set_status(&mut shared.state, SessionStatus::Disconnected);
        drop(shared);
        manager.events.emit(
            EventKind::SessionErrorRecoverable,
            &session_id,
            SessionStatus::Disconnected,
            Some(error.to_string()),
        );
    } else {
        fail_session(manager, handle, &error.to_string());
    }
}

fn fail_session(manager: &Arc<CallSessionManager>, handle: &Arc<SessionHandle>, message: &str) {
    let session_id = {
        let mut shared = handle.shared.lock();
        shared.state.last_error = Some(message.to_string());
        set_status(&mut shared.state, SessionStatus::Failed);
        shared.state.session_id.clone()
    };
    if let Some(record_id) = handle.shared.lock().state.bot_record_id {
        let _ = manager.store.update_bot_session(record_id, |s| {
            s.connection_status = ConnectionStatus::Error;
            s.error_message = Some(message.to_string());
        });
    }
    manager.events.emit(
        EventKind::SessionErrorFatal,
        &session_id,
        SessionStatus::Failed,
        Some(message.to_string()),
    );
    tracing::error!(session_id = %session_id, error = message, "session failed");
}
