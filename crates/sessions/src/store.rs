//! Meeting store.
//!
//! Persists meetings, their bot sessions, and draft summaries in
//! `meetings.json` under the configured state path. Ownership cascades:
//! deleting a meeting removes its bot session and draft summary (leads
//! are referenced, never owned).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cs_domain::error::{Error, Result};
use cs_domain::types::{
    AudioQuality, CallBotSession, ConnectionStatus, DraftSummary, Lead, Meeting, MeetingStatus,
    Platform, Speaker,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    /// Keyed by CRM lead id. Leads are referenced by meetings, never
    /// owned and never cascade-deleted.
    #[serde(default)]
    leads: HashMap<String, Lead>,
    meetings: HashMap<Uuid, Meeting>,
    bot_sessions: HashMap<Uuid, CallBotSession>,
    drafts: HashMap<Uuid, DraftSummary>,
}

pub struct MeetingStore {
    path: Option<PathBuf>,
    state: RwLock<StoreState>,
}

impl MeetingStore {
    /// In-memory store (tests, load-test harness).
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Load or create the store at `state_path/meetings.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let path = state_path.join("meetings.json");
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            StoreState::default()
        };
        tracing::info!(
            meetings = state.meetings.len(),
            bot_sessions = state.bot_sessions.len(),
            path = %path.display(),
            "meeting store loaded"
        );
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    /// Persist the current state to disk (no-op for in-memory stores).
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let state = self.state.read();
        let json = serde_json::to_string_pretty(&*state)?;
        std::fs::write(path, json).map_err(Error::Io)?;
        Ok(())
    }

    // ── Leads ────────────────────────────────────────────────────────

    /// Upsert a lead mirrored from the CRM. The pipeline reads leads for
    /// meeting matching; it never mutates their CRM-side attributes.
    pub fn upsert_lead(&self, lead: Lead) {
        self.state.write().leads.insert(lead.crm_id.clone(), lead);
    }

    pub fn lead(&self, crm_id: &str) -> Option<Lead> {
        self.state.read().leads.get(crm_id).cloned()
    }

    pub fn lead_by_email(&self, email: &str) -> Option<Lead> {
        self.state
            .read()
            .leads
            .values()
            .find(|l| l.email.as_deref() == Some(email))
            .cloned()
    }

    /// Attach a lead to a meeting by email match. Returns the matched
    /// lead.
    pub fn match_meeting_lead(&self, meeting_id: Uuid, email: &str) -> Result<Lead> {
        let mut state = self.state.write();
        let lead = state
            .leads
            .values()
            .find(|l| l.email.as_deref() == Some(email))
            .cloned()
            .ok_or_else(|| Error::Validation(format!("no lead with email {email}")))?;
        let meeting = state
            .meetings
            .get_mut(&meeting_id)
            .ok_or_else(|| Error::Validation(format!("meeting {meeting_id} not found")))?;
        meeting.lead_id = Some(lead.crm_id.clone());
        Ok(lead)
    }

    // ── Meetings ─────────────────────────────────────────────────────

    pub fn insert_meeting(&self, meeting: Meeting) -> Result<()> {
        let mut state = self.state.write();
        if state
            .meetings
            .values()
            .any(|m| m.calendar_event_id == meeting.calendar_event_id)
        {
            return Err(Error::Validation(format!(
                "meeting with calendar_event_id {} already exists",
                meeting.calendar_event_id
            )));
        }
        state.meetings.insert(meeting.id, meeting);
        Ok(())
    }

    pub fn meeting(&self, id: Uuid) -> Option<Meeting> {
        self.state.read().meetings.get(&id).cloned()
    }

    pub fn list_meetings(&self) -> Vec<Meeting> {
        self.state.read().meetings.values().cloned().collect()
    }

    /// Advance a meeting's status. Status only moves forward; terminal
    /// states never change.
    pub fn advance_meeting_status(&self, id: Uuid, status: MeetingStatus) -> Result<()> {
        let mut state = self.state.write();
        let meeting = state
            .meetings
            .get_mut(&id)
            .ok_or_else(|| Error::Validation(format!("meeting {id} not found")))?;

        let rank = |s: MeetingStatus| match s {
            MeetingStatus::Scheduled => 0,
            MeetingStatus::InProgress => 1,
            MeetingStatus::Completed | MeetingStatus::Failed => 2,
        };
        if rank(status) < rank(meeting.status)
            || (rank(meeting.status) == 2 && meeting.status != status)
        {
            tracing::debug!(
                meeting_id = %id,
                from = ?meeting.status,
                to = ?status,
                "ignoring backward meeting status transition"
            );
            return Ok(());
        }
        meeting.status = status;
        Ok(())
    }

    // ── Bot sessions ─────────────────────────────────────────────────

    /// Create the persisted bot-session record for a meeting. A meeting
    /// owns exactly one; re-starting replaces the prior record's live
    /// fields but keeps its transcript.
    pub fn create_bot_session(
        &self,
        meeting_id: Uuid,
        bot_session_id: &str,
        platform: Platform,
        join_time: Option<DateTime<Utc>>,
    ) -> Result<CallBotSession> {
        let mut state = self.state.write();
        if !state.meetings.contains_key(&meeting_id) {
            return Err(Error::Validation(format!("meeting {meeting_id} not found")));
        }

        if let Some(existing) = state
            .bot_sessions
            .values_mut()
            .find(|s| s.meeting_id == meeting_id)
        {
            existing.bot_session_id = bot_session_id.to_string();
            existing.platform = platform;
            existing.join_time = join_time;
            existing.leave_time = None;
            existing.connection_status = ConnectionStatus::Connected;
            existing.error_message = None;
            return Ok(existing.clone());
        }

        let session = CallBotSession {
            id: Uuid::new_v4(),
            meeting_id,
            bot_session_id: bot_session_id.to_string(),
            platform,
            join_time,
            leave_time: None,
            connection_status: ConnectionStatus::Connected,
            raw_transcript: String::new(),
            speaker_mapping: HashMap::new(),
            audio_quality: AudioQuality::Good,
            reconnect_attempts: 0,
            error_message: None,
        };
        state.bot_sessions.insert(session.id, session.clone());
        Ok(session)
    }

    pub fn bot_session(&self, id: Uuid) -> Option<CallBotSession> {
        self.state.read().bot_sessions.get(&id).cloned()
    }

    pub fn bot_session_for_meeting(&self, meeting_id: Uuid) -> Option<CallBotSession> {
        self.state
            .read()
            .bot_sessions
            .values()
            .find(|s| s.meeting_id == meeting_id)
            .cloned()
    }

    /// Apply a mutation to a bot session under the write lock.
    pub fn update_bot_session(
        &self,
        id: Uuid,
        mutate: impl FnOnce(&mut CallBotSession),
    ) -> Result<CallBotSession> {
        let mut state = self.state.write();
        let session = state
            .bot_sessions
            .get_mut(&id)
            .ok_or_else(|| Error::Validation(format!("bot session {id} not found")))?;
        mutate(session);
        Ok(session.clone())
    }

    /// Append-only transcript persistence: only the new suffix is ever
    /// written.
    pub fn append_transcript(&self, id: Uuid, new_suffix: &str) -> Result<usize> {
        if new_suffix.is_empty() {
            return Ok(0);
        }
        let mut state = self.state.write();
        let session = state
            .bot_sessions
            .get_mut(&id)
            .ok_or_else(|| Error::Validation(format!("bot session {id} not found")))?;
        session.raw_transcript.push_str(new_suffix);
        Ok(new_suffix.len())
    }

    pub fn set_speakers(&self, id: Uuid, speakers: HashMap<String, Speaker>) -> Result<()> {
        self.update_bot_session(id, |s| s.speaker_mapping = speakers)
            .map(|_| ())
    }

    // ── Draft summaries ──────────────────────────────────────────────

    pub fn insert_draft(&self, draft: DraftSummary) {
        self.state.write().drafts.insert(draft.id, draft);
    }

    pub fn draft(&self, id: Uuid) -> Option<DraftSummary> {
        self.state.read().drafts.get(&id).cloned()
    }

    pub fn draft_for_bot_session(&self, bot_session_id: Uuid) -> Option<DraftSummary> {
        self.state
            .read()
            .drafts
            .values()
            .find(|d| d.bot_session_id == bot_session_id)
            .cloned()
    }

    // ── Cascade delete ───────────────────────────────────────────────

    /// Delete a meeting and everything it owns. Returns the ids of the
    /// removed draft summaries so callers can cascade further (the
    /// validation and CRM layers own their own stores).
    pub fn delete_meeting(&self, id: Uuid) -> Result<Vec<Uuid>> {
        let mut state = self.state.write();
        state
            .meetings
            .remove(&id)
            .ok_or_else(|| Error::Validation(format!("meeting {id} not found")))?;

        let session_ids: Vec<Uuid> = state
            .bot_sessions
            .values()
            .filter(|s| s.meeting_id == id)
            .map(|s| s.id)
            .collect();
        for session_id in &session_ids {
            state.bot_sessions.remove(session_id);
        }

        let draft_ids: Vec<Uuid> = state
            .drafts
            .values()
            .filter(|d| session_ids.contains(&d.bot_session_id))
            .map(|d| d.id)
            .collect();
        for draft_id in &draft_ids {
            state.drafts.remove(draft_id);
        }

        tracing::info!(
            meeting_id = %id,
            bot_sessions = session_ids.len(),
            drafts = draft_ids.len(),
            "meeting deleted with cascade"
        );
        Ok(draft_ids)
    }

    /// Counts for the metrics endpoint.
    pub fn counts(&self) -> (usize, usize, usize) {
        let state = self.state.read();
        (
            state.meetings.len(),
            state.bot_sessions.len(),
            state.drafts.len(),
        )
    }
}
