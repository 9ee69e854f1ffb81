use serde::Serialize;

/// Structured trace events emitted across all CallScribe crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionStarted {
        session_id: String,
        meeting_id: String,
        platform: String,
    },
    SessionStateChanged {
        session_id: String,
        from: String,
        to: String,
    },
    MeetingJoined {
        session_id: String,
        platform: String,
        bot_session_id: String,
    },
    TranscriptionStarted {
        session_id: String,
        stream_id: String,
    },
    SessionReconnecting {
        session_id: String,
        attempt: u32,
        delay_s: u64,
    },
    SessionStopped {
        session_id: String,
        reason: String,
        duration_s: f64,
        transcript_chars: usize,
    },
    ChunkDropped {
        session_id: String,
        queue_len: usize,
    },
    QualityChanged {
        session_id: String,
        quality: String,
    },
    DraftCreated {
        draft_id: String,
        bot_session_id: String,
        confidence: f64,
        processing_time_s: f64,
    },
    ValidationCreated {
        validation_session_id: String,
        draft_id: String,
        question_count: usize,
    },
    ValidationCompleted {
        validation_session_id: String,
        approved_systems: usize,
    },
    ValidationExpired {
        validation_session_id: String,
    },
    CrmSyncAttempt {
        validation_session_id: String,
        crm_system: String,
        attempt: u32,
    },
    CrmSyncCompleted {
        validation_session_id: String,
        crm_system: String,
        crm_record_id: String,
        attempts: u32,
    },
    CrmSyncFailed {
        validation_session_id: String,
        crm_system: String,
        attempts: u32,
        error: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "cs_event");
    }
}
