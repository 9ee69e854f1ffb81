//! Call-session state types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cs_domain::config::SessionConfig;
use cs_domain::types::{AudioQuality, Platform};

/// Lifecycle status of one call session.
///
/// `Completed` and `Failed` are terminal; a `Failed` session may only be
/// revived through the caller-initiated retry operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initializing,
    Joining,
    Connected,
    Transcribing,
    Disconnected,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Joining => "joining",
            Self::Connected => "connected",
            Self::Transcribing => "transcribing",
            Self::Disconnected => "disconnected",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Per-session configuration. Operational knobs default from the global
/// [`SessionConfig`]; callers override per call where needed.
#[derive(Debug, Clone)]
pub struct CallSessionConfig {
    pub meeting_id: Uuid,
    pub meeting_url: String,
    /// Explicit platform override; `None` detects from the URL.
    pub platform: Option<Platform>,
    pub auto_transcribe: bool,
    pub save_partial_transcripts: bool,
    pub max_retry_attempts: u32,
    pub reconnect_delay_base_s: u64,
    pub session_timeout_s: u64,
    pub monitor_interval_s: u64,
    pub tick_interval_ms: u64,
}

impl CallSessionConfig {
    pub fn new(meeting_id: Uuid, meeting_url: impl Into<String>, defaults: &SessionConfig) -> Self {
        Self {
            meeting_id,
            meeting_url: meeting_url.into(),
            platform: None,
            auto_transcribe: true,
            save_partial_transcripts: true,
            max_retry_attempts: defaults.max_reconnect_attempts,
            reconnect_delay_base_s: defaults.reconnect_delay_base_s,
            session_timeout_s: defaults.session_timeout_s,
            monitor_interval_s: defaults.monitor_interval_s,
            tick_interval_ms: defaults.tick_interval_ms,
        }
    }
}

/// Point-in-time snapshot of a call session.
#[derive(Debug, Clone, Serialize)]
pub struct CallSessionState {
    pub session_id: String,
    pub meeting_id: Uuid,
    pub status: SessionStatus,
    pub bot_session_id: Option<String>,
    /// Store id of the persisted [`cs_domain::types::CallBotSession`].
    pub bot_record_id: Option<Uuid>,
    pub transcription_session_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub join_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub partial_transcript_len: usize,
    pub audio_quality: AudioQuality,
    pub stop_reason: Option<String>,
}

impl CallSessionState {
    pub fn new(session_id: String, meeting_id: Uuid) -> Self {
        Self {
            session_id,
            meeting_id,
            status: SessionStatus::Initializing,
            bot_session_id: None,
            bot_record_id: None,
            transcription_session_id: None,
            started_at: Utc::now(),
            join_time: None,
            end_time: None,
            retry_count: 0,
            error_count: 0,
            last_error: None,
            partial_transcript_len: 0,
            audio_quality: AudioQuality::Good,
            stop_reason: None,
        }
    }
}

/// Final summary of a stopped session. Cached so repeated stops return
/// the identical value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub meeting_id: Uuid,
    pub status: SessionStatus,
    pub duration_s: f64,
    pub retry_count: u32,
    pub error_count: u32,
    pub reason: String,
    pub transcript_length: usize,
    pub audio_quality: AudioQuality,
    pub draft_summary_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::Transcribing.is_terminal());
        assert!(!SessionStatus::Disconnected.is_terminal());
    }

    #[test]
    fn config_inherits_global_defaults() {
        let defaults = SessionConfig::default();
        let config = CallSessionConfig::new(
            Uuid::new_v4(),
            "https://meet.google.com/abc",
            &defaults,
        );
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.session_timeout_s, 7200);
        assert!(config.auto_transcribe);
        assert!(config.platform.is_none());
    }
}
