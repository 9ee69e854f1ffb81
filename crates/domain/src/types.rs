//! Core entities shared across the pipeline: meetings, bot sessions,
//! transcript chunks, speakers, and draft summaries.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Enums
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lifecycle status of a scheduled meeting. Only moves forward;
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Scheduled,
    InProgress,
    Completed,
    Failed,
}

/// Supported video-call platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Meet,
    Teams,
    Zoom,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meet => "meet",
            Self::Teams => "teams",
            Self::Zoom => "zoom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "meet" => Some(Self::Meet),
            "teams" => Some(Self::Teams),
            "zoom" => Some(Self::Zoom),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bot connection status as reported by a platform adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Transcribing,
    Reconnecting,
    Disconnected,
    Error,
}

/// Audio quality grade derived from rolling transcript confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Unusable,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl AudioQuality {
    /// Map a mean transcript confidence onto a quality grade.
    pub fn from_confidence(mean: f64) -> Self {
        if mean >= 0.90 {
            Self::Excellent
        } else if mean >= 0.80 {
            Self::Good
        } else if mean >= 0.60 {
            Self::Fair
        } else if mean >= 0.40 {
            Self::Poor
        } else {
            Self::Unusable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::Unusable => "unusable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    Host,
    Participant,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Leads and meetings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// CRM lead referenced by meetings. Never mutated by this pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub crm_id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// A scheduled calendar event. Created by the ingest layer; the pipeline
/// only advances `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: Uuid,
    pub calendar_event_id: String,
    #[serde(default)]
    pub lead_id: Option<String>,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub attendees: Vec<String>,
    pub status: MeetingStatus,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Audio and transcript
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A finite segment of audio awaiting transcription. In-memory only;
/// its lifetime is a bounded-queue entry.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub chunk_id: String,
    pub audio_bytes: Vec<u8>,
    /// Media-timeline offset in seconds.
    pub timestamp: f64,
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioChunk {
    pub fn new(chunk_id: impl Into<String>, audio_bytes: Vec<u8>, timestamp: f64, duration: f64) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            audio_bytes,
            timestamp,
            duration,
            sample_rate: 16_000,
            channels: 1,
        }
    }
}

/// An identified speaker within one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Speaker {
    pub speaker_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: SpeakerRole,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub voice_signature: Option<String>,
}

/// A transcribed segment. Ordered by production order within a session;
/// once `is_final` it is never revised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptChunk {
    pub chunk_id: String,
    pub text: String,
    pub speaker: Speaker,
    pub start_time: f64,
    pub end_time: f64,
    pub confidence: f64,
    pub is_final: bool,
    pub language: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Summaries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An action item extracted from the meeting transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub description: String,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub source_text: String,
}

/// Raw engine output for a meeting summary, before confidence adjustment
/// and CRM suggestion enrichment turn it into a [`DraftSummary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingSummary {
    pub summary_text: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub next_steps: Vec<String>,
    pub decisions: Vec<String>,
    pub confidence_score: f64,
    pub generated_at: DateTime<Utc>,
}

/// A suggested CRM mutation for one target system, pending human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmSuggestion {
    pub subject: String,
    pub description: String,
    pub suggested_stage: String,
    #[serde(default)]
    pub follow_up: Vec<String>,
}

/// The AI-derived artifact a human validator reviews. Created exactly
/// once per bot session; immutable after validation completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftSummary {
    pub id: Uuid,
    pub bot_session_id: Uuid,
    pub summary_text: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub decisions: Vec<String>,
    pub next_steps: Vec<String>,
    /// Keyed by CRM system name (`salesforce` / `hubspot` / `creatio`).
    pub suggested_crm_updates: HashMap<String, CrmSuggestion>,
    pub confidence_score: f64,
    /// Wall-clock seconds spent generating this draft.
    pub processing_time: f64,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Call bot session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Persisted record of one bot's participation in one meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallBotSession {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub bot_session_id: String,
    pub platform: Platform,
    #[serde(default)]
    pub join_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub leave_time: Option<DateTime<Utc>>,
    pub connection_status: ConnectionStatus,
    /// Grows monotonically; partial-progress persistence is append-only.
    #[serde(default)]
    pub raw_transcript: String,
    #[serde(default)]
    pub speaker_mapping: HashMap<String, Speaker>,
    pub audio_quality: AudioQuality,
    #[serde(default)]
    pub reconnect_attempts: u32,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_grade_thresholds() {
        assert_eq!(AudioQuality::from_confidence(0.95), AudioQuality::Excellent);
        assert_eq!(AudioQuality::from_confidence(0.90), AudioQuality::Excellent);
        assert_eq!(AudioQuality::from_confidence(0.85), AudioQuality::Good);
        assert_eq!(AudioQuality::from_confidence(0.70), AudioQuality::Fair);
        assert_eq!(AudioQuality::from_confidence(0.45), AudioQuality::Poor);
        assert_eq!(AudioQuality::from_confidence(0.10), AudioQuality::Unusable);
    }

    #[test]
    fn platform_round_trip() {
        for p in [Platform::Meet, Platform::Teams, Platform::Zoom] {
            assert_eq!(Platform::parse(p.as_str()), Some(p));
        }
        assert_eq!(Platform::parse("webex"), None);
    }

    #[test]
    fn enums_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Platform::Meet).unwrap(), "\"meet\"");
        assert_eq!(
            serde_json::to_string(&AudioQuality::Excellent).unwrap(),
            "\"excellent\""
        );
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::Transcribing).unwrap(),
            "\"transcribing\""
        );
    }
}
