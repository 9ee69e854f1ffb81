use std::collections::HashMap;

use cs_domain::config::EngineConfig;
use cs_domain::error::Result;
use cs_domain::types::{ActionItem, AudioChunk, MeetingSummary, Speaker, TranscriptChunk};

/// Trait every transcription engine must implement.
///
/// Implementations translate between our internal chunk/summary types and
/// whatever the backing model exposes. All methods are long-lived RPCs from
/// the caller's point of view and must be cancel-safe.
#[async_trait::async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Prepare the engine for use. Called once before any transcription.
    async fn initialize(&self, config: &EngineConfig) -> Result<()>;

    /// Transcribe a single audio chunk. Errors are counted by the caller;
    /// they do not terminate the session until the error threshold.
    async fn transcribe_chunk(&self, audio: &AudioChunk) -> Result<TranscriptChunk>;

    /// Identify the speaker of an audio chunk. The same audio
    /// characteristics must map to the same `speaker_id`.
    async fn identify_speaker(&self, audio: &AudioChunk) -> Result<Speaker>;

    /// Generate a structured summary from a full transcript.
    async fn generate_summary(
        &self,
        transcript: &str,
        speakers: &HashMap<String, Speaker>,
    ) -> Result<MeetingSummary>;

    /// Extract action items from a transcript.
    async fn extract_action_items(&self, transcript: &str) -> Result<Vec<ActionItem>>;

    /// Suggest follow-up steps given the transcript and its summary.
    async fn suggest_next_steps(&self, transcript: &str, summary: &str) -> Result<Vec<String>>;

    /// A stable identifier for this engine (`mock`, `model`).
    fn engine_id(&self) -> &str;
}
