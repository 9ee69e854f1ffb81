//! Deterministic mock engine for tests and local development.
//!
//! Transcripts, confidences, and speaker identities are all derived from
//! the input audio, so repeated runs over the same chunks produce the same
//! transcript.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use cs_domain::config::EngineConfig;
use cs_domain::error::Result;
use cs_domain::types::{
    ActionItem, AudioChunk, MeetingSummary, Priority, Speaker, SpeakerRole, TranscriptChunk,
};

use crate::traits::TranscriptionEngine;

const MOCK_TEXTS: [&str; 10] = [
    "Hello everyone, welcome to today's meeting.",
    "Thank you for joining us today.",
    "Let's start with the agenda items.",
    "I'd like to discuss the project timeline.",
    "What are your thoughts on this approach?",
    "That sounds like a great idea.",
    "Let me share my screen to show the data.",
    "Can everyone see the presentation?",
    "I think we should move forward with this plan.",
    "Any questions before we wrap up?",
];

const SPEAKER_NAMES: [&str; 4] = ["Alice Johnson", "Bob Smith", "Carol Davis", "David Wilson"];

pub struct MockEngine {
    chunk_counter: AtomicU64,
    speakers: Mutex<HashMap<String, Speaker>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            chunk_counter: AtomicU64::new(0),
            speakers: Mutex::new(HashMap::new()),
        }
    }

    /// Stable short hash for deterministic confidences and speaker ids.
    fn short_hash(input: &str) -> u64 {
        let digest = Sha256::digest(input.as_bytes());
        u64::from_be_bytes(digest[..8].try_into().unwrap_or([0; 8]))
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TranscriptionEngine for MockEngine {
    async fn initialize(&self, _config: &EngineConfig) -> Result<()> {
        tracing::info!("mock transcription engine initialized");
        Ok(())
    }

    async fn transcribe_chunk(&self, audio: &AudioChunk) -> Result<TranscriptChunk> {
        let n = self.chunk_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let text = MOCK_TEXTS[(n as usize) % MOCK_TEXTS.len()];
        let speaker = self.identify_speaker(audio).await?;

        // Confidence in [0.85, 1.0), derived from the text.
        let confidence = 0.85 + (Self::short_hash(text) % 15) as f64 / 100.0;

        Ok(TranscriptChunk {
            chunk_id: format!("chunk_{n}"),
            text: text.to_string(),
            speaker,
            start_time: audio.timestamp,
            end_time: audio.timestamp + audio.duration,
            confidence,
            is_final: true,
            language: "en-US".into(),
        })
    }

    async fn identify_speaker(&self, audio: &AudioChunk) -> Result<Speaker> {
        // Identity is a function of the audio shape, so the same voice
        // profile maps to the same speaker across chunks.
        let signature = format!(
            "{}_{}_{}",
            audio.sample_rate,
            audio.channels,
            audio.audio_bytes.len() % 3
        );
        let speaker_id = format!("speaker_{:08x}", Self::short_hash(&signature) as u32);

        let mut speakers = self.speakers.lock();
        let count = speakers.len();
        let speaker = speakers.entry(speaker_id.clone()).or_insert_with(|| {
            let role = if count == 0 {
                SpeakerRole::Host
            } else {
                SpeakerRole::Participant
            };
            Speaker {
                speaker_id: speaker_id.clone(),
                name: Some(SPEAKER_NAMES[count % SPEAKER_NAMES.len()].to_string()),
                role,
                confidence: 0.9,
                voice_signature: Some(signature),
            }
        });
        Ok(speaker.clone())
    }

    async fn generate_summary(
        &self,
        transcript: &str,
        _speakers: &HashMap<String, Speaker>,
    ) -> Result<MeetingSummary> {
        let word_count = transcript.split_whitespace().count();
        let summary_text = format!(
            "Team reviewed project timeline and deliverables across {word_count} words of discussion."
        );

        let action_items = vec![
            ActionItem {
                description: "Follow up on project requirements".into(),
                assignee: Some("Alice Johnson".into()),
                due_date: None,
                priority: Priority::High,
                confidence: 0.85,
                source_text: "Alice mentioned she would follow up on the requirements".into(),
            },
            ActionItem {
                description: "Schedule technical review meeting".into(),
                assignee: Some("Bob Smith".into()),
                due_date: None,
                priority: Priority::Medium,
                confidence: 0.78,
                source_text: "Bob agreed to schedule the technical review".into(),
            },
        ];

        Ok(MeetingSummary {
            summary_text,
            key_points: vec![
                "Discussed project timeline and deliverables".into(),
                "Reviewed current progress and milestones".into(),
                "Identified potential risks and mitigation strategies".into(),
                "Aligned on next steps and responsibilities".into(),
            ],
            action_items,
            next_steps: vec![
                "Finalize project scope and requirements".into(),
                "Set up development environment".into(),
                "Begin initial implementation phase".into(),
            ],
            decisions: vec![
                "Approved phased implementation approach".into(),
                "Decided on weekly sprint cycles".into(),
            ],
            confidence_score: 0.82,
            generated_at: Utc::now(),
        })
    }

    async fn extract_action_items(&self, transcript: &str) -> Result<Vec<ActionItem>> {
        let patterns = [
            r"(?i)(\w+)\s+will\s+(.+?)(?:\.|$)",
            r"(?i)(\w+)\s+should\s+(.+?)(?:\.|$)",
            r"(?i)(\w+)\s+needs to\s+(.+?)(?:\.|$)",
            r"(?i)action item:?\s*(.+?)(?:\.|$)",
        ];

        let mut items = Vec::new();
        for pattern in patterns {
            let re = regex::Regex::new(pattern).expect("static action-item pattern");
            for caps in re.captures_iter(transcript) {
                let source_text = caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();
                if let (Some(assignee), Some(description)) = (caps.get(1), caps.get(2)) {
                    items.push(ActionItem {
                        description: description.as_str().trim().to_string(),
                        assignee: Some(assignee.as_str().trim().to_string()),
                        due_date: None,
                        priority: Priority::Medium,
                        confidence: 0.7,
                        source_text,
                    });
                } else if let Some(description) = caps.get(1) {
                    items.push(ActionItem {
                        description: description.as_str().trim().to_string(),
                        assignee: None,
                        due_date: None,
                        priority: Priority::Medium,
                        confidence: 0.6,
                        source_text,
                    });
                }
            }
        }

        items.truncate(5);
        Ok(items)
    }

    async fn suggest_next_steps(&self, transcript: &str, _summary: &str) -> Result<Vec<String>> {
        let lower = transcript.to_lowercase();
        let mut steps = Vec::new();
        if lower.contains("follow up") {
            steps.push("Schedule follow-up meeting to review progress".to_string());
        }
        if lower.contains("decision") || lower.contains("decide") {
            steps.push("Document decisions and communicate to stakeholders".to_string());
        }
        if lower.contains("action") || lower.contains("task") {
            steps.push("Begin execution of assigned action items".to_string());
        }
        if steps.is_empty() {
            steps = vec![
                "Distribute meeting notes to all participants".into(),
                "Set up tracking for action items and deadlines".into(),
                "Schedule check-in to monitor progress".into(),
            ];
        }
        steps.truncate(3);
        Ok(steps)
    }

    fn engine_id(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, bytes: usize, ts: f64) -> AudioChunk {
        AudioChunk::new(id, vec![0u8; bytes], ts, 2.0)
    }

    #[tokio::test]
    async fn transcription_is_deterministic_per_audio_shape() {
        let engine = MockEngine::new();
        let a = engine.transcribe_chunk(&chunk("c1", 300, 0.0)).await.unwrap();
        let b = engine.transcribe_chunk(&chunk("c2", 300, 2.0)).await.unwrap();
        assert_eq!(a.speaker.speaker_id, b.speaker.speaker_id);
        assert!(a.confidence >= 0.85 && a.confidence < 1.0);
        assert!(a.is_final);
        assert_eq!(a.end_time, 2.0);
    }

    #[tokio::test]
    async fn first_speaker_is_host() {
        let engine = MockEngine::new();
        let first = engine.identify_speaker(&chunk("c1", 300, 0.0)).await.unwrap();
        assert_eq!(first.role, SpeakerRole::Host);
        // A different audio shape yields a distinct participant.
        let second = engine.identify_speaker(&chunk("c2", 301, 2.0)).await.unwrap();
        assert_ne!(first.speaker_id, second.speaker_id);
        assert_eq!(second.role, SpeakerRole::Participant);
    }

    #[tokio::test]
    async fn action_items_extracted_with_assignee() {
        let engine = MockEngine::new();
        let items = engine
            .extract_action_items("Alice will send the proposal. Action item: update the docs.")
            .await
            .unwrap();
        assert!(items.iter().any(|i| i.assignee.as_deref() == Some("Alice")));
        assert!(items.iter().any(|i| i.description.contains("update the docs")));
    }

    #[tokio::test]
    async fn next_steps_follow_transcript_cues() {
        let engine = MockEngine::new();
        let steps = engine
            .suggest_next_steps("We should follow up next week after the decision.", "")
            .await
            .unwrap();
        assert!(steps.iter().any(|s| s.contains("follow-up")));
        assert!(steps.len() <= 3);
    }
}
