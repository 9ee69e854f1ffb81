//! Remote model-backed transcription engine.
//!
//! Adapter for a hosted transcription/summary model speaking a JSON HTTP
//! API. Audio is shipped base64-encoded; summaries come back as structured
//! JSON. A malformed summary response degrades to a low-confidence
//! fallback summary rather than failing the whole draft.

use std::collections::HashMap;

use base64::Engine as _;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use cs_domain::config::EngineConfig;
use cs_domain::error::{Error, Result};
use cs_domain::types::{
    ActionItem, AudioChunk, MeetingSummary, Priority, Speaker, SpeakerRole, TranscriptChunk,
};

use crate::traits::TranscriptionEngine;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Serialize)]
struct TranscribeRequest<'a> {
    model: &'a str,
    audio: String,
    sample_rate: u32,
    channels: u16,
    language: &'a str,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    text: String,
    confidence: f64,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    speaker_signature: Option<String>,
}

#[derive(Serialize)]
struct SummaryRequest<'a> {
    model: &'a str,
    transcript: &'a str,
    participants: Vec<ParticipantContext>,
}

#[derive(Serialize)]
struct ParticipantContext {
    name: String,
    role: String,
}

#[derive(Deserialize)]
struct SummaryResponse {
    summary: String,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    action_items: Vec<WireActionItem>,
    #[serde(default)]
    next_steps: Vec<String>,
    #[serde(default)]
    decisions: Vec<String>,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.8
}

#[derive(Deserialize)]
struct WireActionItem {
    description: String,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    source_text: Option<String>,
}

impl WireActionItem {
    fn into_domain(self) -> ActionItem {
        let priority = match self.priority.as_deref() {
            Some("high") => Priority::High,
            Some("low") => Priority::Low,
            _ => Priority::Medium,
        };
        ActionItem {
            description: self.description,
            assignee: self.assignee,
            due_date: self.due_date,
            priority,
            confidence: 0.88,
            source_text: self.source_text.unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct NextStepsRequest<'a> {
    model: &'a str,
    transcript: &'a str,
    summary: &'a str,
}

#[derive(Deserialize)]
struct NextStepsResponse {
    #[serde(default)]
    next_steps: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ModelEngine {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    /// One speaker per distinct signature the backend reports.
    speakers: Mutex<HashMap<String, Speaker>>,
}

impl ModelEngine {
    /// Create the adapter from config, resolving the API key eagerly from
    /// the named environment variable.
    pub fn from_config(cfg: &EngineConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Error::Config(format!("engine API key env var {} is unset", cfg.api_key_env))
            })?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_s))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: cfg.model.clone(),
            client,
            speakers: Mutex::new(HashMap::new()),
        })
    }

    fn authed_post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let resp = self
            .authed_post(path)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::engine("model", format!("request to {path} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::engine(
                "model",
                format!("{path} returned {status}: {body}"),
            ));
        }

        resp.json::<T>()
            .await
            .map_err(|e| Error::engine("model", format!("decoding {path} response: {e}")))
    }

    fn register_speaker(&self, signature: &str) -> Speaker {
        let mut speakers = self.speakers.lock();
        let count = speakers.len();
        speakers
            .entry(signature.to_string())
            .or_insert_with(|| Speaker {
                speaker_id: format!("speaker_{}", count + 1),
                name: Some(format!("Speaker {}", count + 1)),
                role: if count == 0 {
                    SpeakerRole::Host
                } else {
                    SpeakerRole::Participant
                },
                confidence: 0.88,
                voice_signature: Some(signature.to_string()),
            })
            .clone()
    }

    /// Fallback summary used when the backend response cannot be decoded
    /// into the structured shape. The transcript is preserved; only the
    /// draft quality degrades.
    fn fallback_summary() -> MeetingSummary {
        MeetingSummary {
            summary_text:
                "Summary generation failed. Please review the transcript manually.".into(),
            key_points: vec!["Summary generation error occurred".into()],
            action_items: Vec::new(),
            next_steps: vec!["Review meeting transcript manually".into()],
            decisions: Vec::new(),
            confidence_score: 0.0,
            generated_at: Utc::now(),
        }
    }
}

#[async_trait::async_trait]
impl TranscriptionEngine for ModelEngine {
    async fn initialize(&self, _config: &EngineConfig) -> Result<()> {
        tracing::info!(model = %self.model, base_url = %self.base_url, "model engine ready");
        Ok(())
    }

    async fn transcribe_chunk(&self, audio: &AudioChunk) -> Result<TranscriptChunk> {
        let body = TranscribeRequest {
            model: &self.model,
            audio: base64::engine::general_purpose::STANDARD.encode(&audio.audio_bytes),
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            language: "en-US",
        };
        let resp: TranscribeResponse = self.post_json("/transcribe", &body).await?;

        let signature = resp
            .speaker_signature
            .unwrap_or_else(|| format!("{}_{}", audio.sample_rate, audio.channels));
        let speaker = self.register_speaker(&signature);

        Ok(TranscriptChunk {
            chunk_id: audio.chunk_id.clone(),
            text: resp.text,
            speaker,
            start_time: audio.timestamp,
            end_time: audio.timestamp + audio.duration,
            confidence: resp.confidence.clamp(0.0, 1.0),
            is_final: true,
            language: resp.language.unwrap_or_else(|| "en-US".into()),
        })
    }

    async fn identify_speaker(&self, audio: &AudioChunk) -> Result<Speaker> {
        let signature = format!("{}_{}", audio.sample_rate, audio.channels);
        Ok(self.register_speaker(&signature))
    }

    async fn generate_summary(
        &self,
        transcript: &str,
        speakers: &HashMap<String, Speaker>,
    ) -> Result<MeetingSummary> {
        let participants = speakers
            .values()
            .map(|s| ParticipantContext {
                name: s.name.clone().unwrap_or_else(|| s.speaker_id.clone()),
                role: format!("{:?}", s.role).to_lowercase(),
            })
            .collect();
        let body = SummaryRequest {
            model: &self.model,
            transcript,
            participants,
        };

        match self.post_json::<SummaryResponse>("/summaries", &body).await {
            Ok(resp) => Ok(MeetingSummary {
                summary_text: resp.summary,
                key_points: resp.key_points,
                action_items: resp
                    .action_items
                    .into_iter()
                    .map(WireActionItem::into_domain)
                    .collect(),
                next_steps: resp.next_steps,
                decisions: resp.decisions,
                confidence_score: resp.confidence.clamp(0.0, 1.0),
                generated_at: Utc::now(),
            }),
            Err(e) => {
                tracing::error!(error = %e, "summary generation failed, using fallback");
                Ok(Self::fallback_summary())
            }
        }
    }

    async fn extract_action_items(&self, transcript: &str) -> Result<Vec<ActionItem>> {
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            transcript: &'a str,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            action_items: Vec<WireActionItem>,
        }

        let resp: Resp = self
            .post_json(
                "/actions",
                &Req {
                    model: &self.model,
                    transcript,
                },
            )
            .await?;
        let mut items: Vec<ActionItem> = resp
            .action_items
            .into_iter()
            .map(WireActionItem::into_domain)
            .collect();
        items.truncate(10);
        Ok(items)
    }

    async fn suggest_next_steps(&self, transcript: &str, summary: &str) -> Result<Vec<String>> {
        let resp: NextStepsResponse = self
            .post_json(
                "/next-steps",
                &NextStepsRequest {
                    model: &self.model,
                    transcript,
                    summary,
                },
            )
            .await?;
        let mut steps = resp.next_steps;
        steps.truncate(5);
        Ok(steps)
    }

    fn engine_id(&self) -> &str {
        "model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_action_item_priority_mapping() {
        let item = WireActionItem {
            description: "send quote".into(),
            assignee: Some("Dana".into()),
            due_date: None,
            priority: Some("high".into()),
            source_text: None,
        };
        let domain = item.into_domain();
        assert_eq!(domain.priority, Priority::High);
        assert_eq!(domain.assignee.as_deref(), Some("Dana"));
    }

    #[test]
    fn summary_response_tolerates_missing_fields() {
        let resp: SummaryResponse =
            serde_json::from_str(r#"{"summary": "short call"}"#).unwrap();
        assert_eq!(resp.summary, "short call");
        assert!(resp.action_items.is_empty());
        assert_eq!(resp.confidence, 0.8);
    }

    #[test]
    fn fallback_summary_is_zero_confidence() {
        let fallback = ModelEngine::fallback_summary();
        assert_eq!(fallback.confidence_score, 0.0);
        assert!(!fallback.next_steps.is_empty());
    }
}
