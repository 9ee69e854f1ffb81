//! Draft summary generation.
//!
//! The generator is the single creation authority for draft summaries:
//! one draft per bot session, ever. Repeated calls for the same session
//! return the first result unchanged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use cs_domain::error::Result;
use cs_domain::trace::TraceEvent;
use cs_domain::types::{CallBotSession, CrmSuggestion, DraftSummary, MeetingSummary};
use cs_engines::TranscriptionEngine;

use crate::stages::suggest_stages;

pub const CRM_SYSTEMS: [&str; 3] = ["salesforce", "hubspot", "creatio"];

pub struct SummaryGenerator {
    engine: Arc<dyn TranscriptionEngine>,
    drafts: RwLock<HashMap<Uuid, DraftSummary>>,
}

impl SummaryGenerator {
    pub fn new(engine: Arc<dyn TranscriptionEngine>) -> Self {
        Self {
            engine,
            drafts: RwLock::new(HashMap::new()),
        }
    }

    /// Generate the draft summary for a finished bot session.
    ///
    /// Returns `None` when the session carries no transcript. An engine
    /// failure is fatal to the draft but leaves the transcript intact.
    pub async fn generate_draft(
        &self,
        bot_session: &CallBotSession,
    ) -> Result<Option<DraftSummary>> {
        if bot_session.raw_transcript.trim().is_empty() {
            tracing::warn!(
                bot_session_id = %bot_session.id,
                "no transcript available, skipping draft summary"
            );
            return Ok(None);
        }

        if let Some(existing) = self.drafts.read().get(&bot_session.id) {
            tracing::info!(
                bot_session_id = %bot_session.id,
                draft_id = %existing.id,
                "draft summary already exists"
            );
            return Ok(Some(existing.clone()));
        }

        let started = Instant::now();
        let summary = self
            .engine
            .generate_summary(&bot_session.raw_transcript, &bot_session.speaker_mapping)
            .await?;

        let confidence =
            calculate_confidence(&summary, bot_session.raw_transcript.len());
        let suggested_crm_updates = build_crm_suggestions(&summary);
        let processing_time = started.elapsed().as_secs_f64();

        let draft = DraftSummary {
            id: Uuid::new_v4(),
            bot_session_id: bot_session.id,
            summary_text: summary.summary_text,
            key_points: summary.key_points,
            action_items: summary.action_items,
            decisions: summary.decisions,
            next_steps: summary.next_steps,
            suggested_crm_updates,
            confidence_score: confidence,
            processing_time,
            created_at: Utc::now(),
        };

        // Double-checked under the write lock so a racing call cannot
        // mint a second draft for the same session.
        let mut drafts = self.drafts.write();
        if let Some(existing) = drafts.get(&bot_session.id) {
            return Ok(Some(existing.clone()));
        }
        drafts.insert(bot_session.id, draft.clone());

        TraceEvent::DraftCreated {
            draft_id: draft.id.to_string(),
            bot_session_id: bot_session.id.to_string(),
            confidence: draft.confidence_score,
            processing_time_s: draft.processing_time,
        }
        .emit();
        tracing::info!(
            bot_session_id = %bot_session.id,
            draft_id = %draft.id,
            confidence = draft.confidence_score,
            "draft summary generated"
        );

        Ok(Some(draft))
    }

    pub fn draft_for_session(&self, bot_session_id: Uuid) -> Option<DraftSummary> {
        self.drafts.read().get(&bot_session_id).cloned()
    }

    pub fn draft_by_id(&self, draft_id: Uuid) -> Option<DraftSummary> {
        self.drafts
            .read()
            .values()
            .find(|d| d.id == draft_id)
            .cloned()
    }
}

/// Overall confidence: the engine's score plus quality bonuses, capped
/// at 1.0 and rounded to three decimals.
pub fn calculate_confidence(summary: &MeetingSummary, transcript_len: usize) -> f64 {
    let mut bonus = 0.0;

    if transcript_len > 1000 {
        bonus += 0.10;
    } else if transcript_len > 500 {
        bonus += 0.05;
    }

    if !summary.action_items.is_empty() {
        let mean = summary
            .action_items
            .iter()
            .map(|i| i.confidence)
            .sum::<f64>()
            / summary.action_items.len() as f64;
        bonus += mean * 0.10;
    }

    if summary.key_points.len() >= 3 {
        bonus += 0.05;
    }
    if !summary.decisions.is_empty() {
        bonus += 0.05;
    }

    let total = (summary.confidence_score + bonus).min(1.0);
    (total * 1000.0).round() / 1000.0
}

/// Build the per-CRM suggested mutations from the engine summary.
fn build_crm_suggestions(summary: &MeetingSummary) -> HashMap<String, CrmSuggestion> {
    let stages = suggest_stages(&summary.summary_text);
    let subject = truncate(&summary.summary_text, 80);
    let description = {
        let mut body = summary.summary_text.clone();
        if !summary.key_points.is_empty() {
            body.push_str("\n\nKey points:\n");
            for point in &summary.key_points {
                body.push_str("- ");
                body.push_str(point);
                body.push('\n');
            }
        }
        body
    };

    CRM_SYSTEMS
        .iter()
        .map(|system| {
            let suggestion = CrmSuggestion {
                subject: subject.clone(),
                description: description.clone(),
                suggested_stage: stages
                    .for_system(system)
                    .unwrap_or("Prospecting")
                    .to_string(),
                follow_up: summary.next_steps.clone(),
            };
            (system.to_string(), suggestion)
        })
        .collect()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
