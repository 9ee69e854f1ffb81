//! Draft summary export formatting and meeting metrics.

use serde::Serialize;

use cs_domain::types::DraftSummary;

/// Render a draft summary as Markdown for distribution.
pub fn format_markdown(draft: &DraftSummary, meeting_title: &str) -> String {
    let mut lines = vec![
        format!("# Meeting Summary: {meeting_title}"),
        format!("**Date:** {}", draft.created_at.format("%Y-%m-%d %H:%M")),
        format!("**Confidence Score:** {:.0}%", draft.confidence_score * 100.0),
        String::new(),
        "## Summary".to_string(),
        draft.summary_text.clone(),
        String::new(),
        "## Key Points".to_string(),
    ];
    for point in &draft.key_points {
        lines.push(format!("- {point}"));
    }

    if !draft.action_items.is_empty() {
        lines.push(String::new());
        lines.push("## Action Items".to_string());
        for item in &draft.action_items {
            let assignee = item
                .assignee
                .as_ref()
                .map(|a| format!(" ({a})"))
                .unwrap_or_default();
            let due = item
                .due_date
                .as_ref()
                .map(|d| format!(" - Due: {d}"))
                .unwrap_or_default();
            lines.push(format!("- {}{assignee}{due}", item.description));
        }
    }

    if !draft.next_steps.is_empty() {
        lines.push(String::new());
        lines.push("## Next Steps".to_string());
        for step in &draft.next_steps {
            lines.push(format!("- {step}"));
        }
    }

    if !draft.decisions.is_empty() {
        lines.push(String::new());
        lines.push("## Decisions Made".to_string());
        for decision in &draft.decisions {
            lines.push(format!("- {decision}"));
        }
    }

    lines.join("\n")
}

/// Plain-text rendering for channels that cannot take Markdown.
pub fn format_text(draft: &DraftSummary, meeting_title: &str) -> String {
    let mut lines = vec![
        format!("Meeting Summary: {meeting_title}"),
        format!("Confidence Score: {:.0}%", draft.confidence_score * 100.0),
        String::new(),
        "SUMMARY:".to_string(),
        draft.summary_text.clone(),
        String::new(),
        "KEY POINTS:".to_string(),
    ];
    for (i, point) in draft.key_points.iter().enumerate() {
        lines.push(format!("{}. {point}", i + 1));
    }
    if !draft.action_items.is_empty() {
        lines.push(String::new());
        lines.push("ACTION ITEMS:".to_string());
        for (i, item) in draft.action_items.iter().enumerate() {
            let assignee = item
                .assignee
                .as_ref()
                .map(|a| format!(" ({a})"))
                .unwrap_or_default();
            lines.push(format!("{}. {}{assignee}", i + 1, item.description));
        }
    }
    lines.join("\n")
}

/// Derived metrics for one draft, used by reporting and the metrics
/// endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MeetingMetrics {
    pub transcript_length: usize,
    pub word_count: usize,
    pub summary_length: usize,
    pub key_points_count: usize,
    pub action_items_count: usize,
    pub next_steps_count: usize,
    pub decisions_count: usize,
    pub confidence_score: f64,
    pub processing_time_s: f64,
    pub compression_ratio: f64,
}

pub fn meeting_metrics(draft: &DraftSummary, raw_transcript: &str) -> MeetingMetrics {
    let transcript_length = raw_transcript.len();
    MeetingMetrics {
        transcript_length,
        word_count: raw_transcript.split_whitespace().count(),
        summary_length: draft.summary_text.len(),
        key_points_count: draft.key_points.len(),
        action_items_count: draft.action_items.len(),
        next_steps_count: draft.next_steps.len(),
        decisions_count: draft.decisions.len(),
        confidence_score: draft.confidence_score,
        processing_time_s: draft.processing_time,
        compression_ratio: if transcript_length > 0 {
            draft.summary_text.len() as f64 / transcript_length as f64
        } else {
            0.0
        },
    }
}
