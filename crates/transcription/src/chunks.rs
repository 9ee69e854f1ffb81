//! Offline transcript-chunk utilities: merging, formatting, and speaker
//! statistics.

use std::collections::HashMap;

use serde::Serialize;

use cs_domain::types::TranscriptChunk;

/// Merge consecutive chunks from the same speaker whose gap is at most
/// `threshold` seconds.
///
/// Text is concatenated with a single space, confidence is averaged,
/// bounds come from the outermost chunks, and `is_final` from the last.
pub fn merge_chunks(chunks: &[TranscriptChunk], threshold: f64) -> Vec<TranscriptChunk> {
    let mut iter = chunks.iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };

    let mut merged = Vec::new();
    let mut current = first.clone();

    for next in iter {
        let same_speaker = current.speaker.speaker_id == next.speaker.speaker_id;
        let gap = next.start_time - current.end_time;
        if same_speaker && gap <= threshold {
            current = TranscriptChunk {
                chunk_id: format!("merged_{}_{}", current.chunk_id, next.chunk_id),
                text: format!("{} {}", current.text, next.text).trim().to_string(),
                speaker: current.speaker,
                start_time: current.start_time,
                end_time: next.end_time,
                confidence: (current.confidence + next.confidence) / 2.0,
                is_final: next.is_final,
                language: current.language,
            };
        } else {
            merged.push(std::mem::replace(&mut current, next.clone()));
        }
    }
    merged.push(current);
    merged
}

/// Render chunks as `[HH:MM:SS] Speaker: text` lines. Timestamps are
/// media-relative.
pub fn format_transcript(chunks: &[TranscriptChunk], include_speakers: bool) -> String {
    chunks
        .iter()
        .map(|chunk| {
            let total = chunk.start_time.max(0.0) as u64;
            let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
            let timestamp = format!("{h:02}:{m:02}:{s:02}");
            match (&chunk.speaker.name, include_speakers) {
                (Some(name), true) => format!("[{timestamp}] {name}: {}", chunk.text),
                _ => format!("[{timestamp}] {}", chunk.text),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Per-speaker speaking statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SpeakerStats {
    pub name: Option<String>,
    pub role: String,
    pub total_duration_s: f64,
    pub word_count: usize,
    pub chunk_count: usize,
    pub avg_confidence: f64,
}

pub fn speaker_statistics(chunks: &[TranscriptChunk]) -> HashMap<String, SpeakerStats> {
    let mut stats: HashMap<String, (SpeakerStats, f64)> = HashMap::new();

    for chunk in chunks {
        let entry = stats
            .entry(chunk.speaker.speaker_id.clone())
            .or_insert_with(|| {
                (
                    SpeakerStats {
                        name: chunk.speaker.name.clone(),
                        role: format!("{:?}", chunk.speaker.role).to_lowercase(),
                        total_duration_s: 0.0,
                        word_count: 0,
                        chunk_count: 0,
                        avg_confidence: 0.0,
                    },
                    0.0,
                )
            });
        let (speaker_stats, confidence_sum) = entry;
        speaker_stats.total_duration_s += chunk.end_time - chunk.start_time;
        speaker_stats.word_count += chunk.text.split_whitespace().count();
        speaker_stats.chunk_count += 1;
        *confidence_sum += chunk.confidence;
        speaker_stats.avg_confidence = *confidence_sum / speaker_stats.chunk_count as f64;
    }

    stats.into_iter().map(|(k, (v, _))| (k, v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cs_domain::types::{Speaker, SpeakerRole};

    fn chunk(id: &str, speaker: &str, start: f64, end: f64, text: &str) -> TranscriptChunk {
        TranscriptChunk {
            chunk_id: id.into(),
            text: text.into(),
            speaker: Speaker {
                speaker_id: speaker.into(),
                name: Some(speaker.to_uppercase()),
                role: SpeakerRole::Participant,
                confidence: 0.9,
                voice_signature: None,
            },
            start_time: start,
            end_time: end,
            confidence: 0.8,
            is_final: true,
            language: "en-US".into(),
        }
    }

    #[test]
    fn merges_same_speaker_within_gap() {
        let chunks = vec![
            chunk("a", "sp1", 0.0, 2.0, "hello there"),
            chunk("b", "sp1", 3.0, 5.0, "how are you"),
            chunk("c", "sp2", 5.5, 7.0, "fine thanks"),
        ];
        let merged = merge_chunks(&chunks, 2.0);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].text, "hello there how are you");
        assert_eq!(merged[0].start_time, 0.0);
        assert_eq!(merged[0].end_time, 5.0);
        assert!((merged[0].confidence - 0.8).abs() < 1e-9);
        assert_eq!(merged[1].speaker.speaker_id, "sp2");
    }

    #[test]
    fn zero_threshold_is_identity_for_alternating_speakers() {
        let chunks = vec![
            chunk("a", "sp1", 0.0, 2.0, "one"),
            chunk("b", "sp2", 2.5, 4.0, "two"),
            chunk("c", "sp1", 4.5, 6.0, "three"),
        ];
        let merged = merge_chunks(&chunks, 0.0);
        assert_eq!(merged.len(), 3);
        for (original, m) in chunks.iter().zip(&merged) {
            assert_eq!(original.chunk_id, m.chunk_id);
            assert_eq!(original.text, m.text);
        }
    }

    #[test]
    fn gap_beyond_threshold_splits_same_speaker() {
        let chunks = vec![
            chunk("a", "sp1", 0.0, 2.0, "before the pause"),
            chunk("b", "sp1", 10.0, 12.0, "after the pause"),
        ];
        assert_eq!(merge_chunks(&chunks, 2.0).len(), 2);
        assert_eq!(merge_chunks(&chunks, 10.0).len(), 1);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(merge_chunks(&[], 2.0).is_empty());
    }

    #[test]
    fn is_final_taken_from_last() {
        let mut second = chunk("b", "sp1", 2.5, 4.0, "tail");
        second.is_final = false;
        let chunks = vec![chunk("a", "sp1", 0.0, 2.0, "head"), second];
        let merged = merge_chunks(&chunks, 2.0);
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].is_final);
    }

    #[test]
    fn formatting_includes_timestamps_and_speakers() {
        let chunks = vec![chunk("a", "sp1", 65.0, 67.0, "hello")];
        let out = format_transcript(&chunks, true);
        assert_eq!(out, "[00:01:05] SP1: hello");
        let out = format_transcript(&chunks, false);
        assert_eq!(out, "[00:01:05] hello");
    }

    #[test]
    fn speaker_statistics_aggregate() {
        let chunks = vec![
            chunk("a", "sp1", 0.0, 2.0, "one two three"),
            chunk("b", "sp1", 2.0, 4.0, "four"),
            chunk("c", "sp2", 4.0, 5.0, "five six"),
        ];
        let stats = speaker_statistics(&chunks);
        assert_eq!(stats.len(), 2);
        let sp1 = &stats["sp1"];
        assert_eq!(sp1.chunk_count, 2);
        assert_eq!(sp1.word_count, 4);
        assert!((sp1.total_duration_s - 4.0).abs() < 1e-9);
        assert!((sp1.avg_confidence - 0.8).abs() < 1e-9);
    }
}
