//! Per-session transcription state shared between the producer, the
//! processing worker, and the quality monitor.
//!
//! The transcript list is single-writer (processing worker) / many-reader;
//! the speaker map and quality grade are lock-guarded; activity and error
//! counts are atomics so the hot paths never contend on a lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use cs_domain::types::{AudioQuality, Speaker, SpeakerRole, TranscriptChunk};

use crate::queue::BoundedChunkQueue;

pub struct TranscriptionSession {
    pub session_id: String,
    pub stream_id: String,
    pub queue: BoundedChunkQueue,
    is_active: AtomicBool,
    error_count: AtomicU32,
    chunks: RwLock<Vec<TranscriptChunk>>,
    speakers: RwLock<HashMap<String, Speaker>>,
    quality: RwLock<AudioQuality>,
    pub started_at: DateTime<Utc>,
    started_instant: std::time::Instant,
}

/// Serializable point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub stream_id: String,
    pub is_active: bool,
    pub audio_quality: AudioQuality,
    pub chunk_count: usize,
    pub speaker_count: usize,
    pub error_count: u32,
    pub started_at: DateTime<Utc>,
}

impl TranscriptionSession {
    pub fn new(session_id: String, stream_id: String, queue_capacity: usize) -> Self {
        Self {
            session_id,
            stream_id,
            queue: BoundedChunkQueue::new(queue_capacity),
            is_active: AtomicBool::new(true),
            error_count: AtomicU32::new(0),
            chunks: RwLock::new(Vec::new()),
            speakers: RwLock::new(HashMap::new()),
            quality: RwLock::new(AudioQuality::Good),
            started_at: Utc::now(),
            started_instant: std::time::Instant::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    /// Mark the session inactive. The processing worker observes the flag
    /// within one pop timeout (≤ 1 s).
    pub fn deactivate(&self) {
        self.is_active.store(false, Ordering::SeqCst);
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    /// Count one processing error; returns the new total.
    pub fn record_error(&self) -> u32 {
        self.error_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Append a finished transcript chunk and register its speaker.
    ///
    /// The first distinct speaker defaults to host unless the engine
    /// assigned a role; later speakers default to participant.
    pub fn append_chunk(&self, chunk: TranscriptChunk) {
        {
            let mut speakers = self.speakers.write();
            if !speakers.contains_key(&chunk.speaker.speaker_id) {
                let mut speaker = chunk.speaker.clone();
                if speaker.role == SpeakerRole::Unknown {
                    speaker.role = if speakers.is_empty() {
                        SpeakerRole::Host
                    } else {
                        SpeakerRole::Participant
                    };
                }
                speakers.insert(speaker.speaker_id.clone(), speaker);
            }
        }
        self.chunks.write().push(chunk);
    }

    /// Chunks with `start_time >= since` (all chunks when `since` is
    /// `None`). Readers always observe a monotone prefix.
    pub fn chunks_since(&self, since: Option<f64>) -> Vec<TranscriptChunk> {
        let chunks = self.chunks.read();
        match since {
            Some(since) => chunks
                .iter()
                .filter(|c| c.start_time >= since)
                .cloned()
                .collect(),
            None => chunks.clone(),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }

    /// Full transcript text: final chunks joined with single spaces.
    pub fn full_transcript(&self) -> String {
        self.chunks
            .read()
            .iter()
            .filter(|c| c.is_final)
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn speakers(&self) -> HashMap<String, Speaker> {
        self.speakers.read().clone()
    }

    pub fn quality(&self) -> AudioQuality {
        *self.quality.read()
    }

    pub fn set_quality(&self, quality: AudioQuality) {
        *self.quality.write() = quality;
    }

    pub fn elapsed_s(&self) -> f64 {
        self.started_instant.elapsed().as_secs_f64()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            stream_id: self.stream_id.clone(),
            is_active: self.is_active(),
            audio_quality: self.quality(),
            chunk_count: self.chunk_count(),
            speaker_count: self.speakers.read().len(),
            error_count: self.error_count(),
            started_at: self.started_at,
        }
    }
}
