//! The transcription service: session lifecycle, the producer contract,
//! the processing worker, and the quality monitor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use cs_domain::config::TranscriptionConfig;
use cs_domain::error::{Error, Result};
use cs_domain::trace::TraceEvent;
use cs_domain::types::{AudioChunk, AudioQuality, Speaker, TranscriptChunk};
use cs_engines::TranscriptionEngine;

use crate::session::{SessionSnapshot, TranscriptionSession};

/// How long the processing worker blocks on an empty queue before
/// re-checking its exit conditions.
const POP_TIMEOUT: Duration = Duration::from_secs(1);

struct WorkerHandles {
    cancel: CancellationToken,
    processor: tokio::task::JoinHandle<()>,
    quality_monitor: tokio::task::JoinHandle<()>,
}

/// Summary returned when transcription stops for a session.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionStopSummary {
    pub session_id: String,
    pub duration_s: f64,
    pub total_chunks: usize,
    pub speakers_identified: usize,
    pub error_count: u32,
    pub final_quality: AudioQuality,
}

pub struct TranscriptionService {
    engine: Arc<dyn TranscriptionEngine>,
    config: TranscriptionConfig,
    sessions: RwLock<HashMap<String, Arc<TranscriptionSession>>>,
    workers: Mutex<HashMap<String, WorkerHandles>>,
}

impl TranscriptionService {
    pub fn new(engine: Arc<dyn TranscriptionEngine>, config: TranscriptionConfig) -> Self {
        Self {
            engine,
            config,
            sessions: RwLock::new(HashMap::new()),
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> Arc<dyn TranscriptionEngine> {
        self.engine.clone()
    }

    /// Start transcription for a session: allocates the bounded queue and
    /// spawns the processing worker and quality monitor.
    pub fn start_session(&self, session_id: &str, stream_id: &str) -> Result<SessionSnapshot> {
        {
            let mut sessions = self.sessions.write();
            if sessions.contains_key(session_id) {
                return Err(Error::Validation(format!(
                    "transcription session {session_id} already exists"
                )));
            }
            sessions.insert(
                session_id.to_string(),
                Arc::new(TranscriptionSession::new(
                    session_id.to_string(),
                    stream_id.to_string(),
                    self.config.max_chunk_queue_size,
                )),
            );
        }
        let session = self
            .session(session_id)
            .expect("session inserted above");

        let cancel = CancellationToken::new();
        let processor = tokio::spawn(run_processor(
            self.engine.clone(),
            session.clone(),
            self.config.error_threshold,
            cancel.clone(),
        ));
        let quality_monitor = tokio::spawn(run_quality_monitor(
            session.clone(),
            self.config.quality_check_interval_s,
            cancel.clone(),
        ));
        self.workers.lock().insert(
            session_id.to_string(),
            WorkerHandles {
                cancel,
                processor,
                quality_monitor,
            },
        );

        tracing::info!(session_id, stream_id, "transcription session started");
        Ok(session.snapshot())
    }

    /// Producer contract: enqueue an audio chunk for processing.
    ///
    /// Never blocks. When the queue is full the oldest chunk is dropped
    /// (informational, not an error). Fails only for unknown or inactive
    /// sessions.
    pub fn process_audio_chunk(
        &self,
        session_id: &str,
        audio_bytes: Vec<u8>,
        timestamp: f64,
        duration: f64,
    ) -> Result<()> {
        let session = self.session(session_id)?;
        if !session.is_active() {
            return Err(Error::Validation(format!(
                "transcription session {session_id} is inactive"
            )));
        }

        let chunk_id = format!("{session_id}_{}", (timestamp * 1000.0) as i64);
        let chunk = AudioChunk::new(chunk_id, audio_bytes, timestamp, duration);

        if session.queue.push(chunk).is_some() {
            tracing::warn!(session_id, "audio queue full, dropping oldest chunk");
            TraceEvent::ChunkDropped {
                session_id: session_id.to_string(),
                queue_len: session.queue.len(),
            }
            .emit();
        }
        Ok(())
    }

    /// Transcript chunks for a session, optionally restricted to chunks
    /// starting at or after `since` (media seconds).
    pub fn transcript_chunks(
        &self,
        session_id: &str,
        since: Option<f64>,
    ) -> Vec<TranscriptChunk> {
        self.session(session_id)
            .map(|s| s.chunks_since(since))
            .unwrap_or_default()
    }

    /// Full transcript text (final chunks joined with spaces).
    pub fn full_transcript(&self, session_id: &str) -> String {
        self.session(session_id)
            .map(|s| s.full_transcript())
            .unwrap_or_default()
    }

    pub fn speaker_mapping(&self, session_id: &str) -> HashMap<String, Speaker> {
        self.session(session_id)
            .map(|s| s.speakers())
            .unwrap_or_default()
    }

    /// Extract action items from the session's transcript so far.
    pub async fn extract_action_items(
        &self,
        session_id: &str,
    ) -> Result<Vec<cs_domain::types::ActionItem>> {
        let transcript = self.session(session_id)?.full_transcript();
        if transcript.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.engine.extract_action_items(&transcript).await
    }

    /// Suggest follow-up steps from the session's transcript so far.
    pub async fn suggest_next_steps(
        &self,
        session_id: &str,
        summary: &str,
    ) -> Result<Vec<String>> {
        let transcript = self.session(session_id)?.full_transcript();
        if transcript.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.engine.suggest_next_steps(&transcript, summary).await
    }

    pub fn session_status(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.sessions.read().get(session_id).map(|s| s.snapshot())
    }

    pub fn list_active(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.is_active())
            .map(|s| s.snapshot())
            .collect()
    }

    /// Stop transcription for a session: deactivates it, cancels both
    /// workers, and awaits their termination before summarizing.
    pub async fn stop_session(&self, session_id: &str) -> Result<TranscriptionStopSummary> {
        let session = self.session(session_id)?;
        session.deactivate();

        let handles = self.workers.lock().remove(session_id);
        if let Some(handles) = handles {
            handles.cancel.cancel();
            let _ = tokio::join!(handles.processor, handles.quality_monitor);
        }

        let summary = TranscriptionStopSummary {
            session_id: session_id.to_string(),
            duration_s: session.elapsed_s(),
            total_chunks: session.chunk_count(),
            speakers_identified: session.speakers().len(),
            error_count: session.error_count(),
            final_quality: session.quality(),
        };
        tracing::info!(
            session_id,
            chunks = summary.total_chunks,
            errors = summary.error_count,
            "transcription session stopped"
        );
        Ok(summary)
    }

    /// Stop every active session. Used on shutdown.
    pub async fn cleanup(&self) {
        let ids: Vec<String> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.is_active())
            .map(|s| s.session_id.clone())
            .collect();
        for id in ids {
            if let Err(e) = self.stop_session(&id).await {
                tracing::error!(session_id = %id, error = %e, "cleanup stop failed");
            }
        }
    }

    fn session(&self, session_id: &str) -> Result<Arc<TranscriptionSession>> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| {
                Error::Validation(format!("transcription session {session_id} not found"))
            })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Processing worker: drains the queue through the engine until the
/// session deactivates or the error threshold trips.
async fn run_processor(
    engine: Arc<dyn TranscriptionEngine>,
    session: Arc<TranscriptionSession>,
    error_threshold: u32,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() || !session.is_active() {
            break;
        }

        let chunk = tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = session.queue.pop_timeout(POP_TIMEOUT) => chunk,
        };
        let Some(chunk) = chunk else {
            continue;
        };

        match engine.transcribe_chunk(&chunk).await {
            Ok(transcribed) => {
                tracing::debug!(
                    session_id = %session.session_id,
                    chunk_id = %transcribed.chunk_id,
                    "chunk transcribed"
                );
                session.append_chunk(transcribed);
            }
            Err(e) => {
                let count = session.record_error();
                tracing::warn!(
                    session_id = %session.session_id,
                    error = %e,
                    error_count = count,
                    "chunk transcription failed"
                );
                if count >= error_threshold {
                    tracing::error!(
                        session_id = %session.session_id,
                        "error threshold exceeded, deactivating session"
                    );
                    session.deactivate();
                }
            }
        }
    }
    tracing::debug!(session_id = %session.session_id, "processing worker exited");
}

/// Quality monitor: on a fixed cadence, grades the chunks produced in the
/// last window by mean confidence.
async fn run_quality_monitor(
    session: Arc<TranscriptionSession>,
    interval_s: u64,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_s.max(1)));
    ticker.tick().await; // first tick fires immediately
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if !session.is_active() {
            break;
        }

        let chunks = session.chunks_since(None);
        if let Some(grade) = grade_recent(&chunks, interval_s as f64, session.elapsed_s()) {
            if grade != session.quality() {
                TraceEvent::QualityChanged {
                    session_id: session.session_id.clone(),
                    quality: grade.as_str().to_string(),
                }
                .emit();
            }
            session.set_quality(grade);
        }
    }
    tracing::debug!(session_id = %session.session_id, "quality monitor exited");
}

/// Grade the chunks whose `end_time` falls inside the trailing window.
/// Returns `None` when the window holds no chunks (grade unchanged).
pub fn grade_recent(
    chunks: &[TranscriptChunk],
    window_s: f64,
    now_s: f64,
) -> Option<AudioQuality> {
    let recent: Vec<&TranscriptChunk> = chunks
        .iter()
        .filter(|c| now_s - c.end_time < window_s)
        .collect();
    if recent.is_empty() {
        return None;
    }
    let mean = recent.iter().map(|c| c.confidence).sum::<f64>() / recent.len() as f64;
    Some(AudioQuality::from_confidence(mean))
}
