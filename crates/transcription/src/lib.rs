//! Streaming transcription service.
//!
//! Converts a per-session audio stream into an ordered, speaker-tagged
//! transcript under backpressure: a bounded drop-oldest queue decouples
//! producers from the engine, a single processing worker assembles the
//! transcript, and a quality monitor rolls recent confidence up into an
//! audio-quality grade.

pub mod chunks;
pub mod queue;
pub mod service;
pub mod session;

pub use service::{TranscriptionService, TranscriptionStopSummary};
