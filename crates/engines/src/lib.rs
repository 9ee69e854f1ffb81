//! Pluggable transcription engines.
//!
//! An engine converts audio chunks into transcript fragments with speaker
//! attribution, and turns a finished transcript into a structured meeting
//! summary. Two engines ship: a deterministic mock for tests and local
//! development, and an adapter for a remote transcription/summary model.

pub mod mock;
pub mod model;
pub mod registry;
pub mod traits;

pub use registry::create_engine;
pub use traits::TranscriptionEngine;
