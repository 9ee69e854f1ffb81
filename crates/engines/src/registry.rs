//! Engine factory.
//!
//! Resolves the configured engine kind to a concrete adapter. Engines are
//! keyed by a stable string name (`mock`, `model`) so the rest of the
//! pipeline never dispatches on concrete types.

use std::sync::Arc;

use cs_domain::config::{EngineConfig, EngineKind};
use cs_domain::error::Result;

use crate::mock::MockEngine;
use crate::model::ModelEngine;
use crate::traits::TranscriptionEngine;

/// Build the transcription engine named by the configuration.
pub fn create_engine(cfg: &EngineConfig) -> Result<Arc<dyn TranscriptionEngine>> {
    let engine: Arc<dyn TranscriptionEngine> = match cfg.engine_type {
        EngineKind::Mock => Arc::new(MockEngine::new()),
        EngineKind::Model => Arc::new(ModelEngine::from_config(cfg)?),
    };
    tracing::info!(engine = engine.engine_id(), "transcription engine registered");
    Ok(engine)
}
