//! Zoom bot adapter.

use std::collections::HashMap;

use cs_domain::error::Result;
use cs_domain::types::{ConnectionStatus, Platform};

use crate::adapter::SessionTable;
use crate::traits::PlatformBot;

pub struct ZoomBot {
    sessions: SessionTable,
}

impl ZoomBot {
    pub fn new() -> Self {
        Self {
            sessions: SessionTable::new(),
        }
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }
}

impl Default for ZoomBot {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PlatformBot for ZoomBot {
    async fn authenticate(&self, _credentials: &HashMap<String, String>) -> Result<()> {
        tracing::debug!("authenticated with Zoom");
        Ok(())
    }

    async fn join(&self, meeting_url: &str, session_id: &str) -> Result<()> {
        tracing::info!(session_id, meeting_url, "joining Zoom meeting");
        self.sessions.join(session_id, meeting_url);
        Ok(())
    }

    async fn start_transcription(&self, session_id: &str) -> Result<String> {
        let stream_id = self.sessions.start_stream(session_id, "zoom")?;
        tracing::info!(session_id, stream_id = %stream_id, "Zoom transcription started");
        Ok(stream_id)
    }

    async fn leave(&self, session_id: &str) -> Result<()> {
        self.sessions.leave(session_id);
        tracing::info!(session_id, "left Zoom meeting");
        Ok(())
    }

    async fn connection_status(&self, session_id: &str) -> ConnectionStatus {
        self.sessions.status(session_id)
    }

    fn platform(&self) -> Platform {
        Platform::Zoom
    }
}
