//! Google Meet bot adapter.

use std::collections::HashMap;

use cs_domain::error::Result;
use cs_domain::types::{ConnectionStatus, Platform};

use crate::adapter::SessionTable;
use crate::traits::PlatformBot;

pub struct MeetBot {
    sessions: SessionTable,
}

impl MeetBot {
    pub fn new() -> Self {
        Self {
            sessions: SessionTable::new(),
        }
    }

    /// SDK session table, exposed for the gateway's simulation surface.
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }
}

impl Default for MeetBot {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PlatformBot for MeetBot {
    async fn authenticate(&self, _credentials: &HashMap<String, String>) -> Result<()> {
        // Meet bot identity is provisioned at deploy time through the
        // workspace service account; nothing to do per session.
        tracing::debug!("authenticated with Google Meet");
        Ok(())
    }

    async fn join(&self, meeting_url: &str, session_id: &str) -> Result<()> {
        tracing::info!(session_id, meeting_url, "joining Google Meet");
        self.sessions.join(session_id, meeting_url);
        Ok(())
    }

    async fn start_transcription(&self, session_id: &str) -> Result<String> {
        let stream_id = self.sessions.start_stream(session_id, "gmeet")?;
        tracing::info!(session_id, stream_id = %stream_id, "Meet transcription started");
        Ok(stream_id)
    }

    async fn leave(&self, session_id: &str) -> Result<()> {
        self.sessions.leave(session_id);
        tracing::info!(session_id, "left Google Meet");
        Ok(())
    }

    async fn connection_status(&self, session_id: &str) -> ConnectionStatus {
        self.sessions.status(session_id)
    }

    fn platform(&self) -> Platform {
        Platform::Meet
    }
}
