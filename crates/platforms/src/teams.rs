//! Microsoft Teams bot adapter.

use std::collections::HashMap;

use cs_domain::error::{Error, Result};
use cs_domain::types::{ConnectionStatus, Platform};

use crate::adapter::SessionTable;
use crate::traits::PlatformBot;

pub struct TeamsBot {
    sessions: SessionTable,
}

impl TeamsBot {
    pub fn new() -> Self {
        Self {
            sessions: SessionTable::new(),
        }
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }
}

impl Default for TeamsBot {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PlatformBot for TeamsBot {
    async fn authenticate(&self, credentials: &HashMap<String, String>) -> Result<()> {
        // Graph requires an app registration; an explicitly empty tenant
        // id is a configuration mistake worth rejecting early.
        if credentials.get("tenant_id").is_some_and(|t| t.is_empty()) {
            return Err(Error::PermanentConnection(
                "teams: empty tenant_id in credentials".into(),
            ));
        }
        tracing::debug!("authenticated with Microsoft Teams");
        Ok(())
    }

    async fn join(&self, meeting_url: &str, session_id: &str) -> Result<()> {
        tracing::info!(session_id, meeting_url, "joining Teams meeting");
        self.sessions.join(session_id, meeting_url);
        Ok(())
    }

    async fn start_transcription(&self, session_id: &str) -> Result<String> {
        let stream_id = self.sessions.start_stream(session_id, "teams")?;
        tracing::info!(session_id, stream_id = %stream_id, "Teams transcription started");
        Ok(stream_id)
    }

    async fn leave(&self, session_id: &str) -> Result<()> {
        self.sessions.leave(session_id);
        tracing::info!(session_id, "left Teams meeting");
        Ok(())
    }

    async fn connection_status(&self, session_id: &str) -> ConnectionStatus {
        self.sessions.status(session_id)
    }

    fn platform(&self) -> Platform {
        Platform::Teams
    }
}
