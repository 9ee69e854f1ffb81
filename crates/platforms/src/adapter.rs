//! Shared session bookkeeping for the built-in platform adapters.
//!
//! Each adapter fronts a vendor SDK; the SDK-visible state per joined
//! session lives in this table. The table also carries the simulation
//! hooks the gateway's test/sim surface uses to script disconnects.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use cs_domain::error::{Error, Result};
use cs_domain::types::ConnectionStatus;

/// SDK-side state for one joined session.
#[derive(Debug, Clone)]
pub struct AdapterSession {
    pub meeting_url: String,
    pub status: ConnectionStatus,
    pub stream_id: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

/// Session table shared by the Meet/Teams/Zoom adapters.
pub struct SessionTable {
    sessions: Mutex<HashMap<String, AdapterSession>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Record a join. Re-joining an existing session refreshes its status
    /// (join is idempotent per session id).
    pub fn join(&self, session_id: &str, meeting_url: &str) {
        let mut sessions = self.sessions.lock();
        sessions
            .entry(session_id.to_string())
            .and_modify(|s| {
                s.status = ConnectionStatus::Connected;
                s.left_at = None;
            })
            .or_insert_with(|| AdapterSession {
                meeting_url: meeting_url.to_string(),
                status: ConnectionStatus::Connected,
                stream_id: None,
                joined_at: Utc::now(),
                left_at: None,
            });
    }

    /// Start the transcription stream for a joined session.
    pub fn start_stream(&self, session_id: &str, stream_prefix: &str) -> Result<String> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::Validation(format!("session {session_id} not found")))?;
        let stream_id = format!(
            "{stream_prefix}_stream_{session_id}_{}",
            Utc::now().timestamp()
        );
        session.stream_id = Some(stream_id.clone());
        session.status = ConnectionStatus::Transcribing;
        Ok(stream_id)
    }

    pub fn leave(&self, session_id: &str) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(session_id) {
            session.status = ConnectionStatus::Disconnected;
            session.left_at = Some(Utc::now());
        }
    }

    pub fn status(&self, session_id: &str) -> ConnectionStatus {
        self.sessions
            .lock()
            .get(session_id)
            .map(|s| s.status)
            .unwrap_or(ConnectionStatus::Disconnected)
    }

    /// Simulation hook: override the SDK-reported status for a session.
    /// Used by the gateway's sim surface and the test suite to script
    /// drops the connection monitor should observe.
    pub fn force_status(&self, session_id: &str, status: ConnectionStatus) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(session_id) {
            session.status = status;
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.lock().contains_key(session_id)
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}
