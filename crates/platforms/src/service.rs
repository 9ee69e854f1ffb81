//! Call-bot service: platform dispatch, bot-session registry, and the
//! reconnection policy.
//!
//! One instance serves the whole process. Bot sessions live here from
//! join to leave; the connection monitor probes every active session and
//! drives the backoff-based reconnect path when the platform reports a
//! drop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use cs_domain::config::SessionConfig;
use cs_domain::error::{Error, Result};
use cs_domain::trace::TraceEvent;
use cs_domain::types::{ConnectionStatus, Platform};

use crate::detect::resolve_platform;
use crate::registry::PlatformRegistry;

pub const MAX_RECONNECT_MESSAGE: &str = "Max reconnection attempts exceeded";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bot session record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Live record of one bot's attachment to one meeting.
#[derive(Debug, Clone, Serialize)]
pub struct BotSession {
    pub session_id: String,
    pub meeting_url: String,
    pub platform: Platform,
    pub status: ConnectionStatus,
    pub join_time: Option<DateTime<Utc>>,
    pub leave_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub reconnect_attempts: u32,
}

/// Stream handle returned when transcription starts.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionStream {
    pub session_id: String,
    pub stream_id: String,
    pub is_active: bool,
}

/// Summary returned when a bot session ends.
#[derive(Debug, Clone, Serialize)]
pub struct BotSessionSummary {
    pub session_id: String,
    pub platform: Platform,
    pub duration_s: Option<f64>,
    pub reconnect_attempts: u32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct CallBotService {
    bots: PlatformRegistry,
    sessions: RwLock<HashMap<String, BotSession>>,
    config: SessionConfig,
}

impl CallBotService {
    pub fn new(bots: PlatformRegistry, config: SessionConfig) -> Self {
        Self {
            bots,
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Join a meeting, detecting the platform from the URL unless an
    /// explicit override is given (the override wins on disagreement).
    pub async fn join_meeting(
        &self,
        meeting_url: &str,
        platform: Option<Platform>,
    ) -> Result<BotSession> {
        let platform = resolve_platform(meeting_url, platform)?;
        let session_id = format!("{platform}_{}", Uuid::new_v4().simple());
        self.join_meeting_with_id(meeting_url, platform, &session_id)
            .await
    }

    /// Join with a caller-supplied bot session id. A second session on
    /// the same platform reusing an id is rejected.
    pub async fn join_meeting_with_id(
        &self,
        meeting_url: &str,
        platform: Platform,
        session_id: &str,
    ) -> Result<BotSession> {
        if self.sessions.read().contains_key(session_id) {
            return Err(Error::Validation(format!(
                "bot session {session_id} already exists"
            )));
        }

        let bot = self.bots.get(platform)?;

        self.sessions.write().insert(
            session_id.to_string(),
            BotSession {
                session_id: session_id.to_string(),
                meeting_url: meeting_url.to_string(),
                platform,
                status: ConnectionStatus::Connecting,
                join_time: None,
                leave_time: None,
                error_message: None,
                reconnect_attempts: 0,
            },
        );
        tracing::info!(session_id, platform = %platform, "starting bot session");

        if let Err(e) = bot.authenticate(&HashMap::new()).await {
            self.mark_error(session_id, "Authentication failed");
            return Err(e);
        }

        match bot.join(meeting_url, session_id).await {
            Ok(()) => {
                let mut sessions = self.sessions.write();
                let session = sessions
                    .get_mut(session_id)
                    .expect("session inserted above");
                session.status = ConnectionStatus::Connected;
                session.join_time = Some(Utc::now());
                tracing::info!(session_id, "bot joined meeting");
                Ok(session.clone())
            }
            Err(e) => {
                self.mark_error(session_id, "Failed to join meeting");
                Err(e)
            }
        }
    }

    /// Start the transcription stream for a connected session.
    pub async fn start_transcription(&self, session_id: &str) -> Result<TranscriptionStream> {
        let (platform, status) = {
            let sessions = self.sessions.read();
            let session = sessions
                .get(session_id)
                .ok_or_else(|| Error::Validation(format!("session {session_id} not found")))?;
            (session.platform, session.status)
        };
        if status != ConnectionStatus::Connected {
            return Err(Error::Validation(format!(
                "session {session_id} is not connected"
            )));
        }

        let bot = self.bots.get(platform)?;
        let stream_id = bot.start_transcription(session_id).await?;

        if let Some(session) = self.sessions.write().get_mut(session_id) {
            session.status = ConnectionStatus::Transcribing;
        }
        TraceEvent::TranscriptionStarted {
            session_id: session_id.to_string(),
            stream_id: stream_id.clone(),
        }
        .emit();

        Ok(TranscriptionStream {
            session_id: session_id.to_string(),
            stream_id,
            is_active: true,
        })
    }

    /// Leave the meeting and close out the bot session.
    pub async fn end_session(&self, session_id: &str) -> Result<BotSessionSummary> {
        let platform = {
            let sessions = self.sessions.read();
            sessions
                .get(session_id)
                .ok_or_else(|| Error::Validation(format!("session {session_id} not found")))?
                .platform
        };

        let bot = self.bots.get(platform)?;
        if let Err(e) = bot.leave(session_id).await {
            tracing::warn!(session_id, error = %e, "error leaving meeting");
        }

        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::Validation(format!("session {session_id} not found")))?;
        session.status = ConnectionStatus::Disconnected;
        session.leave_time = Some(Utc::now());

        let duration_s = match (session.join_time, session.leave_time) {
            (Some(join), Some(leave)) => {
                Some((leave - join).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        };

        tracing::info!(session_id, "ended bot session");
        Ok(BotSessionSummary {
            session_id: session_id.to_string(),
            platform,
            duration_s,
            reconnect_attempts: session.reconnect_attempts,
        })
    }

    /// Reconnect a dropped session with exponential backoff.
    ///
    /// Returns `Ok(true)` when the bot rejoined, `Ok(false)` when the
    /// retry budget is exhausted or the rejoin failed (a later probe may
    /// try again while budget remains).
    pub async fn handle_disconnection(&self, session_id: &str) -> Result<bool> {
        let (platform, meeting_url, attempts) = {
            let mut sessions = self.sessions.write();
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| Error::Validation(format!("session {session_id} not found")))?;

            if session.reconnect_attempts >= self.config.max_reconnect_attempts {
                session.status = ConnectionStatus::Error;
                session.error_message = Some(MAX_RECONNECT_MESSAGE.to_string());
                tracing::error!(session_id, "max reconnection attempts reached");
                return Ok(false);
            }

            session.reconnect_attempts += 1;
            session.status = ConnectionStatus::Reconnecting;
            (
                session.platform,
                session.meeting_url.clone(),
                session.reconnect_attempts,
            )
        };

        let delay_s = self.config.reconnect_delay_base_s.pow(attempts);
        TraceEvent::SessionReconnecting {
            session_id: session_id.to_string(),
            attempt: attempts,
            delay_s,
        }
        .emit();
        tracing::info!(session_id, attempt = attempts, delay_s, "reconnecting bot session");
        tokio::time::sleep(Duration::from_secs(delay_s)).await;

        let bot = self.bots.get(platform)?;
        match bot.join(&meeting_url, session_id).await {
            Ok(()) => {
                if let Some(session) = self.sessions.write().get_mut(session_id) {
                    session.status = ConnectionStatus::Connected;
                }
                tracing::info!(session_id, "bot session reconnected");
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(session_id, error = %e, "reconnection attempt failed");
                Ok(false)
            }
        }
    }

    /// Probe the platform SDK for the current status of a session.
    pub async fn probe_connection(&self, session_id: &str) -> Result<ConnectionStatus> {
        let platform = {
            let sessions = self.sessions.read();
            sessions
                .get(session_id)
                .ok_or_else(|| Error::Validation(format!("session {session_id} not found")))?
                .platform
        };
        Ok(self.bots.get(platform)?.connection_status(session_id).await)
    }

    pub fn session_status(&self, session_id: &str) -> Option<BotSession> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Sessions the connection monitor should be watching.
    pub fn list_active(&self) -> Vec<BotSession> {
        self.sessions
            .read()
            .values()
            .filter(|s| {
                matches!(
                    s.status,
                    ConnectionStatus::Connected
                        | ConnectionStatus::Transcribing
                        | ConnectionStatus::Reconnecting
                )
            })
            .cloned()
            .collect()
    }

    pub fn remove_session(&self, session_id: &str) {
        self.sessions.write().remove(session_id);
    }

    fn mark_error(&self, session_id: &str, message: &str) {
        if let Some(session) = self.sessions.write().get_mut(session_id) {
            session.status = ConnectionStatus::Error;
            session.error_message = Some(message.to_string());
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connection monitor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Spawn the shared connection-monitor task. Every tick it probes each
/// CONNECTED/TRANSCRIBING session and routes reported drops through
/// [`CallBotService::handle_disconnection`].
pub fn spawn_connection_monitor(
    service: Arc<CallBotService>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("connection monitor stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let watched: Vec<String> = service
                .list_active()
                .into_iter()
                .filter(|s| {
                    matches!(
                        s.status,
                        ConnectionStatus::Connected | ConnectionStatus::Transcribing
                    )
                })
                .map(|s| s.session_id)
                .collect();

            for session_id in watched {
                match service.probe_connection(&session_id).await {
                    Ok(ConnectionStatus::Disconnected) => {
                        tracing::warn!(session_id = %session_id, "detected disconnection");
                        if let Err(e) = service.handle_disconnection(&session_id).await {
                            tracing::error!(session_id = %session_id, error = %e, "reconnect handling failed");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(session_id = %session_id, error = %e, "status probe failed");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meet::MeetBot;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            max_reconnect_attempts: 2,
            reconnect_delay_base_s: 0,
            ..SessionConfig::default()
        }
    }

    fn service_with_meet() -> (Arc<MeetBot>, CallBotService) {
        let meet = Arc::new(MeetBot::new());
        let mut registry = PlatformRegistry::empty();
        registry.register(meet.clone());
        (meet, CallBotService::new(registry, fast_config()))
    }

    #[tokio::test]
    async fn join_detects_platform_and_connects() {
        let (_meet, service) = service_with_meet();
        let session = service
            .join_meeting("https://meet.google.com/abc-defg-hij", None)
            .await
            .unwrap();
        assert_eq!(session.platform, Platform::Meet);
        assert_eq!(session.status, ConnectionStatus::Connected);
        assert!(session.join_time.is_some());
        assert!(session.session_id.starts_with("meet_"));
    }

    #[tokio::test]
    async fn unknown_domain_fails_without_session() {
        let (_meet, service) = service_with_meet();
        let err = service
            .join_meeting("https://webex.com/meet/x", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(service.list_active().is_empty());
    }

    #[tokio::test]
    async fn duplicate_bot_session_id_rejected() {
        let (_meet, service) = service_with_meet();
        service
            .join_meeting_with_id("https://meet.google.com/abc", Platform::Meet, "bot_1")
            .await
            .unwrap();
        let err = service
            .join_meeting_with_id("https://meet.google.com/xyz", Platform::Meet, "bot_1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn transcription_requires_connected_session() {
        let (_meet, service) = service_with_meet();
        let session = service
            .join_meeting("https://meet.google.com/abc", None)
            .await
            .unwrap();
        let stream = service.start_transcription(&session.session_id).await.unwrap();
        assert!(stream.is_active);
        // Already transcribing: a second start is rejected.
        assert!(service.start_transcription(&session.session_id).await.is_err());
    }

    #[tokio::test]
    async fn end_session_sets_leave_after_join() {
        let (_meet, service) = service_with_meet();
        let session = service
            .join_meeting("https://meet.google.com/abc", None)
            .await
            .unwrap();
        let summary = service.end_session(&session.session_id).await.unwrap();
        let snapshot = service.session_status(&session.session_id).unwrap();
        assert!(snapshot.leave_time.unwrap() >= snapshot.join_time.unwrap());
        assert_eq!(summary.reconnect_attempts, 0);
    }

    #[tokio::test]
    async fn reconnect_succeeds_within_budget() {
        let (meet, service) = service_with_meet();
        let session = service
            .join_meeting("https://meet.google.com/abc", None)
            .await
            .unwrap();
        meet.sessions()
            .force_status(&session.session_id, ConnectionStatus::Disconnected);

        assert!(service.handle_disconnection(&session.session_id).await.unwrap());
        let snapshot = service.session_status(&session.session_id).unwrap();
        assert_eq!(snapshot.status, ConnectionStatus::Connected);
        assert_eq!(snapshot.reconnect_attempts, 1);
    }

    #[tokio::test]
    async fn reconnect_budget_exhaustion_marks_error() {
        let (_meet, service) = service_with_meet();
        let session = service
            .join_meeting("https://meet.google.com/abc", None)
            .await
            .unwrap();

        // Budget is 2: two reconnects succeed, the third is refused.
        assert!(service.handle_disconnection(&session.session_id).await.unwrap());
        assert!(service.handle_disconnection(&session.session_id).await.unwrap());
        assert!(!service.handle_disconnection(&session.session_id).await.unwrap());

        let snapshot = service.session_status(&session.session_id).unwrap();
        assert_eq!(snapshot.status, ConnectionStatus::Error);
        assert_eq!(snapshot.reconnect_attempts, 2);
        assert_eq!(
            snapshot.error_message.as_deref(),
            Some(MAX_RECONNECT_MESSAGE)
        );
    }
}
