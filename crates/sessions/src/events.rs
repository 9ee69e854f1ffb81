//! Session event fan-out.
//!
//! The session manager emits named events to registered sinks after each
//! state mutation. A failing or panicking sink is logged and swallowed;
//! it can never block state progress.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use crate::state::SessionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStarted,
    SessionInitialized,
    MeetingJoined,
    TranscriptionStarted,
    SessionReconnecting,
    SessionErrorRecoverable,
    SessionErrorFatal,
    SessionStopped,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStarted => "session_started",
            Self::SessionInitialized => "session_initialized",
            Self::MeetingJoined => "meeting_joined",
            Self::TranscriptionStarted => "transcription_started",
            Self::SessionReconnecting => "session_reconnecting",
            Self::SessionErrorRecoverable => "session_error_recoverable",
            Self::SessionErrorFatal => "session_error_fatal",
            Self::SessionStopped => "session_stopped",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub kind: EventKind,
    pub session_id: String,
    pub status: SessionStatus,
    pub at: DateTime<Utc>,
    pub detail: Option<String>,
}

/// A consumer of session events (webhook forwarder, audit log, test
/// recorder).
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &SessionEvent) -> Result<(), String>;
}

#[derive(Default)]
pub struct EventBus {
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().push(sink);
    }

    /// Deliver an event to every sink. Failures never propagate.
    pub fn emit(&self, kind: EventKind, session_id: &str, status: SessionStatus, detail: Option<String>) {
        let event = SessionEvent {
            kind,
            session_id: session_id.to_string(),
            status,
            at: Utc::now(),
            detail,
        };
        tracing::debug!(
            event = event.kind.as_str(),
            session_id = %event.session_id,
            status = status.as_str(),
            "session event"
        );

        let sinks = self.sinks.read().clone();
        for sink in sinks {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                sink.on_event(&event)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(event = event.kind.as_str(), error = %e, "event sink error");
                }
                Err(_) => {
                    tracing::error!(event = event.kind.as_str(), "event sink panicked");
                }
            }
        }
    }
}
