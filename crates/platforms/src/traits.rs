use std::collections::HashMap;

use cs_domain::error::Result;
use cs_domain::types::{ConnectionStatus, Platform};

/// Trait every platform bot adapter must implement.
///
/// Adapters wrap the vendor SDK for one conferencing platform. Errors are
/// typed: a `TransientConnection` routes the owning session through its
/// reconnect path, a `PermanentConnection` fails it immediately.
#[async_trait::async_trait]
pub trait PlatformBot: Send + Sync {
    /// Authenticate against the platform. May be a no-op where the SDK
    /// handles credentials out of band.
    async fn authenticate(&self, credentials: &HashMap<String, String>) -> Result<()>;

    /// Join a meeting as a silent participant. Idempotent per
    /// `session_id`: re-joining an already-joined session succeeds.
    async fn join(&self, meeting_url: &str, session_id: &str) -> Result<()>;

    /// Start the audio/transcription stream. Must be called before any
    /// audio is emitted. Returns the stream id.
    async fn start_transcription(&self, session_id: &str) -> Result<String>;

    /// Leave the meeting.
    async fn leave(&self, session_id: &str) -> Result<()>;

    /// Current connection state as seen by the platform SDK. Unknown
    /// sessions report `Disconnected`.
    async fn connection_status(&self, session_id: &str) -> ConnectionStatus;

    /// The platform this adapter serves.
    fn platform(&self) -> Platform;
}
