/// Shared error type used across all CallScribe crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// Caller-supplied data invalid: unknown session, bad URL, missing
    /// field. Reported synchronously; no state is mutated.
    #[error("validation: {0}")]
    Validation(String),

    /// Platform connectivity failure the session loop may recover from
    /// (routes through the DISCONNECTED state).
    #[error("transient connection error: {0}")]
    TransientConnection(String),

    /// Unrecoverable platform failure (auth denied, unsupported platform,
    /// capacity rejected). Routes straight to FAILED.
    #[error("connection error: {0}")]
    PermanentConnection(String),

    /// Transcription or summary engine failure. Counted per chunk by the
    /// transcription worker; fatal to a draft summary but never to the
    /// transcript already captured.
    #[error("engine {engine}: {message}")]
    Engine { engine: String, message: String },

    /// CRM sync requested against a validation session that is not
    /// completed.
    #[error("validation gate: {0}")]
    ValidationGate(String),

    /// CRM adapter failure. `retryable` distinguishes 5xx/network
    /// failures (retried with backoff) from 4xx rejections.
    #[error("crm {system}: {message}")]
    CrmAdapter {
        system: String,
        message: String,
        retryable: bool,
    },

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Error categories that the session state machine treats as recoverable
/// when they arrive as bare strings rather than typed variants.
const RECOVERABLE_MARKERS: [&str; 3] =
    ["connection_timeout", "network_error", "temporary_failure"];

impl Error {
    pub fn engine(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Engine {
            engine: engine.into(),
            message: message.into(),
        }
    }

    pub fn crm(system: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::CrmAdapter {
            system: system.into(),
            message: message.into(),
            retryable,
        }
    }

    /// Whether the session state machine should route this error through
    /// DISCONNECTED (retry with backoff) instead of failing the session.
    ///
    /// Typed variants are authoritative. The substring match on the
    /// message is a known limitation kept for errors that reach us as
    /// opaque strings from platform SDK boundaries; adapters should
    /// return `TransientConnection`/`PermanentConnection` instead.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::TransientConnection(_) | Self::Timeout(_) => true,
            Self::PermanentConnection(_) | Self::Validation(_) => false,
            other => {
                let msg = other.to_string().to_lowercase();
                RECOVERABLE_MARKERS.iter().any(|m| msg.contains(m))
            }
        }
    }

    /// Whether a CRM sync attempt that produced this error may be retried.
    pub fn is_retryable_crm(&self) -> bool {
        matches!(self, Self::CrmAdapter { retryable: true, .. })
            || matches!(self, Self::Http(_) | Self::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_variants_beat_substring_match() {
        assert!(Error::TransientConnection("gone".into()).is_recoverable());
        assert!(!Error::PermanentConnection("connection_timeout".into()).is_recoverable());
    }

    #[test]
    fn substring_fallback_for_opaque_errors() {
        assert!(Error::Other("platform reported network_error".into()).is_recoverable());
        assert!(!Error::Other("quota exceeded".into()).is_recoverable());
    }

    #[test]
    fn crm_retryability() {
        assert!(Error::crm("salesforce", "503", true).is_retryable_crm());
        assert!(!Error::crm("salesforce", "400 bad field", false).is_retryable_crm());
    }
}
