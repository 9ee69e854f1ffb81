//! Configuration for the CallScribe gateway and its pipeline components.
//!
//! Loaded from `callscribe.toml` (every field has a serde default, so an
//! empty file is a valid configuration). Secrets are never stored in the
//! file; config fields name the environment variables that hold them.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub crm: CrmConfig,
}

impl Config {
    /// Load a config file from disk. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// Environment variable holding the API bearer token. If the env var
    /// is unset the server runs without auth (dev mode).
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            api_token_env: d_api_token_env(),
            max_concurrent_requests: d_max_concurrent(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the JSON state stores.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcription engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Mock,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine_type: EngineKind,
    /// Environment variable holding the model API key.
    #[serde(default = "d_engine_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_engine_url")]
    pub base_url: String,
    #[serde(default = "d_engine_model")]
    pub model: String,
    #[serde(default = "d_engine_timeout")]
    pub request_timeout_s: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_type: EngineKind::Mock,
            api_key_env: d_engine_key_env(),
            base_url: d_engine_url(),
            model: d_engine_model(),
            request_timeout_s: d_engine_timeout(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcription service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Audio queue depth; oldest chunk is dropped on overflow.
    #[serde(default = "d_100")]
    pub max_chunk_queue_size: usize,
    /// Processing-worker errors before a session is deactivated.
    #[serde(default = "d_5")]
    pub error_threshold: u32,
    #[serde(default = "d_10")]
    pub quality_check_interval_s: u64,
    /// Expected audio chunk length in seconds.
    #[serde(default = "d_chunk_duration")]
    pub chunk_duration_s: f64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            max_chunk_queue_size: 100,
            error_threshold: 5,
            quality_check_interval_s: 10,
            chunk_duration_s: 2.0,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Call sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "d_3")]
    pub max_reconnect_attempts: u32,
    /// Base for exponential reconnect backoff (`base^attempt` seconds).
    #[serde(default = "d_2")]
    pub reconnect_delay_base_s: u64,
    /// Hard wall-clock cap on one session.
    #[serde(default = "d_7200")]
    pub session_timeout_s: u64,
    /// Cadence of the monitoring / partial-persist loop.
    #[serde(default = "d_10")]
    pub monitor_interval_s: u64,
    /// State-machine step interval.
    #[serde(default = "d_1000")]
    pub tick_interval_ms: u64,
    /// TTL of the `session:{id}` cache entries.
    #[serde(default = "d_3600")]
    pub cache_ttl_s: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 3,
            reconnect_delay_base_s: 2,
            session_timeout_s: 7200,
            monitor_interval_s: 10,
            tick_interval_ms: 1000,
            cache_ttl_s: 3600,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Seconds before an unanswered validation session expires.
    #[serde(default = "d_1800")]
    pub expiry_s: u64,
    /// Cadence of the background expiry sweep.
    #[serde(default = "d_60")]
    pub sweep_interval_s: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            expiry_s: 1800,
            sweep_interval_s: 60,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CRM sync
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    #[serde(default = "d_3")]
    pub max_sync_attempts: u32,
    /// Base for exponential sync-retry backoff (`base^attempt` seconds).
    #[serde(default = "d_2")]
    pub retry_delay_base_s: u64,
    #[serde(default = "d_sf_url")]
    pub salesforce_base_url: String,
    #[serde(default = "d_hs_url")]
    pub hubspot_base_url: String,
    #[serde(default = "d_cr_url")]
    pub creatio_base_url: String,
    /// Environment variables holding per-system API tokens.
    #[serde(default = "d_sf_token_env")]
    pub salesforce_token_env: String,
    #[serde(default = "d_hs_token_env")]
    pub hubspot_token_env: String,
    #[serde(default = "d_cr_token_env")]
    pub creatio_token_env: String,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            max_sync_attempts: 3,
            retry_delay_base_s: 2,
            salesforce_base_url: d_sf_url(),
            hubspot_base_url: d_hs_url(),
            creatio_base_url: d_cr_url(),
            salesforce_token_env: d_sf_token_env(),
            hubspot_token_env: d_hs_token_env(),
            creatio_token_env: d_cr_token_env(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: impl Into<String>) -> ConfigIssue {
    ConfigIssue {
        severity: ConfigSeverity::Error,
        field: field.into(),
        message: message.into(),
    }
}

fn warn(field: &str, message: impl Into<String>) -> ConfigIssue {
    ConfigIssue {
        severity: ConfigSeverity::Warning,
        field: field.into(),
        message: message.into(),
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.port == 0 {
            issues.push(err("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            issues.push(err("server.host", "host must not be empty"));
        }

        if self.transcription.max_chunk_queue_size == 0 {
            issues.push(err(
                "transcription.max_chunk_queue_size",
                "queue depth must be greater than 0",
            ));
        }
        if self.transcription.error_threshold == 0 {
            issues.push(err(
                "transcription.error_threshold",
                "error threshold must be greater than 0",
            ));
        }
        if self.transcription.chunk_duration_s <= 0.0 {
            issues.push(err(
                "transcription.chunk_duration_s",
                "chunk duration must be positive",
            ));
        }

        if self.session.session_timeout_s < 60 {
            issues.push(warn(
                "session.session_timeout_s",
                "timeouts under a minute will cut off real meetings",
            ));
        }
        if self.session.reconnect_delay_base_s > 30 {
            issues.push(warn(
                "session.reconnect_delay_base_s",
                "large backoff bases delay reconnection by minutes",
            ));
        }

        if self.validation.expiry_s == 0 {
            issues.push(err(
                "validation.expiry_s",
                "expiry must be greater than 0",
            ));
        }

        if self.crm.max_sync_attempts == 0 {
            issues.push(err(
                "crm.max_sync_attempts",
                "at least one sync attempt is required",
            ));
        }
        for (field, value) in [
            ("crm.salesforce_base_url", &self.crm.salesforce_base_url),
            ("crm.hubspot_base_url", &self.crm.hubspot_base_url),
            ("crm.creatio_base_url", &self.crm.creatio_base_url),
            ("engine.base_url", &self.engine.base_url),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                issues.push(err(
                    field,
                    format!("must start with http:// or https:// (got \"{value}\")"),
                ));
            }
        }

        if self.engine.engine_type == EngineKind::Model
            && std::env::var(&self.engine.api_key_env)
                .map(|v| v.is_empty())
                .unwrap_or(true)
        {
            issues.push(warn(
                "engine.api_key_env",
                format!(
                    "engine_type = \"model\" but {} is unset — engine calls will fail",
                    self.engine.api_key_env
                ),
            ));
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Serde defaults
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    3420
}
fn d_api_token_env() -> String {
    "CS_API_TOKEN".into()
}
fn d_max_concurrent() -> usize {
    256
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}
fn d_engine_key_env() -> String {
    "CS_ENGINE_API_KEY".into()
}
fn d_engine_url() -> String {
    "https://api.callscribe.dev/v1".into()
}
fn d_engine_model() -> String {
    "scribe-1-fast".into()
}
fn d_engine_timeout() -> u64 {
    30
}
fn d_chunk_duration() -> f64 {
    2.0
}
fn d_sf_url() -> String {
    "https://api.salesforce.com".into()
}
fn d_hs_url() -> String {
    "https://api.hubapi.com".into()
}
fn d_cr_url() -> String {
    "https://api.creatio.com".into()
}
fn d_sf_token_env() -> String {
    "CS_SALESFORCE_TOKEN".into()
}
fn d_hs_token_env() -> String {
    "CS_HUBSPOT_TOKEN".into()
}
fn d_cr_token_env() -> String {
    "CS_CREATIO_TOKEN".into()
}
fn d_1000() -> u64 {
    1000
}
fn d_3600() -> u64 {
    3600
}
fn d_1800() -> u64 {
    1800
}
fn d_7200() -> u64 {
    7200
}
fn d_100() -> usize {
    100
}
fn d_60() -> u64 {
    60
}
fn d_10() -> u64 {
    10
}
fn d_5() -> u32 {
    5
}
fn d_3() -> u32 {
    3
}
fn d_2() -> u64 {
    2
}
