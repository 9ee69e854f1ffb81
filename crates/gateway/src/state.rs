use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::Value;

use cs_crm::{CrmRegistry, SyncEngine};
use cs_domain::config::Config;
use cs_domain::error::Result;
use cs_engines::TranscriptionEngine;
use cs_platforms::{CallBotService, PlatformRegistry};
use cs_sessions::{CallSessionManager, EventBus, MeetingStore};
use cs_summary::SummaryGenerator;
use cs_transcription::TranscriptionService;
use cs_validation::ValidationWorkflow;

/// Cached session snapshot with its fetch time, keyed `session:{id}`.
#[derive(Clone)]
pub struct CachedSession {
    pub snapshot: Value,
    pub fetched_at: Instant,
}

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Pipeline** — session manager, transcription, bots, summaries
/// - **Review & sync** — validation workflow, CRM sync engine
/// - **Storage** — meeting store, session cache
/// - **Security** — API token hash (computed once at startup)
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Pipeline ──────────────────────────────────────────────────────
    pub manager: Arc<CallSessionManager>,
    pub call_bots: Arc<CallBotService>,
    pub transcription: Arc<TranscriptionService>,
    pub summaries: Arc<SummaryGenerator>,

    // ── Review & sync ─────────────────────────────────────────────────
    pub validation: Arc<ValidationWorkflow>,
    pub crm_sync: Arc<SyncEngine>,

    // ── Storage ───────────────────────────────────────────────────────
    pub store: Arc<MeetingStore>,
    /// TTL'd cache keyed `session:{id}`, warmed on start and
    /// invalidated on stop.
    pub session_cache: Arc<RwLock<HashMap<String, CachedSession>>>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the API bearer token. `None` = dev mode.
    pub api_token_hash: Option<Vec<u8>>,
}

impl AppState {
    /// Wire up the full pipeline from a config and the pluggable
    /// registries. `persistent` selects disk-backed stores under the
    /// configured state path; tests and the load-test harness pass
    /// `false` for in-memory state.
    pub fn build(
        config: Arc<Config>,
        engine: Arc<dyn TranscriptionEngine>,
        platforms: PlatformRegistry,
        crm: CrmRegistry,
        persistent: bool,
    ) -> Result<Self> {
        let call_bots = Arc::new(CallBotService::new(platforms, config.session.clone()));
        let transcription = Arc::new(TranscriptionService::new(
            engine.clone(),
            config.transcription.clone(),
        ));
        let summaries = Arc::new(SummaryGenerator::new(engine));

        let state_path = &config.storage.state_path;
        let (store, validation, crm_sync) = if persistent {
            (
                Arc::new(MeetingStore::new(state_path)?),
                Arc::new(ValidationWorkflow::with_state_path(
                    config.validation.clone(),
                    state_path,
                )?),
                Arc::new(SyncEngine::with_state_path(
                    crm,
                    config.crm.clone(),
                    state_path,
                )?),
            )
        } else {
            (
                Arc::new(MeetingStore::in_memory()),
                Arc::new(ValidationWorkflow::new(config.validation.clone())),
                Arc::new(SyncEngine::new(crm, config.crm.clone())),
            )
        };

        let manager = CallSessionManager::new(
            call_bots.clone(),
            transcription.clone(),
            summaries.clone(),
            store.clone(),
            Arc::new(EventBus::new()),
            config.session.clone(),
        );

        let api_token_hash = resolve_api_token_hash(&config.server.api_token_env);

        Ok(Self {
            config,
            manager,
            call_bots,
            transcription,
            summaries,
            validation,
            crm_sync,
            store,
            session_cache: Arc::new(RwLock::new(HashMap::new())),
            api_token_hash,
        })
    }

    /// Warm the cache entry for a live session.
    pub fn cache_session(&self, session_id: &str, snapshot: Value) {
        self.session_cache.write().insert(
            format!("session:{session_id}"),
            CachedSession {
                snapshot,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Fresh cache hit for a session, if any.
    pub fn cached_session(&self, session_id: &str) -> Option<Value> {
        let ttl = std::time::Duration::from_secs(self.config.session.cache_ttl_s);
        self.session_cache
            .read()
            .get(&format!("session:{session_id}"))
            .filter(|entry| entry.fetched_at.elapsed() < ttl)
            .map(|entry| entry.snapshot.clone())
    }

    pub fn invalidate_session(&self, session_id: &str) {
        self.session_cache
            .write()
            .remove(&format!("session:{session_id}"));
    }

    /// Check a presented bearer token against the startup-resolved
    /// digest. No configured digest means dev mode: everything passes.
    pub fn bearer_token_matches(&self, presented: Option<&str>) -> bool {
        use sha2::{Digest, Sha256};
        use subtle::ConstantTimeEq;

        let Some(expected) = &self.api_token_hash else {
            return true;
        };
        // Hash the presented token first so the comparison runs over
        // fixed-length digests in constant time; a missing header is
        // compared as the empty token rather than short-circuiting.
        let presented = Sha256::digest(presented.unwrap_or_default().as_bytes());
        bool::from(presented.ct_eq(expected.as_slice()))
    }

    /// Drop expired cache entries. Called by the periodic eviction task.
    pub fn evict_stale_cache(&self) -> usize {
        let ttl = std::time::Duration::from_secs(self.config.session.cache_ttl_s);
        let mut cache = self.session_cache.write();
        let before = cache.len();
        cache.retain(|_, entry| entry.fetched_at.elapsed() < ttl);
        before - cache.len()
    }
}

/// Read the bearer token env var once and hash it for constant-time
/// comparison. Unset or empty means dev mode (no auth enforced).
fn resolve_api_token_hash(env_var: &str) -> Option<Vec<u8>> {
    use sha2::{Digest, Sha256};
    match std::env::var(env_var) {
        Ok(token) if !token.is_empty() => {
            tracing::info!(env_var, "API bearer-token auth enabled");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!(env_var, "API bearer-token auth DISABLED — set {env_var} to enable");
            None
        }
    }
}
