//! The CRM sync engine: validation gate, idempotency, retry with
//! backoff, and sync-record bookkeeping.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cs_domain::config::CrmConfig;
use cs_domain::error::{Error, Result};
use cs_domain::trace::TraceEvent;
use cs_domain::types::DraftSummary;
use cs_validation::ValidationSession;

use crate::registry::CrmRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Persistent record of sync attempts for one (validation session, CRM
/// system) pair. At most one such record ever reaches `completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmSyncRecord {
    pub validation_session_id: Uuid,
    pub crm_system: String,
    pub sync_status: SyncStatus,
    pub crm_record_id: Option<String>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub struct SyncEngine {
    registry: CrmRegistry,
    config: CrmConfig,
    /// Keyed by `{validation_session_id}:{crm_system}` (the idempotency
    /// token).
    records: RwLock<HashMap<String, CrmSyncRecord>>,
    state_path: Option<PathBuf>,
}

impl SyncEngine {
    pub fn new(registry: CrmRegistry, config: CrmConfig) -> Self {
        Self {
            registry,
            config,
            records: RwLock::new(HashMap::new()),
            state_path: None,
        }
    }

    /// Load or create the sync-record state at
    /// `state_path/crm_sync_records.json`.
    pub fn with_state_path(
        registry: CrmRegistry,
        config: CrmConfig,
        state_path: &Path,
    ) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let file = state_path.join("crm_sync_records.json");
        let records = if file.exists() {
            let raw = std::fs::read_to_string(&file).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        tracing::info!(
            records = records.len(),
            path = %file.display(),
            "crm sync records loaded"
        );
        Ok(Self {
            registry,
            config,
            records: RwLock::new(records),
            state_path: Some(file),
        })
    }

    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let records = self.records.read();
        let json = serde_json::to_string_pretty(&*records)?;
        std::fs::write(path, json).map_err(Error::Io)?;
        Ok(())
    }

    /// Sync one validated meeting outcome into one CRM system.
    ///
    /// Gate: the validation session must be `completed` and must have
    /// approved updates for the system. A previously completed record is
    /// returned unchanged; otherwise the write retries with exponential
    /// backoff on retryable failures up to the configured cap.
    pub async fn sync(
        &self,
        validation: &ValidationSession,
        draft: &DraftSummary,
        crm_system: &str,
    ) -> Result<CrmSyncRecord> {
        if !validation.is_completed() {
            return Err(Error::ValidationGate(format!(
                "validation session {} is {:?}, CRM sync requires completed",
                validation.id, validation.status
            )));
        }

        let key = format!("{}:{crm_system}", validation.id);

        // Idempotency guard: a completed pair never syncs again.
        if let Some(existing) = self.records.read().get(&key) {
            if existing.sync_status == SyncStatus::Completed {
                tracing::info!(
                    validation_session_id = %validation.id,
                    crm_system,
                    "sync already completed, returning existing record"
                );
                return Ok(existing.clone());
            }
        }

        let connector = self.registry.get(crm_system)?;
        let payload = connector.format_from_validation(validation, draft)?;

        // Upsert the in-progress record, carrying forward attempt counts
        // from earlier failed runs.
        {
            let mut records = self.records.write();
            records
                .entry(key.clone())
                .and_modify(|r| r.sync_status = SyncStatus::InProgress)
                .or_insert_with(|| CrmSyncRecord {
                    validation_session_id: validation.id,
                    crm_system: crm_system.to_string(),
                    sync_status: SyncStatus::InProgress,
                    crm_record_id: None,
                    attempts: 0,
                    last_error: None,
                    synced_at: None,
                    created_at: Utc::now(),
                });
        }

        loop {
            let attempt = {
                let mut records = self.records.write();
                let record = records.get_mut(&key).expect("record upserted above");
                record.attempts += 1;
                record.attempts
            };

            TraceEvent::CrmSyncAttempt {
                validation_session_id: validation.id.to_string(),
                crm_system: crm_system.to_string(),
                attempt,
            }
            .emit();

            match connector.write(&payload).await {
                Ok(crm_record_id) => {
                    let mut records = self.records.write();
                    let record = records.get_mut(&key).expect("record upserted above");
                    record.sync_status = SyncStatus::Completed;
                    record.crm_record_id = Some(crm_record_id.clone());
                    record.synced_at = Some(Utc::now());
                    record.last_error = None;

                    TraceEvent::CrmSyncCompleted {
                        validation_session_id: validation.id.to_string(),
                        crm_system: crm_system.to_string(),
                        crm_record_id,
                        attempts: record.attempts,
                    }
                    .emit();
                    tracing::info!(
                        validation_session_id = %validation.id,
                        crm_system,
                        attempts = record.attempts,
                        "crm sync completed"
                    );
                    return Ok(record.clone());
                }
                Err(e) => {
                    let exhausted = attempt >= self.config.max_sync_attempts;
                    let retryable = e.is_retryable_crm();
                    {
                        let mut records = self.records.write();
                        let record = records.get_mut(&key).expect("record upserted above");
                        record.last_error = Some(e.to_string());
                        if exhausted || !retryable {
                            record.sync_status = SyncStatus::Failed;
                        }
                    }

                    if exhausted || !retryable {
                        TraceEvent::CrmSyncFailed {
                            validation_session_id: validation.id.to_string(),
                            crm_system: crm_system.to_string(),
                            attempts: attempt,
                            error: e.to_string(),
                        }
                        .emit();
                        tracing::error!(
                            validation_session_id = %validation.id,
                            crm_system,
                            attempts = attempt,
                            error = %e,
                            "crm sync failed"
                        );
                        return Err(e);
                    }

                    let delay_s = self.config.retry_delay_base_s.pow(attempt);
                    tracing::warn!(
                        validation_session_id = %validation.id,
                        crm_system,
                        attempt,
                        delay_s,
                        error = %e,
                        "crm sync attempt failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(delay_s)).await;
                }
            }
        }
    }

    /// Sync every system the validator approved. Individual failures do
    /// not stop the remaining systems.
    pub async fn sync_all(
        &self,
        validation: &ValidationSession,
        draft: &DraftSummary,
    ) -> Vec<(String, Result<CrmSyncRecord>)> {
        let mut systems: Vec<String> = validation
            .approved_crm_updates
            .as_ref()
            .map(|updates| updates.keys().cloned().collect())
            .unwrap_or_default();
        systems.sort();

        let mut results = Vec::new();
        for system in systems {
            let result = self.sync(validation, draft, &system).await;
            results.push((system, result));
        }
        results
    }

    pub fn record(&self, validation_session_id: Uuid, crm_system: &str) -> Option<CrmSyncRecord> {
        self.records
            .read()
            .get(&format!("{validation_session_id}:{crm_system}"))
            .cloned()
    }

    pub fn records_for_validation(&self, validation_session_id: Uuid) -> Vec<CrmSyncRecord> {
        self.records
            .read()
            .values()
            .filter(|r| r.validation_session_id == validation_session_id)
            .cloned()
            .collect()
    }

    pub fn delete_for_validation(&self, validation_session_id: Uuid) {
        self.records
            .write()
            .retain(|_, r| r.validation_session_id != validation_session_id);
    }

    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }
}
