//! Validation sessions: creation, response collection, completion, and
//! irreversible expiry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use cs_domain::config::ValidationConfig;
use cs_domain::error::{Error, Result};
use cs_domain::trace::TraceEvent;
use cs_domain::types::DraftSummary;

use crate::questions::{generate_questions, validate_response, QuestionType, ValidationQuestion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    InProgress,
    Completed,
    Expired,
}

/// One validator's review of one draft summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSession {
    pub id: Uuid,
    pub draft_summary_id: Uuid,
    pub validator: String,
    pub status: ValidationStatus,
    pub questions: Vec<ValidationQuestion>,
    /// Responses keyed by question id.
    pub responses: HashMap<String, Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub validated_summary: Option<String>,
    /// Approved updates keyed by CRM system; present once completed.
    pub approved_crm_updates: Option<HashMap<String, Value>>,
    /// Original summary text, kept to compose the validated summary when
    /// the validator does not edit it.
    draft_summary_text: String,
}

impl ValidationSession {
    /// A session is sync-eligible only in this state.
    pub fn is_completed(&self) -> bool {
        self.status == ValidationStatus::Completed
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workflow
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ValidationWorkflow {
    config: ValidationConfig,
    sessions: RwLock<HashMap<Uuid, ValidationSession>>,
    state_path: Option<PathBuf>,
}

impl ValidationWorkflow {
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            state_path: None,
        }
    }

    /// Load or create the workflow state at
    /// `state_path/validation_sessions.json`.
    pub fn with_state_path(config: ValidationConfig, state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let file = state_path.join("validation_sessions.json");
        let sessions = if file.exists() {
            let raw = std::fs::read_to_string(&file).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        tracing::info!(
            sessions = sessions.len(),
            path = %file.display(),
            "validation workflow state loaded"
        );
        Ok(Self {
            config,
            sessions: RwLock::new(sessions),
            state_path: Some(file),
        })
    }

    /// Persist the current sessions to disk (no-op without a state path).
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let sessions = self.sessions.read();
        let json = serde_json::to_string_pretty(&*sessions)?;
        std::fs::write(path, json).map_err(Error::Io)?;
        Ok(())
    }

    /// Create (or return the existing) validation session for a draft.
    /// A draft owns at most one session.
    pub fn create_session(
        &self,
        draft: &DraftSummary,
        validator: &str,
    ) -> Result<ValidationSession> {
        let mut sessions = self.sessions.write();
        if let Some(existing) = sessions
            .values()
            .find(|s| s.draft_summary_id == draft.id)
        {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let questions = generate_questions(draft);
        let session = ValidationSession {
            id: Uuid::new_v4(),
            draft_summary_id: draft.id,
            validator: validator.to_string(),
            status: ValidationStatus::Pending,
            questions,
            responses: HashMap::new(),
            started_at: now,
            completed_at: None,
            expires_at: now + Duration::seconds(self.config.expiry_s as i64),
            validated_summary: None,
            approved_crm_updates: None,
            draft_summary_text: draft.summary_text.clone(),
        };

        TraceEvent::ValidationCreated {
            validation_session_id: session.id.to_string(),
            draft_id: draft.id.to_string(),
            question_count: session.questions.len(),
        }
        .emit();
        tracing::info!(
            validation_session_id = %session.id,
            validator,
            questions = session.questions.len(),
            "validation session created"
        );

        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    pub fn get(&self, id: Uuid) -> Option<ValidationSession> {
        // Reads surface expiry too, so a stale pending session is never
        // reported as reviewable.
        self.check_expiry(id);
        self.sessions.read().get(&id).cloned()
    }

    pub fn questions(&self, id: Uuid) -> Result<Vec<ValidationQuestion>> {
        self.get(id)
            .map(|s| s.questions)
            .ok_or_else(|| Error::Validation(format!("validation session {id} not found")))
    }

    /// Accept one response. Transitions `pending → in_progress` on the
    /// first response; rejects responses once completed or expired.
    pub fn submit_response(&self, id: Uuid, question_id: &str, response: Value) -> Result<()> {
        self.check_expiry(id);
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| Error::Validation(format!("validation session {id} not found")))?;

        match session.status {
            ValidationStatus::Completed => {
                return Err(Error::Validation(
                    "validation session is already completed".into(),
                ))
            }
            ValidationStatus::Expired => {
                return Err(Error::Validation("validation session has expired".into()))
            }
            ValidationStatus::Pending | ValidationStatus::InProgress => {}
        }

        let question = session
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| Error::Validation(format!("unknown question {question_id}")))?;
        validate_response(question, &response)?;

        session.responses.insert(question_id.to_string(), response);
        if session.status == ValidationStatus::Pending {
            session.status = ValidationStatus::InProgress;
        }
        Ok(())
    }

    /// Finalize the session: requires every required question answered,
    /// then composes the validated summary and approved CRM updates.
    pub fn complete(&self, id: Uuid) -> Result<ValidationSession> {
        self.check_expiry(id);
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| Error::Validation(format!("validation session {id} not found")))?;

        match session.status {
            ValidationStatus::Completed => return Ok(session.clone()),
            ValidationStatus::Expired => {
                return Err(Error::Validation("validation session has expired".into()))
            }
            _ => {}
        }

        let unanswered: Vec<&str> = session
            .questions
            .iter()
            .filter(|q| q.required && !session.responses.contains_key(&q.id))
            .map(|q| q.id.as_str())
            .collect();
        if !unanswered.is_empty() {
            return Err(Error::Validation(format!(
                "required questions unanswered: {}",
                unanswered.join(", ")
            )));
        }

        session.validated_summary = Some(compose_validated_summary(session));
        session.approved_crm_updates = Some(compose_approved_updates(session));
        session.status = ValidationStatus::Completed;
        session.completed_at = Some(Utc::now());

        TraceEvent::ValidationCompleted {
            validation_session_id: session.id.to_string(),
            approved_systems: session
                .approved_crm_updates
                .as_ref()
                .map(HashMap::len)
                .unwrap_or(0),
        }
        .emit();
        tracing::info!(validation_session_id = %session.id, "validation session completed");
        Ok(session.clone())
    }

    /// Expire every overdue session. Returns how many were expired.
    pub fn expire_overdue(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let mut expired = 0;
        for session in sessions.values_mut() {
            if matches!(
                session.status,
                ValidationStatus::Pending | ValidationStatus::InProgress
            ) && now > session.expires_at
            {
                session.status = ValidationStatus::Expired;
                expired += 1;
                TraceEvent::ValidationExpired {
                    validation_session_id: session.id.to_string(),
                }
                .emit();
                tracing::warn!(validation_session_id = %session.id, "validation session expired");
            }
        }
        expired
    }

    pub fn sessions_for_draft(&self, draft_summary_id: Uuid) -> Vec<ValidationSession> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.draft_summary_id == draft_summary_id)
            .cloned()
            .collect()
    }

    pub fn delete_for_draft(&self, draft_summary_id: Uuid) -> Vec<Uuid> {
        let mut sessions = self.sessions.write();
        let ids: Vec<Uuid> = sessions
            .values()
            .filter(|s| s.draft_summary_id == draft_summary_id)
            .map(|s| s.id)
            .collect();
        for id in &ids {
            sessions.remove(id);
        }
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Mark the single session expired if its deadline passed. Expiry is
    /// checked on every touch, not just by the background sweep.
    fn check_expiry(&self, id: Uuid) {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get_mut(&id) {
            if matches!(
                session.status,
                ValidationStatus::Pending | ValidationStatus::InProgress
            ) && now > session.expires_at
            {
                session.status = ValidationStatus::Expired;
                TraceEvent::ValidationExpired {
                    validation_session_id: session.id.to_string(),
                }
                .emit();
                tracing::warn!(validation_session_id = %session.id, "validation session expired");
            }
        }
    }
}

/// The validated summary is the validator's edit when provided, else the
/// original draft text.
fn compose_validated_summary(session: &ValidationSession) -> String {
    session
        .responses
        .get("confirm_summary")
        .and_then(|r| r.get("edited_summary"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| session.draft_summary_text.clone())
}

/// Approved updates: for each approved CRM question, the validator's
/// `updates` object when provided, else the suggested updates.
fn compose_approved_updates(session: &ValidationSession) -> HashMap<String, Value> {
    let mut approved = HashMap::new();
    for question in &session.questions {
        if question.question_type != QuestionType::CrmApproval {
            continue;
        }
        let Some(system) = &question.crm_system else {
            continue;
        };
        let Some(response) = session.responses.get(&question.id) else {
            continue;
        };
        if response.get("approved").and_then(Value::as_bool) != Some(true) {
            continue;
        }
        let updates = response
            .get("updates")
            .filter(|u| u.as_object().is_some_and(|o| !o.is_empty()))
            .cloned()
            .or_else(|| {
                question
                    .suggested_updates
                    .as_ref()
                    .and_then(|s| serde_json::to_value(s).ok())
            })
            .unwrap_or_else(|| Value::Object(Default::default()));
        approved.insert(system.clone(), updates);
    }
    approved
}
