use serde::{Deserialize, Serialize};
use serde_json::Value;

use cs_domain::error::{Error, Result};
use cs_domain::types::DraftSummary;
use cs_validation::ValidationSession;

/// The formatted, system-agnostic payload a connector writes to its CRM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmPayload {
    /// Stable token derived from (validation session, CRM system);
    /// connectors use it as the CRM external id or for a dedupe
    /// read-before-write.
    pub idempotency_token: String,
    pub subject: String,
    pub description: String,
    pub stage: Option<String>,
    pub follow_up: Vec<String>,
    /// The validator-approved field updates for this system.
    pub approved_updates: Value,
}

/// Derive the idempotency token for a (validation session, system) pair.
pub fn idempotency_token(validation: &ValidationSession, system: &str) -> String {
    format!("{}:{system}", validation.id)
}

/// Build the payload for one CRM system from a completed validation.
pub fn build_payload(
    validation: &ValidationSession,
    draft: &DraftSummary,
    system: &str,
) -> Result<CrmPayload> {
    let approved = validation
        .approved_crm_updates
        .as_ref()
        .and_then(|updates| updates.get(system))
        .cloned()
        .ok_or_else(|| {
            Error::Validation(format!(
                "validation session {} has no approved updates for {system}",
                validation.id
            ))
        })?;

    let suggestion = draft.suggested_crm_updates.get(system);
    let stage = approved
        .get("suggested_stage")
        .or_else(|| approved.get("stage"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| suggestion.map(|s| s.suggested_stage.clone()));

    let summary = validation
        .validated_summary
        .clone()
        .unwrap_or_else(|| draft.summary_text.clone());

    Ok(CrmPayload {
        idempotency_token: idempotency_token(validation, system),
        subject: suggestion
            .map(|s| s.subject.clone())
            .unwrap_or_else(|| "Meeting outcome".into()),
        description: summary,
        stage,
        follow_up: suggestion.map(|s| s.follow_up.clone()).unwrap_or_default(),
        approved_updates: approved,
    })
}

/// Trait every CRM connector must implement.
///
/// `write` must be idempotent with respect to the payload's token:
/// calling it twice for the same token yields one CRM object.
#[async_trait::async_trait]
pub trait CrmConnector: Send + Sync {
    /// The system this connector serves (`salesforce` / `hubspot` /
    /// `creatio`).
    fn system(&self) -> &str;

    /// Format a completed validation into this system's payload.
    fn format_from_validation(
        &self,
        validation: &ValidationSession,
        draft: &DraftSummary,
    ) -> Result<CrmPayload> {
        build_payload(validation, draft, self.system())
    }

    /// Perform the idempotent write. Returns the CRM record id.
    async fn write(&self, payload: &CrmPayload) -> Result<String>;
}

/// Map an HTTP response status onto the CRM error taxonomy: 5xx and
/// transport failures retry, 4xx rejections do not.
pub fn status_error(system: &str, status: reqwest::StatusCode, body: &str) -> Error {
    Error::crm(
        system,
        format!("{status}: {body}"),
        status.is_server_error(),
    )
}
