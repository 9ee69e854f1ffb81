//! Review questions and response-shape validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cs_domain::error::{Error, Result};
use cs_domain::types::{ActionItem, CrmSuggestion, DraftSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Is the summary accurate?
    Confirmation,
    /// Per-item approve/edit of extracted action items.
    ActionItemsReview,
    /// Approve the suggested updates for one CRM system.
    CrmApproval,
}

/// A single review question presented to the validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationQuestion {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub prompt: String,
    pub required: bool,
    /// Action items under review (`action_items_review` only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ActionItem>>,
    /// Target CRM system (`crm_approval` only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crm_system: Option<String>,
    /// Suggested updates under review (`crm_approval` only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_updates: Option<CrmSuggestion>,
}

/// Generate the question set for a draft: one confirmation, one
/// action-items review when items were extracted, and one CRM approval
/// per suggested system.
pub fn generate_questions(draft: &DraftSummary) -> Vec<ValidationQuestion> {
    let mut questions = vec![ValidationQuestion {
        id: "confirm_summary".into(),
        question_type: QuestionType::Confirmation,
        prompt: "Does this summary accurately reflect the meeting?".into(),
        required: true,
        items: None,
        crm_system: None,
        suggested_updates: None,
    }];

    if !draft.action_items.is_empty() {
        questions.push(ValidationQuestion {
            id: "action_items".into(),
            question_type: QuestionType::ActionItemsReview,
            prompt: "Review the extracted action items; approve or edit each.".into(),
            required: true,
            items: Some(draft.action_items.clone()),
            crm_system: None,
            suggested_updates: None,
        });
    }

    let mut systems: Vec<&String> = draft.suggested_crm_updates.keys().collect();
    systems.sort();
    for system in systems {
        questions.push(ValidationQuestion {
            id: format!("crm_{system}"),
            question_type: QuestionType::CrmApproval,
            prompt: format!("Approve the suggested {system} updates?"),
            required: true,
            items: None,
            crm_system: Some(system.clone()),
            suggested_updates: draft.suggested_crm_updates.get(system).cloned(),
        });
    }

    questions
}

/// Validate a response against the question's expected shape.
pub fn validate_response(question: &ValidationQuestion, response: &Value) -> Result<()> {
    let obj = response.as_object().ok_or_else(|| {
        Error::Validation(format!(
            "response to question {} must be a JSON object",
            question.id
        ))
    })?;

    match question.question_type {
        QuestionType::Confirmation => {
            if !obj.get("confirmed").is_some_and(Value::is_boolean) {
                return Err(Error::Validation(format!(
                    "question {} requires a boolean `confirmed` field",
                    question.id
                )));
            }
            if let Some(edited) = obj.get("edited_summary") {
                if !edited.is_string() {
                    return Err(Error::Validation(
                        "`edited_summary` must be a string".into(),
                    ));
                }
            }
        }
        QuestionType::ActionItemsReview => {
            if !obj.get("approved_items").is_some_and(Value::is_array) {
                return Err(Error::Validation(format!(
                    "question {} requires an `approved_items` array",
                    question.id
                )));
            }
        }
        QuestionType::CrmApproval => {
            if !obj.get("approved").is_some_and(Value::is_boolean) {
                return Err(Error::Validation(format!(
                    "question {} requires a boolean `approved` field",
                    question.id
                )));
            }
            if let Some(updates) = obj.get("updates") {
                if !updates.is_object() {
                    return Err(Error::Validation("`updates` must be an object".into()));
                }
            }
        }
    }
    Ok(())
}
