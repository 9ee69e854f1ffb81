//! Human-in-the-loop validation workflow.
//!
//! A validation session scopes a validator's review of one draft summary:
//! generated questions, collected responses, and the composed outcome
//! (`validated_summary`, `approved_crm_updates`). CRM sync is gated on a
//! session reaching `completed`; expiry is irreversible and blocks sync.

pub mod questions;
pub mod workflow;

pub use questions::{QuestionType, ValidationQuestion};
pub use workflow::{ValidationSession, ValidationStatus, ValidationWorkflow};
