//! CRM sync: pluggable per-system connectors and the idempotent,
//! validation-gated sync engine.
//!
//! No CRM write ever happens before a validation session reaches
//! `completed`. Retries of the same (validation session, CRM system)
//! pair carry an idempotency token so they can never mint duplicate CRM
//! objects.

pub mod creatio;
pub mod hubspot;
pub mod registry;
pub mod salesforce;
pub mod sync;
pub mod traits;

pub use registry::CrmRegistry;
pub use sync::{CrmSyncRecord, SyncEngine, SyncStatus};
pub use traits::{CrmConnector, CrmPayload};
