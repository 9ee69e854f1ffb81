//! Draft summary generation: turns a finished transcript into the
//! AI-derived artifact a human validator reviews, with confidence
//! scoring and per-CRM stage suggestions.

pub mod export;
pub mod generator;
pub mod stages;

pub use generator::SummaryGenerator;
