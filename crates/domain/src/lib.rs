//! Shared domain types for CallScribe: core entities, configuration,
//! the common error type, and structured trace events.

pub mod config;
pub mod error;
pub mod trace;
pub mod types;

pub use error::{Error, Result};
