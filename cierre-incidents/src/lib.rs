//! cierre-incidents library interface
//!
//! Incident-exception reconciliation and reprocessing orchestration for the
//! consolidated incidents review of an accounting closure.
//!
//! - [`api`]: closure service interface and its HTTP implementation
//! - [`models`]: incidents, exception drafts and closure responses
//! - [`services`]: draft store, reconciler, synchronizer, orchestrator, poller
//! - [`session`]: scoped review session tying them together

pub mod api;
pub mod error;
pub mod models;
pub mod services;
pub mod session;

pub use crate::error::{IncidentError, IncidentResult};
