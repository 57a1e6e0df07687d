//! Data models

pub mod closure;
pub mod exception;
pub mod incident;

pub use closure::{ClosureStatus, DetailRow, JobStatus, ReprocessResponse};
pub use exception::{DraftAction, ExceptionDraft, ExceptionKey, ExceptionRequest};
pub use incident::{AffectedElement, ClosureId, Incident, IncidentType, SetId, Severity};
