//! Error types for cierre-incidents
//!
//! Errors carry the server's message verbatim so the user sees exactly what the
//! closure service reported. All variants are cloneable: a failed orchestrator
//! state keeps the originating error while the caller also receives it.

use thiserror::Error;

/// Incident subsystem error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IncidentError {
    /// Transport failure (connect, timeout, broken body); retryable
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status not covered by a more specific variant
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Malformed exception draft, locally detected or rejected by the server (400)
    #[error("Invalid exception: {0}")]
    Validation(String),

    /// Server rejected a create because a conflicting exception exists (409)
    #[error("Conflicting exception: {0}")]
    Conflict(String),

    /// Reprocessing job failed server-side
    #[error("Reprocessing failed: {0}")]
    Job(String),
}

impl IncidentError {
    /// Whether re-invoking the same action may succeed without user changes
    pub fn is_retryable(&self) -> bool {
        match self {
            IncidentError::Network(_) => true,
            IncidentError::Server { status, .. } => *status >= 500,
            IncidentError::Validation(_) | IncidentError::Conflict(_) | IncidentError::Job(_) => {
                false
            }
        }
    }

    /// Short machine-readable kind, used in logs and events
    pub fn kind(&self) -> &'static str {
        match self {
            IncidentError::Network(_) => "network",
            IncidentError::Server { .. } => "server",
            IncidentError::Validation(_) => "validation",
            IncidentError::Conflict(_) => "conflict",
            IncidentError::Job(_) => "job",
        }
    }
}

/// Result type for the incident subsystem
pub type IncidentResult<T> = Result<T, IncidentError>;
