//! Reprocess orchestrator state machine
//!
//! # State Progression
//! IDLE → SYNCING → REPROCESSING → RELOADING → IDLE
//!
//! Any active state may move to FAILED, which holds the originating error until the
//! user acknowledges it (back to IDLE) or retries (a new SYNCING).

use crate::error::IncidentError;
use crate::models::ExceptionKey;

/// Stage that was active when a cycle failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStage {
    Syncing,
    Reprocessing,
    Reloading,
}

/// Why a cycle stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleFailure {
    pub stage: FailedStage,
    /// The originating error, verbatim
    pub error: IncidentError,
    /// Draft that stopped synchronization, for `Syncing` failures
    pub failed_at: Option<ExceptionKey>,
    /// Drafts still pending in the store when the cycle failed
    pub unsynced: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    /// Applying `pending` drafts
    Syncing { pending: usize },
    /// Waiting on the synchronous reprocess call
    Reprocessing,
    /// Forced-fresh reload after the job produced `new_iteration`
    Reloading { new_iteration: i64 },
    Failed(CycleFailure),
}

impl OrchestratorState {
    pub fn name(&self) -> &'static str {
        match self {
            OrchestratorState::Idle => "Idle",
            OrchestratorState::Syncing { .. } => "Syncing",
            OrchestratorState::Reprocessing => "Reprocessing",
            OrchestratorState::Reloading { .. } => "Reloading",
            OrchestratorState::Failed(_) => "Failed",
        }
    }

    /// Reprocess and soft-refresh requests are only accepted from these states
    pub fn accepts_requests(&self) -> bool {
        matches!(self, OrchestratorState::Idle | OrchestratorState::Failed(_))
    }

    pub fn is_busy(&self) -> bool {
        !self.accepts_requests()
    }

    pub fn failure(&self) -> Option<&CycleFailure> {
        match self {
            OrchestratorState::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_idle_and_failed_accept_requests() {
        let failed = OrchestratorState::Failed(CycleFailure {
            stage: FailedStage::Reprocessing,
            error: IncidentError::Job("x".into()),
            failed_at: None,
            unsynced: 0,
        });

        assert!(OrchestratorState::Idle.accepts_requests());
        assert!(failed.accepts_requests());
        assert!(OrchestratorState::Syncing { pending: 0 }.is_busy());
        assert!(OrchestratorState::Reprocessing.is_busy());
        assert!(OrchestratorState::Reloading { new_iteration: 2 }.is_busy());
        assert_eq!(failed.failure().unwrap().stage, FailedStage::Reprocessing);
    }
}
