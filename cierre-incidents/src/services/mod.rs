//! Reconciliation and reprocessing services

pub mod detail_cache;
pub mod draft_store;
pub mod reconciler;
pub mod reprocess_orchestrator;
pub mod snapshot_loader;
pub mod status_poller;
pub mod synchronizer;

pub use detail_cache::DetailCache;
pub use draft_store::{DraftStore, ToggleOutcome};
pub use reconciler::BatchSummary;
pub use reprocess_orchestrator::{
    ConfirmedReprocess, CycleFailure, FailedStage, OrchestratorState, RefreshOutcome,
    ReprocessOrchestrator, ReprocessOutcome, ReprocessPlan, ReprocessReceipt,
};
pub use snapshot_loader::{Snapshot, SnapshotLoader};
pub use status_poller::PollerHandle;
pub use synchronizer::{SyncReport, Synchronizer};
