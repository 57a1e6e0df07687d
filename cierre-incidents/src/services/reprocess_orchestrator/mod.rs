//! Reprocess orchestrator
//!
//! Coordinates one review of a closure's consolidated incidents: the rendered
//! snapshot, the pending exception drafts, the expanded-detail cache, and the
//! sync → reprocess → fresh-reload cycle.
//!
//! # Cycle
//! - **SYNCING**: apply the pending batch in insertion order. Anything short of full
//!   success fails the cycle; applied drafts leave the store, the rest stay.
//! - **REPROCESSING**: synchronous reprocess call; the job has finished when it returns.
//! - **RELOADING**: forced-fresh load (never the cached path, which still reflects
//!   pre-reprocessing data), then the detail cache is cleared.
//!
//! Reprocess and soft-refresh requests made while a cycle is active are rejected
//! without any network call. State is published on a `watch` channel so pollers can
//! pause while a cycle runs.

mod state;

pub use state::{CycleFailure, FailedStage, OrchestratorState};

use crate::api::{ClosureApi, Freshness};
use crate::error::{IncidentError, IncidentResult};
use crate::models::{
    ClosureId, DetailRow, DraftAction, ExceptionDraft, ExceptionKey, Incident, IncidentType,
    JobStatus, SetId,
};
use crate::services::detail_cache::{self, DetailCache};
use crate::services::draft_store::{DraftStore, ToggleOutcome};
use crate::services::reconciler::{self, BatchSummary};
use crate::services::snapshot_loader::{Snapshot, SnapshotLoader};
use crate::services::synchronizer::Synchronizer;
use chrono::{DateTime, Utc};
use cierre_common::events::{ClosureEvent, EventBus};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};

/// Invoked once per successful full cycle
pub type ReprocessedCallback = Box<dyn Fn(&ReprocessReceipt) + Send + Sync>;

/// Summary of a successful cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReprocessReceipt {
    pub closure_id: ClosureId,
    pub new_iteration: i64,
    pub status: JobStatus,
    /// Drafts applied during SYNCING
    pub synced: usize,
    /// Incidents in the fresh snapshot
    pub incidents: usize,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReprocessOutcome {
    Completed(ReprocessReceipt),
    /// Another cycle was active; nothing was sent
    Rejected { state: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed { incidents: usize },
    /// A newer snapshot was installed while this load was in flight; result dropped
    Superseded,
    Rejected { state: &'static str },
}

/// What a reprocess cycle would synchronize, shown to the user before confirming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReprocessPlan {
    pub closure_id: ClosureId,
    pub batch: Vec<ExceptionDraft>,
    pub summary: BatchSummary,
    /// Drafts targeting elements absent from the current snapshot
    pub orphaned: Vec<ExceptionKey>,
    /// Drafts that repeat server truth; a redundant `Create` fails with a conflict
    pub redundant: Vec<ExceptionKey>,
}

impl ReprocessPlan {
    /// Record the user's explicit confirmation
    pub fn confirm(self) -> ConfirmedReprocess {
        ConfirmedReprocess { plan: self }
    }
}

/// A plan the user confirmed; the only way to start a cycle
#[derive(Debug, Clone)]
pub struct ConfirmedReprocess {
    plan: ReprocessPlan,
}

impl ConfirmedReprocess {
    pub fn plan(&self) -> &ReprocessPlan {
        &self.plan
    }
}

#[derive(Default)]
struct SnapshotSlot {
    current: Option<Snapshot>,
    /// Bumped on every install; a soft refresh only installs if unchanged since it began
    epoch: u64,
}

pub struct ReprocessOrchestrator {
    closure_id: ClosureId,
    api: Arc<dyn ClosureApi>,
    loader: SnapshotLoader,
    synchronizer: Synchronizer,
    drafts: Mutex<DraftStore>,
    snapshot: RwLock<SnapshotSlot>,
    details: Mutex<DetailCache>,
    state_tx: watch::Sender<OrchestratorState>,
    event_bus: EventBus,
    on_reprocessed: Option<ReprocessedCallback>,
}

impl ReprocessOrchestrator {
    pub fn new(closure_id: ClosureId, api: Arc<dyn ClosureApi>, event_bus: EventBus) -> Self {
        let (state_tx, _) = watch::channel(OrchestratorState::Idle);
        Self {
            closure_id,
            loader: SnapshotLoader::new(Arc::clone(&api), event_bus.clone()),
            synchronizer: Synchronizer::new(Arc::clone(&api), event_bus.clone()),
            api,
            drafts: Mutex::new(DraftStore::new()),
            snapshot: RwLock::new(SnapshotSlot::default()),
            details: Mutex::new(DetailCache::new()),
            state_tx,
            event_bus,
            on_reprocessed: None,
        }
    }

    pub fn with_on_reprocessed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ReprocessReceipt) + Send + Sync + 'static,
    {
        self.on_reprocessed = Some(Box::new(callback));
        self
    }

    pub fn closure_id(&self) -> ClosureId {
        self.closure_id
    }

    pub fn state(&self) -> OrchestratorState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<OrchestratorState> {
        self.state_tx.subscribe()
    }

    // ------------------------------------------------------------------
    // Snapshot and view
    // ------------------------------------------------------------------

    pub async fn snapshot(&self) -> Option<Snapshot> {
        self.snapshot.read().await.current.clone()
    }

    /// Snapshot with pending drafts applied; empty until the first load
    pub async fn merged_view(&self) -> Vec<Incident> {
        let slot = self.snapshot.read().await;
        let drafts = self.drafts.lock().await;
        match slot.current.as_ref() {
            Some(snapshot) => reconciler::merged_view(&snapshot.incidents, &drafts),
            None => Vec::new(),
        }
    }

    /// Soft refresh ("Actualizar")
    ///
    /// Reloads through the cached path and leaves drafts untouched. Errors are
    /// returned directly and the rendered snapshot is kept.
    pub async fn refresh(&self) -> IncidentResult<RefreshOutcome> {
        let state = self.state();
        if state.is_busy() {
            tracing::info!(
                closure_id = %self.closure_id,
                state = state.name(),
                "Refresh rejected while a reprocess cycle is active"
            );
            return Ok(RefreshOutcome::Rejected { state: state.name() });
        }

        let epoch = self.snapshot.read().await.epoch;
        let snapshot = self.loader.load(self.closure_id, Freshness::Cached).await?;
        let incidents = snapshot.incidents.len();

        let mut slot = self.snapshot.write().await;
        if slot.epoch != epoch {
            tracing::debug!(
                closure_id = %self.closure_id,
                "Cached snapshot arrived after a newer one was installed, dropping it"
            );
            return Ok(RefreshOutcome::Superseded);
        }
        slot.current = Some(snapshot);
        slot.epoch += 1;

        Ok(RefreshOutcome::Refreshed { incidents })
    }

    // ------------------------------------------------------------------
    // Drafts
    // ------------------------------------------------------------------

    /// Toggle the exception flag of an affected element of the current snapshot
    pub async fn toggle_exception(
        &self,
        incident_type: IncidentType,
        account_code: &str,
        set_id: Option<SetId>,
        reason: &str,
    ) -> IncidentResult<ToggleOutcome> {
        let element = {
            let slot = self.snapshot.read().await;
            slot.current
                .as_ref()
                .and_then(|s| s.incidents.iter().find(|i| i.incident_type == incident_type))
                .and_then(|i| i.find_element(account_code, set_id))
                .cloned()
        };

        let element = element.ok_or_else(|| {
            IncidentError::Validation(format!(
                "account {} is not affected by {} in the current snapshot",
                account_code, incident_type
            ))
        })?;

        let outcome = self
            .drafts
            .lock()
            .await
            .toggle(&element, incident_type, reason)?;
        if element.has_exception && outcome == ToggleOutcome::Drafted(DraftAction::Create) {
            tracing::warn!(
                closure_id = %self.closure_id,
                account_code,
                %incident_type,
                "Re-marked an element whose exception exists on the server; syncing this draft will conflict"
            );
        }
        Ok(outcome)
    }

    /// Request an explicit mark (`Create`) or unmark (`Delete`) by key
    ///
    /// When the current snapshot shows the element, the request follows the toggle
    /// rules against its server flag: no-op requests are refused and an unmark of a
    /// local mark cancels it. Keys absent from the snapshot are drafted as given and
    /// reported as orphaned by [`plan`](Self::plan).
    pub async fn upsert_draft(&self, draft: ExceptionDraft) -> IncidentResult<ToggleOutcome> {
        let server_flag = {
            let slot = self.snapshot.read().await;
            slot.current
                .as_ref()
                .and_then(|s| reconciler::server_flag(&s.incidents, &draft.key))
        };

        let mut drafts = self.drafts.lock().await;
        match server_flag {
            Some(flag) => drafts.apply_intent(draft, flag),
            None => {
                let action = draft.action;
                drafts.upsert(draft)?;
                Ok(ToggleOutcome::Drafted(action))
            }
        }
    }

    pub async fn pending_drafts(&self) -> Vec<ExceptionDraft> {
        self.drafts.lock().await.pending_batch()
    }

    /// Drop every pending draft (session teardown)
    pub async fn discard_drafts(&self) -> usize {
        self.drafts.lock().await.clear()
    }

    // ------------------------------------------------------------------
    // Expanded incident detail
    // ------------------------------------------------------------------

    pub async fn expand_incident(&self, incident_type: IncidentType) -> IncidentResult<Vec<DetailRow>> {
        let mut cache = self.details.lock().await;
        detail_cache::fetch_detail(&mut cache, self.api.as_ref(), self.closure_id, incident_type)
            .await
    }

    pub async fn collapse_incident(&self, incident_type: IncidentType) {
        self.details.lock().await.evict(incident_type);
    }

    pub async fn cached_detail_count(&self) -> usize {
        self.details.lock().await.len()
    }

    // ------------------------------------------------------------------
    // Reprocess cycle
    // ------------------------------------------------------------------

    /// What a cycle started now would synchronize
    pub async fn plan(&self) -> ReprocessPlan {
        let slot = self.snapshot.read().await;
        let drafts = self.drafts.lock().await;
        let batch = reconciler::net_batch(&drafts);
        let (orphaned, redundant) = match slot.current.as_ref() {
            Some(s) => (
                reconciler::orphaned_drafts(&s.incidents, &drafts),
                reconciler::redundant_drafts(&s.incidents, &drafts),
            ),
            None => (Vec::new(), Vec::new()),
        };
        if !redundant.is_empty() {
            tracing::warn!(
                closure_id = %self.closure_id,
                redundant = redundant.len(),
                "Plan contains drafts that repeat server state"
            );
        }

        ReprocessPlan {
            closure_id: self.closure_id,
            summary: BatchSummary::of(&batch),
            batch,
            orphaned,
            redundant,
        }
    }

    /// Run sync → reprocess → forced-fresh reload
    ///
    /// Exactly the confirmed batch is synchronized. A plan for another closure, or one
    /// whose batch no longer matches the pending drafts, is refused with `Validation`
    /// before any state change or network call. Returns the originating error when the
    /// cycle fails; the orchestrator stays in `Failed` holding the same error.
    pub async fn reprocess(&self, confirmed: ConfirmedReprocess) -> IncidentResult<ReprocessOutcome> {
        let closure_id = self.closure_id;
        let plan = confirmed.plan();

        if plan.closure_id != closure_id {
            return Err(IncidentError::Validation(format!(
                "reprocess was confirmed for closure {}, not {}",
                plan.closure_id, closure_id
            )));
        }

        // Cycles only begin under the draft lock, so the comparison and the
        // transition see the same batch.
        let batch = {
            let drafts = self.drafts.lock().await;
            let state = self.state();
            if state.is_busy() {
                tracing::info!(
                    closure_id = %closure_id,
                    state = state.name(),
                    "Reprocess rejected while a cycle is active"
                );
                return Ok(ReprocessOutcome::Rejected { state: state.name() });
            }

            let current = drafts.pending_batch();
            if current != plan.batch {
                tracing::warn!(
                    closure_id = %closure_id,
                    confirmed = plan.batch.len(),
                    current = current.len(),
                    "Draft batch changed since the plan was confirmed"
                );
                return Err(IncidentError::Validation(
                    "exception drafts changed since the reprocess was confirmed; review and confirm again"
                        .to_string(),
                ));
            }

            if let Err(state) = self.try_begin(OrchestratorState::Syncing {
                pending: current.len(),
            }) {
                tracing::info!(
                    closure_id = %closure_id,
                    state,
                    "Reprocess rejected while a cycle is active"
                );
                return Ok(ReprocessOutcome::Rejected { state });
            }
            current
        };

        // SYNCING
        let report = self.synchronizer.sync(closure_id, &batch).await;
        self.drafts
            .lock()
            .await
            .acknowledge(&report.applied, &batch);

        if !report.is_complete(batch.len()) {
            let error = report.error.clone().unwrap_or_else(|| {
                IncidentError::Validation(format!(
                    "{} of {} exceptions applied",
                    report.applied.len(),
                    batch.len()
                ))
            });
            return Err(self
                .fail(FailedStage::Syncing, error, report.failed_at.clone())
                .await);
        }

        // REPROCESSING
        self.transition(OrchestratorState::Reprocessing);
        let response = match self.api.reprocess(closure_id).await {
            Ok(response) => response,
            Err(e) => return Err(self.fail(FailedStage::Reprocessing, e, None).await),
        };
        if !response.status.is_success() {
            let message = response.message.clone().unwrap_or_else(|| {
                format!(
                    "job for iteration {} reported status {}",
                    response.new_iteration,
                    response.status.as_str()
                )
            });
            return Err(self
                .fail(FailedStage::Reprocessing, IncidentError::Job(message), None)
                .await);
        }

        // RELOADING
        self.transition(OrchestratorState::Reloading {
            new_iteration: response.new_iteration,
        });
        let snapshot = match self.loader.load(closure_id, Freshness::ForceFresh).await {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(self.fail(FailedStage::Reloading, e, None).await),
        };
        let incidents = snapshot.incidents.len();
        {
            let mut slot = self.snapshot.write().await;
            slot.current = Some(snapshot);
            slot.epoch += 1;
        }

        let cleared = self.details.lock().await.clear();
        let still_pending = self.drafts.lock().await.len();
        tracing::debug!(closure_id = %closure_id, cleared, "Detail cache cleared after reload");
        if still_pending > 0 {
            tracing::info!(
                closure_id = %closure_id,
                still_pending,
                "Drafts edited during the cycle remain pending"
            );
        }

        self.transition(OrchestratorState::Idle);

        let receipt = ReprocessReceipt {
            closure_id,
            new_iteration: response.new_iteration,
            status: response.status,
            synced: report.applied.len(),
            incidents,
            completed_at: Utc::now(),
        };

        tracing::info!(
            closure_id = %closure_id,
            new_iteration = receipt.new_iteration,
            synced = receipt.synced,
            incidents = receipt.incidents,
            "Reprocess cycle completed"
        );

        self.event_bus.emit_lossy(ClosureEvent::Reprocessed {
            closure_id: closure_id.0,
            new_iteration: receipt.new_iteration,
            status: receipt.status.as_str().to_string(),
            timestamp: receipt.completed_at,
        });
        if let Some(callback) = &self.on_reprocessed {
            callback(&receipt);
        }

        Ok(ReprocessOutcome::Completed(receipt))
    }

    /// Return from `Failed` to `Idle`; false when not failed
    pub fn acknowledge_failure(&self) -> bool {
        let mut acknowledged = false;
        self.state_tx.send_if_modified(|state| {
            if matches!(state, OrchestratorState::Failed(_)) {
                *state = OrchestratorState::Idle;
                acknowledged = true;
                true
            } else {
                false
            }
        });

        if acknowledged {
            tracing::info!(closure_id = %self.closure_id, "Failure acknowledged");
            self.emit_transition("Failed", "Idle");
        }
        acknowledged
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Atomically enter `next` if the current state accepts requests
    fn try_begin(&self, next: OrchestratorState) -> Result<(), &'static str> {
        let to = next.name();
        let mut outcome = Err("Idle");
        self.state_tx.send_if_modified(|state| {
            if state.accepts_requests() {
                outcome = Ok(state.name());
                *state = next;
                true
            } else {
                outcome = Err(state.name());
                false
            }
        });

        let from = outcome?;
        if from == "Failed" {
            tracing::info!(closure_id = %self.closure_id, "Retrying after failed cycle");
        }
        tracing::info!(closure_id = %self.closure_id, from, to, "Orchestrator transition");
        self.emit_transition(from, to);
        Ok(())
    }

    fn transition(&self, next: OrchestratorState) {
        let to = next.name();
        let previous = self.state_tx.send_replace(next);
        tracing::info!(
            closure_id = %self.closure_id,
            from = previous.name(),
            to,
            "Orchestrator transition"
        );
        self.emit_transition(previous.name(), to);
    }

    async fn fail(
        &self,
        stage: FailedStage,
        error: IncidentError,
        failed_at: Option<ExceptionKey>,
    ) -> IncidentError {
        let unsynced = self.drafts.lock().await.len();
        tracing::error!(
            closure_id = %self.closure_id,
            ?stage,
            kind = error.kind(),
            error = %error,
            unsynced,
            "Reprocess cycle failed"
        );
        self.transition(OrchestratorState::Failed(CycleFailure {
            stage,
            error: error.clone(),
            failed_at,
            unsynced,
        }));
        error
    }

    fn emit_transition(&self, from: &str, to: &str) {
        self.event_bus.emit_lossy(ClosureEvent::OrchestratorTransition {
            closure_id: self.closure_id.0,
            from: from.to_string(),
            to: to.to_string(),
            timestamp: Utc::now(),
        });
    }
}
