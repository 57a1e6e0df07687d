//! Applies exception drafts to the closure service
//!
//! Drafts go out one at a time in the order supplied. The first failure stops the
//! pass; already-applied drafts are not rolled back.

use crate::api::ClosureApi;
use crate::error::{IncidentError, IncidentResult};
use crate::models::{ClosureId, DraftAction, ExceptionDraft, ExceptionKey, ExceptionRequest};
use cierre_common::events::{ClosureEvent, EventBus};
use chrono::Utc;
use std::sync::Arc;

/// Outcome of one synchronization pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Keys applied server-side, in application order
    pub applied: Vec<ExceptionKey>,
    /// Key of the draft that stopped the pass
    pub failed_at: Option<ExceptionKey>,
    pub error: Option<IncidentError>,
}

impl SyncReport {
    /// Whether every draft of a batch of `requested` drafts was applied
    pub fn is_complete(&self, requested: usize) -> bool {
        self.failed_at.is_none() && self.applied.len() == requested
    }
}

#[derive(Clone)]
pub struct Synchronizer {
    api: Arc<dyn ClosureApi>,
    event_bus: EventBus,
}

impl Synchronizer {
    pub fn new(api: Arc<dyn ClosureApi>, event_bus: EventBus) -> Self {
        Self { api, event_bus }
    }

    pub async fn sync(&self, closure_id: ClosureId, drafts: &[ExceptionDraft]) -> SyncReport {
        let mut report = SyncReport::default();

        for draft in drafts {
            match self.apply(closure_id, draft).await {
                Ok(()) => {
                    tracing::debug!(
                        closure_id = %closure_id,
                        key = %draft.key,
                        action = ?draft.action,
                        "Exception draft applied"
                    );
                    report.applied.push(draft.key.clone());
                }
                Err(e) => {
                    tracing::warn!(
                        closure_id = %closure_id,
                        key = %draft.key,
                        kind = e.kind(),
                        error = %e,
                        applied = report.applied.len(),
                        remaining = drafts.len() - report.applied.len(),
                        "Exception sync stopped"
                    );
                    report.failed_at = Some(draft.key.clone());
                    report.error = Some(e);
                    break;
                }
            }
        }

        tracing::info!(
            closure_id = %closure_id,
            applied = report.applied.len(),
            requested = drafts.len(),
            "Exception sync finished"
        );

        self.event_bus.emit_lossy(ClosureEvent::ExceptionsSynced {
            closure_id: closure_id.0,
            applied: report.applied.len(),
            requested: drafts.len(),
            failure: report.error.as_ref().map(|e| e.to_string()),
            timestamp: Utc::now(),
        });

        report
    }

    async fn apply(&self, closure_id: ClosureId, draft: &ExceptionDraft) -> IncidentResult<()> {
        draft.validate()?;
        match draft.action {
            DraftAction::Create => {
                self.api
                    .create_exception(closure_id, &ExceptionRequest::from(draft))
                    .await
            }
            DraftAction::Delete => self.api.delete_exception(closure_id, &draft.key).await,
        }
    }
}
