//! Closure status poller
//!
//! Polls the closure status on a fixed interval and publishes each observation on
//! the event bus. Ticks are skipped while the reprocess orchestrator is mid-cycle,
//! and a poll that overlaps the start of a cycle is discarded unpublished.
//!
//! The poller is owned through a [`PollerHandle`]; dropping the handle cancels the
//! task, so a view that goes away never leaves a timer running.

use crate::api::ClosureApi;
use crate::models::ClosureId;
use crate::services::reprocess_orchestrator::OrchestratorState;
use chrono::Utc;
use cierre_common::events::{ClosureEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Handle to a running status poller
pub struct PollerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel the poller and wait for its task to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Status poller task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawn the poller on the current tokio runtime
///
/// `gate` is the orchestrator state channel; polls only happen while it reports a
/// state that accepts requests.
pub fn spawn(
    api: Arc<dyn ClosureApi>,
    closure_id: ClosureId,
    interval: Duration,
    gate: watch::Receiver<OrchestratorState>,
    event_bus: EventBus,
) -> PollerHandle {
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run(api, closure_id, interval, gate, event_bus, cancel.clone()));
    PollerHandle {
        cancel,
        task: Some(task),
    }
}

async fn run(
    api: Arc<dyn ClosureApi>,
    closure_id: ClosureId,
    interval: Duration,
    gate: watch::Receiver<OrchestratorState>,
    event_bus: EventBus,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::debug!(closure_id = %closure_id, ?interval, "Status poller started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let busy = gate.borrow().is_busy();
        if busy {
            tracing::debug!(closure_id = %closure_id, "Reprocess cycle active, skipping status poll");
            continue;
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.closure_status(closure_id) => result,
        };

        // A cycle may have started while the request was in flight
        if gate.borrow().is_busy() {
            tracing::debug!(closure_id = %closure_id, "Reprocess cycle started during status poll, dropping result");
            continue;
        }

        match result {
            Ok(status) => {
                tracing::debug!(closure_id = %closure_id, status = %status.status, "Closure status polled");
                event_bus.emit_lossy(ClosureEvent::ClosureStatusPolled {
                    closure_id: closure_id.0,
                    status: status.status,
                    iteration: status.iteration,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                tracing::warn!(closure_id = %closure_id, error = %e, "Closure status poll failed");
            }
        }
    }

    tracing::debug!(closure_id = %closure_id, "Status poller stopped");
}
