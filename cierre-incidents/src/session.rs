//! Review session for one closure's consolidated incidents
//!
//! A session is created when the review opens and closed when it goes away. It owns
//! the orchestrator, the status poller handle and the open timestamp, so nothing
//! outlives the review: closing (or dropping) the session stops the poller and
//! discards unsynced drafts, which are intentionally never persisted.

use crate::api::ClosureApi;
use crate::error::IncidentResult;
use crate::models::ClosureId;
use crate::services::reprocess_orchestrator::{ReprocessOrchestrator, ReprocessReceipt};
use crate::services::status_poller::{self, PollerHandle};
use chrono::{DateTime, Utc};
use cierre_common::events::EventBus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Options for opening a session
#[derive(Default)]
pub struct SessionOptions {
    /// Status poll interval; `None` disables the poller
    pub status_interval: Option<Duration>,
    /// Invoked once per successful reprocess cycle
    pub on_reprocessed: Option<Box<dyn Fn(&ReprocessReceipt) + Send + Sync>>,
}

/// What happened during a session, reported on close
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub closure_id: ClosureId,
    pub opened_at: DateTime<Utc>,
    pub duration: Duration,
    /// Drafts still pending at close, dropped without being synchronized
    pub discarded_drafts: usize,
}

pub struct ReviewSession {
    session_id: Uuid,
    closure_id: ClosureId,
    opened_at: DateTime<Utc>,
    started: Instant,
    orchestrator: Arc<ReprocessOrchestrator>,
    poller: Option<PollerHandle>,
}

impl ReviewSession {
    /// Open the review: initial cached load, then start the poller
    ///
    /// Fails if the initial snapshot cannot be loaded; no poller is left behind.
    pub async fn open(
        api: Arc<dyn ClosureApi>,
        closure_id: ClosureId,
        options: SessionOptions,
        event_bus: EventBus,
    ) -> IncidentResult<Self> {
        let session_id = Uuid::new_v4();
        let opened_at = Utc::now();
        let started = Instant::now();

        let mut orchestrator =
            ReprocessOrchestrator::new(closure_id, Arc::clone(&api), event_bus.clone());
        if let Some(callback) = options.on_reprocessed {
            orchestrator = orchestrator.with_on_reprocessed(callback);
        }
        let orchestrator = Arc::new(orchestrator);

        tracing::info!(%session_id, closure_id = %closure_id, "Opening incident review");

        orchestrator.refresh().await?;

        let poller = options.status_interval.map(|interval| {
            status_poller::spawn(
                api,
                closure_id,
                interval,
                orchestrator.subscribe_state(),
                event_bus,
            )
        });

        Ok(Self {
            session_id,
            closure_id,
            opened_at,
            started,
            orchestrator,
            poller,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn closure_id(&self) -> ClosureId {
        self.closure_id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Time since the review opened (monotonic)
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn orchestrator(&self) -> &Arc<ReprocessOrchestrator> {
        &self.orchestrator
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(PollerHandle::is_running)
    }

    /// Stop the poller and drop pending drafts
    pub async fn close(mut self) -> SessionSummary {
        if let Some(poller) = self.poller.take() {
            poller.shutdown().await;
        }

        let discarded_drafts = self.orchestrator.discard_drafts().await;
        let duration = self.elapsed();

        if discarded_drafts > 0 {
            tracing::warn!(
                session_id = %self.session_id,
                closure_id = %self.closure_id,
                discarded_drafts,
                "Review closed with unsynchronized exception drafts"
            );
        }
        tracing::info!(
            session_id = %self.session_id,
            closure_id = %self.closure_id,
            duration_secs = duration.as_secs(),
            "Incident review closed"
        );

        SessionSummary {
            session_id: self.session_id,
            closure_id: self.closure_id,
            opened_at: self.opened_at,
            duration,
            discarded_drafts,
        }
    }
}
