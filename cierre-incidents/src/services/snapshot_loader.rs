//! Consolidated incident snapshot loading

use crate::api::{ClosureApi, Freshness};
use crate::error::IncidentResult;
use crate::models::{ClosureId, Incident};
use cierre_common::events::{ClosureEvent, EventBus};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Server incident state returned by one load
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub closure_id: ClosureId,
    pub incidents: Vec<Incident>,
    pub freshness: Freshness,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn total_affected(&self) -> usize {
        self.incidents.iter().map(|i| i.affected.len()).sum()
    }
}

/// Loads snapshots through either the cached or the forced-fresh path
///
/// A failed load returns the error and produces no snapshot; callers keep whatever
/// they rendered before.
#[derive(Clone)]
pub struct SnapshotLoader {
    api: Arc<dyn ClosureApi>,
    event_bus: EventBus,
}

impl SnapshotLoader {
    pub fn new(api: Arc<dyn ClosureApi>, event_bus: EventBus) -> Self {
        Self { api, event_bus }
    }

    pub async fn load(
        &self,
        closure_id: ClosureId,
        freshness: Freshness,
    ) -> IncidentResult<Snapshot> {
        let incidents = match self.api.consolidated_incidents(closure_id, freshness).await {
            Ok(incidents) => incidents,
            Err(e) => {
                tracing::warn!(
                    closure_id = %closure_id,
                    ?freshness,
                    kind = e.kind(),
                    error = %e,
                    "Incident snapshot load failed"
                );
                return Err(e);
            }
        };

        let snapshot = Snapshot {
            closure_id,
            incidents,
            freshness,
            fetched_at: Utc::now(),
        };

        tracing::info!(
            closure_id = %closure_id,
            fresh = freshness.is_fresh(),
            incidents = snapshot.incidents.len(),
            affected = snapshot.total_affected(),
            "Loaded incident snapshot"
        );

        self.event_bus.emit_lossy(ClosureEvent::IncidentsLoaded {
            closure_id: closure_id.0,
            incident_count: snapshot.incidents.len(),
            fresh: freshness.is_fresh(),
            timestamp: snapshot.fetched_at,
        });

        Ok(snapshot)
    }
}
