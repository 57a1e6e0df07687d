//! Closure service interface
//!
//! [`ClosureApi`] is the seam between the reconciliation logic and the remote REST
//! service. [`HttpClosureApi`] is the production implementation; tests substitute
//! recording mocks.

use crate::error::IncidentResult;
use crate::models::{
    ClosureId, ClosureStatus, DetailRow, ExceptionKey, ExceptionRequest, Incident, IncidentType,
    ReprocessResponse,
};
use async_trait::async_trait;

pub mod http_client;

pub use http_client::HttpClosureApi;

/// Which read path a snapshot load uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Freshness {
    /// Stale-tolerant optimized endpoint; ordinary refreshes
    Cached,
    /// Authoritative read bypassing any cache; mandatory after reprocessing
    ForceFresh,
}

impl Freshness {
    pub fn is_fresh(self) -> bool {
        matches!(self, Freshness::ForceFresh)
    }
}

/// Remote closure-management service
#[async_trait]
pub trait ClosureApi: Send + Sync {
    /// Consolidated incident list of a closure
    async fn consolidated_incidents(
        &self,
        closure_id: ClosureId,
        freshness: Freshness,
    ) -> IncidentResult<Vec<Incident>>;

    /// Persist a "no aplica" exception
    async fn create_exception(
        &self,
        closure_id: ClosureId,
        request: &ExceptionRequest,
    ) -> IncidentResult<()>;

    /// Remove a persisted exception
    async fn delete_exception(&self, closure_id: ClosureId, key: &ExceptionKey)
        -> IncidentResult<()>;

    /// Run the reprocessing job; returns only once the job has finished
    async fn reprocess(&self, closure_id: ClosureId) -> IncidentResult<ReprocessResponse>;

    /// Detail rows of one incident, shown when the user expands it
    async fn incident_detail(
        &self,
        closure_id: ClosureId,
        incident_type: IncidentType,
    ) -> IncidentResult<Vec<DetailRow>>;

    /// Current closure status
    async fn closure_status(&self, closure_id: ClosureId) -> IncidentResult<ClosureStatus>;
}
