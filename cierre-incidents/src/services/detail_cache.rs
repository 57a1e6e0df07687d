//! Expanded incident detail cache
//!
//! Detail rows are fetched the first time an incident is expanded and reused until
//! the cache is cleared. The orchestrator clears it after a forced-fresh reload so
//! pre- and post-reprocessing rows never mix in one view.

use crate::api::ClosureApi;
use crate::error::IncidentResult;
use crate::models::{ClosureId, DetailRow, IncidentType};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct DetailCache {
    rows: HashMap<IncidentType, Vec<DetailRow>>,
}

impl DetailCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, incident_type: IncidentType) -> Option<&[DetailRow]> {
        self.rows.get(&incident_type).map(Vec::as_slice)
    }

    pub fn insert(&mut self, incident_type: IncidentType, rows: Vec<DetailRow>) {
        self.rows.insert(incident_type, rows);
    }

    /// Forget one incident's rows (collapse)
    pub fn evict(&mut self, incident_type: IncidentType) -> bool {
        self.rows.remove(&incident_type).is_some()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.rows.len();
        self.rows.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Fetch detail rows for an incident, consulting the cache first
///
/// A failed fetch leaves the cache untouched.
pub async fn fetch_detail(
    cache: &mut DetailCache,
    api: &dyn ClosureApi,
    closure_id: ClosureId,
    incident_type: IncidentType,
) -> IncidentResult<Vec<DetailRow>> {
    if let Some(rows) = cache.get(incident_type) {
        tracing::debug!(closure_id = %closure_id, %incident_type, "Detail cache hit");
        return Ok(rows.to_vec());
    }

    let rows = api.incident_detail(closure_id, incident_type).await?;
    tracing::debug!(
        closure_id = %closure_id,
        %incident_type,
        rows = rows.len(),
        "Detail fetched"
    );
    cache.insert(incident_type, rows.clone());
    Ok(rows)
}
