//! Recording in-memory closure service
//!
//! Every call is appended to a log so tests can assert on ordering. Responses and
//! failures are scripted per test.

use async_trait::async_trait;
use cierre_incidents::api::{ClosureApi, Freshness};
use cierre_incidents::error::{IncidentError, IncidentResult};
use cierre_incidents::models::{
    ClosureId, ClosureStatus, DetailRow, ExceptionKey, ExceptionRequest, Incident, IncidentType,
    JobStatus, ReprocessResponse,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Consolidated(Freshness),
    CreateException(ExceptionKey),
    DeleteException(ExceptionKey),
    Reprocess,
    Detail(IncidentType),
    Status,
}

pub struct MockClosureApi {
    calls: Mutex<Vec<Call>>,
    cached: Mutex<Vec<Incident>>,
    fresh: Mutex<Vec<Incident>>,
    load_failure: Mutex<Option<IncidentError>>,
    exception_failures: Mutex<HashMap<ExceptionKey, IncidentError>>,
    reprocess_result: Mutex<IncidentResult<ReprocessResponse>>,
    reprocess_gate: Mutex<Option<Arc<Notify>>>,
    cached_gate: Mutex<Option<Arc<Notify>>>,
    status_gate: Mutex<Option<Arc<Notify>>>,
    details: Mutex<HashMap<IncidentType, Vec<DetailRow>>>,
    status: Mutex<IncidentResult<ClosureStatus>>,
}

impl MockClosureApi {
    /// Both read paths return `incidents` until scripted otherwise
    pub fn new(incidents: Vec<Incident>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            cached: Mutex::new(incidents.clone()),
            fresh: Mutex::new(incidents),
            load_failure: Mutex::new(None),
            exception_failures: Mutex::new(HashMap::new()),
            reprocess_result: Mutex::new(Ok(ReprocessResponse {
                new_iteration: 2,
                status: JobStatus::Completed,
                message: None,
            })),
            reprocess_gate: Mutex::new(None),
            cached_gate: Mutex::new(None),
            status_gate: Mutex::new(None),
            details: Mutex::new(HashMap::new()),
            status: Mutex::new(Ok(ClosureStatus {
                status: "incidencias".to_string(),
                iteration: Some(1),
                updated_at: None,
            })),
        })
    }

    pub fn set_cached(&self, incidents: Vec<Incident>) {
        *self.cached.lock().unwrap() = incidents;
    }

    pub fn set_fresh(&self, incidents: Vec<Incident>) {
        *self.fresh.lock().unwrap() = incidents;
    }

    /// Make every subsequent snapshot load fail (`None` restores success)
    pub fn fail_loads(&self, error: Option<IncidentError>) {
        *self.load_failure.lock().unwrap() = error;
    }

    pub fn fail_exception(&self, key: ExceptionKey, error: IncidentError) {
        self.exception_failures.lock().unwrap().insert(key, error);
    }

    pub fn set_reprocess_result(&self, result: IncidentResult<ReprocessResponse>) {
        *self.reprocess_result.lock().unwrap() = result;
    }

    /// Hold the next reprocess call until the returned `Notify` is signalled
    pub fn gate_reprocess(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.reprocess_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Hold the next cached-path load until the returned `Notify` is signalled
    pub fn gate_cached_load(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.cached_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Hold the next status call until the returned `Notify` is signalled
    pub fn gate_status(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.status_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn set_detail(&self, incident_type: IncidentType, rows: Vec<DetailRow>) {
        self.details.lock().unwrap().insert(incident_type, rows);
    }

    pub fn set_status(&self, status: IncidentResult<ClosureStatus>) {
        *self.status.lock().unwrap() = status;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    pub fn reprocess_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::Reprocess))
    }

    pub fn status_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::Status))
    }

    /// Read paths used, in order
    pub fn loads(&self) -> Vec<Freshness> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Consolidated(freshness) => Some(freshness),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn exception_outcome(&self, key: &ExceptionKey) -> IncidentResult<()> {
        match self.exception_failures.lock().unwrap().get(key) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ClosureApi for MockClosureApi {
    async fn consolidated_incidents(
        &self,
        _closure_id: ClosureId,
        freshness: Freshness,
    ) -> IncidentResult<Vec<Incident>> {
        self.record(Call::Consolidated(freshness));
        if freshness == Freshness::Cached {
            let gate = self.cached_gate.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.notified().await;
            }
        }
        if let Some(error) = self.load_failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(match freshness {
            Freshness::Cached => self.cached.lock().unwrap().clone(),
            Freshness::ForceFresh => self.fresh.lock().unwrap().clone(),
        })
    }

    async fn create_exception(
        &self,
        _closure_id: ClosureId,
        request: &ExceptionRequest,
    ) -> IncidentResult<()> {
        let key = ExceptionKey::new(
            request.account_code.clone(),
            request.incident_type,
            request.set_id,
        );
        self.record(Call::CreateException(key.clone()));
        self.exception_outcome(&key)
    }

    async fn delete_exception(
        &self,
        _closure_id: ClosureId,
        key: &ExceptionKey,
    ) -> IncidentResult<()> {
        self.record(Call::DeleteException(key.clone()));
        self.exception_outcome(key)
    }

    async fn reprocess(&self, _closure_id: ClosureId) -> IncidentResult<ReprocessResponse> {
        self.record(Call::Reprocess);
        let gate = self.reprocess_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.reprocess_result.lock().unwrap().clone()
    }

    async fn incident_detail(
        &self,
        _closure_id: ClosureId,
        incident_type: IncidentType,
    ) -> IncidentResult<Vec<DetailRow>> {
        self.record(Call::Detail(incident_type));
        Ok(self
            .details
            .lock()
            .unwrap()
            .get(&incident_type)
            .cloned()
            .unwrap_or_default())
    }

    async fn closure_status(&self, _closure_id: ClosureId) -> IncidentResult<ClosureStatus> {
        self.record(Call::Status);
        let gate = self.status_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.status.lock().unwrap().clone()
    }
}
