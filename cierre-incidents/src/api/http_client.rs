//! REST client for the closure-management service

use super::{ClosureApi, Freshness};
use crate::error::{IncidentError, IncidentResult};
use crate::models::{
    ClosureId, ClosureStatus, DetailRow, ExceptionKey, ExceptionRequest, Incident, IncidentType,
    ReprocessResponse,
};
use async_trait::async_trait;
use cierre_common::config::ClientConfig;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const USER_AGENT: &str = concat!("cierre-incidents/", env!("CARGO_PKG_VERSION"));

/// Which endpoint family produced a response, for status → error mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Read,
    Exception,
    Reprocess,
}

#[derive(Deserialize)]
struct IncidentsEnvelope {
    incidents: Vec<Incident>,
}

/// HTTP implementation of [`ClosureApi`]
pub struct HttpClosureApi {
    http_client: reqwest::Client,
    base_url: String,
    reprocess_timeout: Duration,
}

impl HttpClosureApi {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        reprocess_timeout: Duration,
    ) -> IncidentResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| IncidentError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            reprocess_timeout,
        })
    }

    pub fn from_config(config: &ClientConfig) -> IncidentResult<Self> {
        Self::new(
            config.base_url.clone(),
            config.request_timeout,
            config.reprocess_timeout,
        )
    }

    fn url(&self, closure_id: ClosureId, path: &str) -> String {
        format!("{}/closures/{}/{}", self.base_url, closure_id, path)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: Endpoint,
    ) -> IncidentResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| IncidentError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body, endpoint))
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> IncidentResult<T> {
        let status = response.status();
        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                IncidentError::Server {
                    status: status.as_u16(),
                    message: format!("Malformed response body: {}", e),
                }
            } else {
                IncidentError::Network(e.to_string())
            }
        })
    }
}

#[async_trait]
impl ClosureApi for HttpClosureApi {
    async fn consolidated_incidents(
        &self,
        closure_id: ClosureId,
        freshness: Freshness,
    ) -> IncidentResult<Vec<Incident>> {
        let request = match freshness {
            Freshness::Cached => self
                .http_client
                .get(self.url(closure_id, "incidents/consolidated/optimized")),
            Freshness::ForceFresh => self
                .http_client
                .get(self.url(closure_id, "incidents/consolidated"))
                .query(&[("fresh", "true")]),
        };

        tracing::debug!(closure_id = %closure_id, ?freshness, "Requesting consolidated incidents");

        let response = self.send(request, Endpoint::Read).await?;
        let envelope: IncidentsEnvelope = Self::read_json(response).await?;
        Ok(envelope.incidents)
    }

    async fn create_exception(
        &self,
        closure_id: ClosureId,
        request: &ExceptionRequest,
    ) -> IncidentResult<()> {
        let builder = self
            .http_client
            .post(self.url(closure_id, "exceptions"))
            .json(request);
        self.send(builder, Endpoint::Exception).await?;
        Ok(())
    }

    async fn delete_exception(
        &self,
        closure_id: ClosureId,
        key: &ExceptionKey,
    ) -> IncidentResult<()> {
        let mut params = vec![
            ("account_code", key.account_code.clone()),
            ("incident_type", key.incident_type.as_str().to_string()),
        ];
        if let Some(set_id) = key.set_id {
            params.push(("set_id", set_id.to_string()));
        }

        let builder = self
            .http_client
            .delete(self.url(closure_id, "exceptions"))
            .query(&params);
        self.send(builder, Endpoint::Exception).await?;
        Ok(())
    }

    async fn reprocess(&self, closure_id: ClosureId) -> IncidentResult<ReprocessResponse> {
        let builder = self
            .http_client
            .post(self.url(closure_id, "reprocess"))
            .timeout(self.reprocess_timeout)
            .json(&serde_json::json!({}));

        tracing::info!(
            closure_id = %closure_id,
            timeout_secs = self.reprocess_timeout.as_secs(),
            "Triggering reprocessing (waits for job completion)"
        );

        let response = self.send(builder, Endpoint::Reprocess).await?;
        Self::read_json(response).await
    }

    async fn incident_detail(
        &self,
        closure_id: ClosureId,
        incident_type: IncidentType,
    ) -> IncidentResult<Vec<DetailRow>> {
        let path = format!("incidents/{}/detail", incident_type.as_str());
        let response = self
            .send(self.http_client.get(self.url(closure_id, &path)), Endpoint::Read)
            .await?;
        Self::read_json(response).await
    }

    async fn closure_status(&self, closure_id: ClosureId) -> IncidentResult<ClosureStatus> {
        let response = self
            .send(self.http_client.get(self.url(closure_id, "status")), Endpoint::Read)
            .await?;
        Self::read_json(response).await
    }
}

/// Map a non-success status to the error taxonomy, preserving the server message
fn classify_failure(status: StatusCode, body: &str, endpoint: Endpoint) -> IncidentError {
    let message = extract_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    });

    match (endpoint, status) {
        (Endpoint::Exception, StatusCode::BAD_REQUEST) => IncidentError::Validation(message),
        (Endpoint::Exception, StatusCode::CONFLICT) => IncidentError::Conflict(message),
        (Endpoint::Reprocess, s) if s.is_server_error() => IncidentError::Job(message),
        _ => IncidentError::Server {
            status: status.as_u16(),
            message,
        },
    }
}

/// Pull a human-readable message out of an error body
///
/// Accepts `{"error": {"message": ..}}`, `{"error": ".."}`, `{"detail": ".."}`,
/// `{"message": ".."}`, or falls back to the raw text.
fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let candidates = [
            value.pointer("/error/message"),
            value.get("error"),
            value.get("detail"),
            value.get("message"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(text) = candidate.as_str() {
                return Some(text.to_string());
            }
        }
    }

    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_message_nested_error() {
        let body = r#"{"error": {"code": "CONFLICT", "message": "Excepción duplicada"}}"#;
        assert_eq!(extract_message(body).as_deref(), Some("Excepción duplicada"));
    }

    #[test]
    fn test_extract_message_detail_and_raw() {
        assert_eq!(
            extract_message(r#"{"detail": "No encontrado"}"#).as_deref(),
            Some("No encontrado")
        );
        assert_eq!(extract_message("gateway down").as_deref(), Some("gateway down"));
        assert_eq!(extract_message("   "), None);
    }

    #[test]
    fn test_classify_by_endpoint() {
        assert!(matches!(
            classify_failure(StatusCode::CONFLICT, "", Endpoint::Exception),
            IncidentError::Conflict(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, "", Endpoint::Exception),
            IncidentError::Validation(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::INTERNAL_SERVER_ERROR, "", Endpoint::Reprocess),
            IncidentError::Job(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::INTERNAL_SERVER_ERROR, "", Endpoint::Read),
            IncidentError::Server { status: 500, .. }
        ));
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let api = HttpClosureApi::new(
            "http://localhost:8000/api/",
            Duration::from_secs(5),
            Duration::from_secs(60),
        )
        .unwrap();
        assert_eq!(
            api.url(ClosureId(12), "status"),
            "http://localhost:8000/api/closures/12/status"
        );
    }
}
