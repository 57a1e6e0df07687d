//! Closure-level responses: reprocess result, status and incident detail rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome reported by the reprocess job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    CompletedWithWarnings,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Completed => "completed",
            JobStatus::CompletedWithWarnings => "completed_with_warnings",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_success(self) -> bool {
        !matches!(self, JobStatus::Failed)
    }
}

/// Response of the synchronous reprocess call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReprocessResponse {
    pub new_iteration: i64,
    pub status: JobStatus,
    /// Job failure detail, when the service provides one
    #[serde(default)]
    pub message: Option<String>,
}

/// Closure status as seen by the status poller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureStatus {
    pub status: String,
    #[serde(default)]
    pub iteration: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One row of an expanded incident's detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    pub account_code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub set_name: Option<String>,
    #[serde(default)]
    pub movements: u32,
    #[serde(default)]
    pub amount: Option<f64>,
}
