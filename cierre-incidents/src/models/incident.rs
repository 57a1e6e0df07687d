//! Consolidated incident model
//!
//! Incidents are produced by the snapshot loader, immutable once received and
//! replaced wholesale on every load.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closure identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClosureId(pub i64);

impl fmt::Display for ClosureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification taxonomy set identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SetId(pub i64);

impl fmt::Display for SetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Incident type as reported by the closure service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IncidentType {
    /// Movement without document type
    #[serde(rename = "DOC_NULL")]
    DocNull,
    /// Document type not present in the closure's document taxonomy
    #[serde(rename = "DOC_NO_RECONOCIDO")]
    DocNotRecognized,
    /// Account without English name
    #[serde(rename = "CUENTA_SIN_INGLES")]
    MissingEnglishName,
    /// Account not classified in a taxonomy set; exceptions are set-scoped
    #[serde(rename = "CUENTA_NO_CLASIFICADA")]
    UnclassifiedAccount,
    /// Any incident type this client does not know
    #[serde(other)]
    Unknown,
}

impl IncidentType {
    /// Wire code
    pub fn as_str(self) -> &'static str {
        match self {
            IncidentType::DocNull => "DOC_NULL",
            IncidentType::DocNotRecognized => "DOC_NO_RECONOCIDO",
            IncidentType::MissingEnglishName => "CUENTA_SIN_INGLES",
            IncidentType::UnclassifiedAccount => "CUENTA_NO_CLASIFICADA",
            IncidentType::Unknown => "UNKNOWN",
        }
    }

    /// Parse a wire code; unknown codes map to `Unknown`
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "DOC_NULL" => IncidentType::DocNull,
            "DOC_NO_RECONOCIDO" => IncidentType::DocNotRecognized,
            "CUENTA_SIN_INGLES" => IncidentType::MissingEnglishName,
            "CUENTA_NO_CLASIFICADA" => IncidentType::UnclassifiedAccount,
            _ => IncidentType::Unknown,
        }
    }

    /// Classification incidents scope exceptions to a single taxonomy set
    pub fn requires_set(self) -> bool {
        matches!(self, IncidentType::UnclassifiedAccount)
    }
}

impl fmt::Display for IncidentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Account (and optionally taxonomy set) affected by an incident
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedElement {
    pub account_code: String,
    #[serde(default)]
    pub description: String,
    /// Present only for classification incidents
    #[serde(default)]
    pub set_id: Option<SetId>,
    #[serde(default)]
    pub set_name: Option<String>,
    /// Server-confirmed exception flag (overridden by drafts when rendered)
    #[serde(default)]
    pub has_exception: bool,
}

/// One consolidated incident of a closure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub affected: Vec<AffectedElement>,
    #[serde(default)]
    pub count: u32,
}

impl Incident {
    /// Find the affected element matching an account (and set, for classification incidents)
    pub fn find_element(&self, account_code: &str, set_id: Option<SetId>) -> Option<&AffectedElement> {
        self.affected.iter().find(|e| {
            e.account_code == account_code
                && (!self.incident_type.requires_set() || e.set_id == set_id)
        })
    }
}
