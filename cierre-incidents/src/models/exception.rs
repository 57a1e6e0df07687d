//! Exception ("no aplica") drafts and keys

use crate::error::{IncidentError, IncidentResult};
use crate::models::{AffectedElement, IncidentType, SetId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an exception: one account, one incident type and, for classification
/// incidents, one taxonomy set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExceptionKey {
    pub account_code: String,
    pub incident_type: IncidentType,
    pub set_id: Option<SetId>,
}

impl ExceptionKey {
    pub fn new(
        account_code: impl Into<String>,
        incident_type: IncidentType,
        set_id: Option<SetId>,
    ) -> Self {
        Self {
            account_code: account_code.into(),
            incident_type,
            set_id,
        }
    }

    /// Key for an affected element of an incident of the given type
    ///
    /// The set is only part of the key for classification incidents.
    pub fn for_element(element: &AffectedElement, incident_type: IncidentType) -> Self {
        let set_id = if incident_type.requires_set() {
            element.set_id
        } else {
            None
        };
        Self::new(element.account_code.clone(), incident_type, set_id)
    }

    /// Reject keys the server could never accept
    pub fn validate(&self) -> IncidentResult<()> {
        if self.account_code.trim().is_empty() {
            return Err(IncidentError::Validation("account code is empty".to_string()));
        }
        if self.incident_type == IncidentType::Unknown {
            return Err(IncidentError::Validation(format!(
                "missing or unknown incident type for account {}",
                self.account_code
            )));
        }
        if self.incident_type.requires_set() && self.set_id.is_none() {
            return Err(IncidentError::Validation(format!(
                "{} exception for account {} requires a classification set",
                self.incident_type, self.account_code
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ExceptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.set_id {
            Some(set) => write!(f, "{}/{}/set {}", self.account_code, self.incident_type, set),
            None => write!(f, "{}/{}", self.account_code, self.incident_type),
        }
    }
}

/// What a draft does to the server-side exception record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DraftAction {
    Create,
    Delete,
}

impl DraftAction {
    /// Exception flag this action renders
    pub fn renders_exception(self) -> bool {
        matches!(self, DraftAction::Create)
    }
}

/// A locally held, unsynchronized exception edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionDraft {
    pub key: ExceptionKey,
    pub reason: String,
    pub action: DraftAction,
}

impl ExceptionDraft {
    pub fn create(key: ExceptionKey, reason: impl Into<String>) -> Self {
        Self {
            key,
            reason: reason.into(),
            action: DraftAction::Create,
        }
    }

    pub fn delete(key: ExceptionKey) -> Self {
        Self {
            key,
            reason: String::new(),
            action: DraftAction::Delete,
        }
    }

    pub fn validate(&self) -> IncidentResult<()> {
        self.key.validate()
    }
}

/// Body of the create-exception request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRequest {
    pub account_code: String,
    pub incident_type: IncidentType,
    pub set_id: Option<SetId>,
    pub reason: String,
}

impl From<&ExceptionDraft> for ExceptionRequest {
    fn from(draft: &ExceptionDraft) -> Self {
        Self {
            account_code: draft.key.account_code.clone(),
            incident_type: draft.key.incident_type,
            set_id: draft.key.set_id,
            reason: draft.reason.clone(),
        }
    }
}
