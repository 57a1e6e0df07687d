//! Snapshot ⨝ drafts reconciliation
//!
//! Pure functions: nothing here performs I/O or mutates its inputs.

use crate::models::{DraftAction, ExceptionDraft, ExceptionKey, Incident};
use crate::services::draft_store::DraftStore;
use std::collections::HashSet;

/// Rendered exception flag: a draft always wins over the server-confirmed flag
pub fn effective_flag(server_flag: bool, draft: Option<&ExceptionDraft>) -> bool {
    match draft.map(|d| d.action) {
        Some(DraftAction::Create) => true,
        Some(DraftAction::Delete) => false,
        None => server_flag,
    }
}

/// Copy of `incidents` with every `has_exception` overridden by pending drafts
pub fn merged_view(incidents: &[Incident], store: &DraftStore) -> Vec<Incident> {
    if store.is_empty() {
        return incidents.to_vec();
    }

    incidents
        .iter()
        .map(|incident| {
            let mut merged = incident.clone();
            for element in merged.affected.iter_mut() {
                let key = ExceptionKey::for_element(element, incident.incident_type);
                element.has_exception = effective_flag(element.has_exception, store.get(&key));
            }
            merged
        })
        .collect()
}

/// Batch to synchronize, in store insertion order
pub fn net_batch(store: &DraftStore) -> Vec<ExceptionDraft> {
    store.pending_batch()
}

/// Drafts whose key no longer appears in the snapshot
///
/// These still get synchronized; callers surface them so the user knows the
/// exception targets an element the current snapshot does not show.
pub fn orphaned_drafts(incidents: &[Incident], store: &DraftStore) -> Vec<ExceptionKey> {
    let visible: HashSet<ExceptionKey> = incidents
        .iter()
        .flat_map(|incident| {
            incident
                .affected
                .iter()
                .map(move |element| ExceptionKey::for_element(element, incident.incident_type))
        })
        .collect();

    store
        .pending_batch()
        .into_iter()
        .map(|draft| draft.key)
        .filter(|key| !visible.contains(key))
        .collect()
}

/// Drafts whose action already matches the server flag of their element
///
/// A `Create` left over an element whose exception exists (after unmarking and
/// re-marking it) will be rejected by the server as a conflict; callers warn.
pub fn redundant_drafts(incidents: &[Incident], store: &DraftStore) -> Vec<ExceptionKey> {
    store
        .pending_batch()
        .into_iter()
        .filter(|draft| {
            server_flag(incidents, &draft.key)
                .is_some_and(|flag| flag == draft.action.renders_exception())
        })
        .map(|draft| draft.key)
        .collect()
}

/// Server-confirmed flag of the element a key targets, if the snapshot shows it
pub fn server_flag(incidents: &[Incident], key: &ExceptionKey) -> Option<bool> {
    incidents
        .iter()
        .filter(|incident| incident.incident_type == key.incident_type)
        .find_map(|incident| incident.find_element(&key.account_code, key.set_id))
        .map(|element| element.has_exception)
}

/// Create/delete counts of a batch, shown before the user confirms a cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub creates: usize,
    pub deletes: usize,
}

impl BatchSummary {
    pub fn of(batch: &[ExceptionDraft]) -> Self {
        batch.iter().fold(Self::default(), |mut acc, draft| {
            match draft.action {
                DraftAction::Create => acc.creates += 1,
                DraftAction::Delete => acc.deletes += 1,
            }
            acc
        })
    }

    pub fn total(&self) -> usize {
        self.creates + self.deletes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AffectedElement, IncidentType, SetId, Severity};

    fn snapshot() -> Vec<Incident> {
        vec![
            Incident {
                incident_type: IncidentType::DocNull,
                severity: Severity::High,
                message: "Movimientos sin tipo de documento".to_string(),
                affected: vec![
                    AffectedElement {
                        account_code: "1-01-001".to_string(),
                        description: "Caja".to_string(),
                        set_id: None,
                        set_name: None,
                        has_exception: false,
                    },
                    AffectedElement {
                        account_code: "1-01-002".to_string(),
                        description: "Banco".to_string(),
                        set_id: None,
                        set_name: None,
                        has_exception: true,
                    },
                ],
                count: 2,
            },
            Incident {
                incident_type: IncidentType::UnclassifiedAccount,
                severity: Severity::Medium,
                message: "Cuentas sin clasificar".to_string(),
                affected: vec![AffectedElement {
                    account_code: "1-01-001".to_string(),
                    description: "Caja".to_string(),
                    set_id: Some(SetId(2)),
                    set_name: Some("Balance".to_string()),
                    has_exception: false,
                }],
                count: 1,
            },
        ]
    }

    #[test]
    fn test_merge_with_empty_store_is_identity() {
        let incidents = snapshot();
        assert_eq!(merged_view(&incidents, &DraftStore::new()), incidents);
    }

    #[test]
    fn test_create_draft_forces_true_delete_forces_false() {
        let incidents = snapshot();
        let mut store = DraftStore::new();
        store
            .upsert(ExceptionDraft::create(
                ExceptionKey::new("1-01-001", IncidentType::DocNull, None),
                "",
            ))
            .unwrap();
        store
            .upsert(ExceptionDraft::delete(ExceptionKey::new(
                "1-01-002",
                IncidentType::DocNull,
                None,
            )))
            .unwrap();

        let merged = merged_view(&incidents, &store);

        assert!(merged[0].affected[0].has_exception);
        assert!(!merged[0].affected[1].has_exception);
        // Same account under another incident type is untouched
        assert!(!merged[1].affected[0].has_exception);
        // Input is not mutated
        assert!(!incidents[0].affected[0].has_exception);
    }

    #[test]
    fn test_effective_flag_table() {
        let key = ExceptionKey::new("x", IncidentType::DocNull, None);
        let create = ExceptionDraft::create(key.clone(), "");
        let delete = ExceptionDraft::delete(key);

        for server in [true, false] {
            assert!(effective_flag(server, Some(&create)));
            assert!(!effective_flag(server, Some(&delete)));
            assert_eq!(effective_flag(server, None), server);
        }
    }

    #[test]
    fn test_orphaned_drafts_and_summary() {
        let incidents = snapshot();
        let mut store = DraftStore::new();
        store
            .upsert(ExceptionDraft::create(
                ExceptionKey::new("1-01-001", IncidentType::DocNull, None),
                "",
            ))
            .unwrap();
        store
            .upsert(ExceptionDraft::delete(ExceptionKey::new(
                "9-99-999",
                IncidentType::DocNull,
                None,
            )))
            .unwrap();

        let orphans = orphaned_drafts(&incidents, &store);
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].account_code, "9-99-999");

        let summary = BatchSummary::of(&net_batch(&store));
        assert_eq!(summary, BatchSummary { creates: 1, deletes: 1 });
        assert_eq!(summary.total(), 2);
    }

    #[test]
    fn test_redundant_drafts_flag_create_over_server_exception() {
        let incidents = snapshot();
        let mut store = DraftStore::new();
        let banco = ExceptionKey::new("1-01-002", IncidentType::DocNull, None);
        store.upsert(ExceptionDraft::create(banco.clone(), "")).unwrap();
        store
            .upsert(ExceptionDraft::create(
                ExceptionKey::new("1-01-001", IncidentType::DocNull, None),
                "",
            ))
            .unwrap();

        assert_eq!(redundant_drafts(&incidents, &store), vec![banco.clone()]);
        assert_eq!(server_flag(&incidents, &banco), Some(true));
        assert_eq!(
            server_flag(&incidents, &ExceptionKey::new("0-00", IncidentType::DocNull, None)),
            None
        );
    }
}
