//! In-memory store of unsynchronized exception drafts
//!
//! One draft per key, last write wins. Drafts are ephemeral: nothing here is
//! persisted, and a draft only leaves the store when a sync applies it or when the
//! user toggles back to a state with no server-side exception.

use crate::error::{IncidentError, IncidentResult};
use crate::models::{AffectedElement, DraftAction, ExceptionDraft, ExceptionKey, IncidentType};
use crate::services::reconciler;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    draft: ExceptionDraft,
}

/// Result of a user toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// A draft with this action now exists for the key
    Drafted(DraftAction),
    /// The pending draft was dropped; the element is back at server truth
    Cancelled,
}

#[derive(Debug, Default)]
pub struct DraftStore {
    drafts: HashMap<ExceptionKey, Entry>,
    next_seq: u64,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the draft for its key
    ///
    /// A replacing upsert moves the key to the end of the batch order. Returns the
    /// replaced draft, if any.
    pub fn upsert(&mut self, draft: ExceptionDraft) -> IncidentResult<Option<ExceptionDraft>> {
        draft.validate()?;

        let seq = self.next_seq;
        self.next_seq += 1;

        tracing::debug!(key = %draft.key, action = ?draft.action, "Draft upserted");

        let previous = self
            .drafts
            .insert(draft.key.clone(), Entry { seq, draft })
            .map(|entry| entry.draft);
        Ok(previous)
    }

    pub fn remove(&mut self, key: &ExceptionKey) -> Option<ExceptionDraft> {
        self.drafts.remove(key).map(|entry| entry.draft)
    }

    pub fn get(&self, key: &ExceptionKey) -> Option<&ExceptionDraft> {
        self.drafts.get(key).map(|entry| &entry.draft)
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    /// All drafts in insertion order
    pub fn pending_batch(&self) -> Vec<ExceptionDraft> {
        let mut entries: Vec<&Entry> = self.drafts.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| entry.draft.clone()).collect()
    }

    /// Flip the rendered exception flag of an element
    ///
    /// - Marking an element creates a `Create` draft.
    /// - Unmarking an element whose exception exists on the server upserts a `Delete`
    ///   draft; the record exists until a sync removes it.
    /// - Unmarking a local `Create` when the server has no exception drops the draft.
    pub fn toggle(
        &mut self,
        element: &AffectedElement,
        incident_type: IncidentType,
        reason: impl Into<String>,
    ) -> IncidentResult<ToggleOutcome> {
        let key = ExceptionKey::for_element(element, incident_type);
        key.validate()?;

        let server_flag = element.has_exception;
        let desired = !reconciler::effective_flag(server_flag, self.get(&key));

        if !desired && !server_flag {
            self.remove(&key);
            tracing::debug!(key = %key, "Draft cancelled, element back at server state");
            return Ok(ToggleOutcome::Cancelled);
        }

        let draft = if desired {
            ExceptionDraft::create(key, reason)
        } else {
            ExceptionDraft::delete(key)
        };
        let action = draft.action;
        self.upsert(draft)?;
        Ok(ToggleOutcome::Drafted(action))
    }

    /// Record an explicit mark/unmark for an element whose server flag is known
    ///
    /// Applies the same rules as [`toggle`](Self::toggle) to a requested action:
    /// - An action that differs from server truth is drafted.
    /// - An unmark matching server truth drops a pending `Create` draft; with no pending
    ///   draft there is nothing to remove and the request is rejected.
    /// - A mark matching server truth replaces a pending `Delete`; with no pending
    ///   draft the exception already exists and the request is rejected.
    pub fn apply_intent(
        &mut self,
        draft: ExceptionDraft,
        server_flag: bool,
    ) -> IncidentResult<ToggleOutcome> {
        draft.validate()?;

        if draft.action.renders_exception() != server_flag {
            let action = draft.action;
            self.upsert(draft)?;
            return Ok(ToggleOutcome::Drafted(action));
        }

        match (self.get(&draft.key).is_some(), server_flag) {
            (false, true) => Err(IncidentError::Validation(format!(
                "{} already has an exception on the server",
                draft.key
            ))),
            (false, false) => Err(IncidentError::Validation(format!(
                "{} has no exception on the server to remove",
                draft.key
            ))),
            (true, false) => {
                self.remove(&draft.key);
                tracing::debug!(key = %draft.key, "Draft cancelled, element back at server state");
                Ok(ToggleOutcome::Cancelled)
            }
            (true, true) => {
                let action = draft.action;
                self.upsert(draft)?;
                Ok(ToggleOutcome::Drafted(action))
            }
        }
    }

    /// Remove the applied keys of a sync pass
    ///
    /// A key is only removed while its stored draft is still the one that was sent;
    /// a draft replaced during the pass stays pending. Returns the number removed.
    pub fn acknowledge(&mut self, applied: &[ExceptionKey], batch: &[ExceptionDraft]) -> usize {
        let mut removed = 0;
        for key in applied {
            let sent = batch.iter().find(|d| &d.key == key);
            let unchanged = match (self.get(key), sent) {
                (Some(stored), Some(sent)) => stored == sent,
                _ => false,
            };
            if unchanged {
                self.drafts.remove(key);
                removed += 1;
            } else if self.drafts.contains_key(key) {
                tracing::debug!(key = %key, "Draft changed during sync, keeping it pending");
            }
        }
        removed
    }

    /// Drop every draft, returning how many were discarded
    pub fn clear(&mut self) -> usize {
        let count = self.drafts.len();
        self.drafts.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SetId;

    fn element(account: &str, has_exception: bool) -> AffectedElement {
        AffectedElement {
            account_code: account.to_string(),
            description: String::new(),
            set_id: None,
            set_name: None,
            has_exception,
        }
    }

    fn key(account: &str) -> ExceptionKey {
        ExceptionKey::new(account, IncidentType::DocNull, None)
    }

    #[test]
    fn test_upsert_same_key_keeps_last() {
        let mut store = DraftStore::new();
        store.upsert(ExceptionDraft::create(key("a"), "first")).unwrap();
        store.upsert(ExceptionDraft::delete(key("a"))).unwrap();
        let replaced = store
            .upsert(ExceptionDraft::create(key("a"), "third"))
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(replaced.unwrap().action, DraftAction::Delete);
        let stored = store.get(&key("a")).unwrap();
        assert_eq!(stored.action, DraftAction::Create);
        assert_eq!(stored.reason, "third");
    }

    #[test]
    fn test_pending_batch_order_follows_latest_upsert() {
        let mut store = DraftStore::new();
        store.upsert(ExceptionDraft::create(key("a"), "")).unwrap();
        store.upsert(ExceptionDraft::create(key("b"), "")).unwrap();
        store.upsert(ExceptionDraft::create(key("c"), "")).unwrap();
        store.upsert(ExceptionDraft::create(key("a"), "again")).unwrap();

        let order: Vec<String> = store
            .pending_batch()
            .into_iter()
            .map(|d| d.key.account_code)
            .collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_upsert_rejects_classification_without_set() {
        let mut store = DraftStore::new();
        let bad = ExceptionKey::new("1-01", IncidentType::UnclassifiedAccount, None);

        assert!(store.upsert(ExceptionDraft::create(bad, "x")).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_toggle_mark_then_unmark_leaves_no_draft() {
        let mut store = DraftStore::new();
        let el = element("1-01-001", false);

        let first = store.toggle(&el, IncidentType::DocNull, "no aplica").unwrap();
        let second = store.toggle(&el, IncidentType::DocNull, "").unwrap();

        assert_eq!(first, ToggleOutcome::Drafted(DraftAction::Create));
        assert_eq!(second, ToggleOutcome::Cancelled);
        assert!(store.get(&key("1-01-001")).is_none());
    }

    #[test]
    fn test_toggle_server_exception_creates_delete_draft() {
        let mut store = DraftStore::new();
        let el = element("1-01-001", true);

        let outcome = store.toggle(&el, IncidentType::DocNull, "").unwrap();

        assert_eq!(outcome, ToggleOutcome::Drafted(DraftAction::Delete));
        assert_eq!(store.get(&key("1-01-001")).unwrap().action, DraftAction::Delete);
    }

    #[test]
    fn test_toggle_back_over_server_exception_keeps_a_draft() {
        let mut store = DraftStore::new();
        let el = element("1-01-001", true);

        store.toggle(&el, IncidentType::DocNull, "").unwrap();
        let outcome = store.toggle(&el, IncidentType::DocNull, "restaurada").unwrap();

        // A server exception exists, so the draft is replaced rather than dropped
        assert_eq!(outcome, ToggleOutcome::Drafted(DraftAction::Create));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_toggle_classification_is_set_scoped() {
        let mut store = DraftStore::new();
        let mut el = element("3-02", false);
        el.set_id = Some(SetId(5));

        store.toggle(&el, IncidentType::UnclassifiedAccount, "").unwrap();

        let scoped = ExceptionKey::new("3-02", IncidentType::UnclassifiedAccount, Some(SetId(5)));
        assert!(store.get(&scoped).is_some());
    }

    #[test]
    fn test_acknowledge_skips_drafts_replaced_mid_sync() {
        let mut store = DraftStore::new();
        store.upsert(ExceptionDraft::create(key("a"), "one")).unwrap();
        store.upsert(ExceptionDraft::create(key("b"), "two")).unwrap();
        let batch = store.pending_batch();

        store.upsert(ExceptionDraft::delete(key("b"))).unwrap();
        let removed = store.acknowledge(&[key("a"), key("b")], &batch);

        assert_eq!(removed, 1);
        assert!(store.get(&key("a")).is_none());
        assert_eq!(store.get(&key("b")).unwrap().action, DraftAction::Delete);
    }

    #[test]
    fn test_apply_intent_rejects_unmark_without_server_exception() {
        let mut store = DraftStore::new();

        let err = store
            .apply_intent(ExceptionDraft::delete(key("1-01-001")), false)
            .unwrap_err();

        assert!(matches!(err, IncidentError::Validation(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_apply_intent_rejects_mark_over_existing_exception() {
        let mut store = DraftStore::new();

        let err = store
            .apply_intent(ExceptionDraft::create(key("1-01-001"), "r"), true)
            .unwrap_err();

        assert!(matches!(err, IncidentError::Validation(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_apply_intent_unmark_cancels_local_create() {
        let mut store = DraftStore::new();
        store
            .apply_intent(ExceptionDraft::create(key("a"), "r"), false)
            .unwrap();

        let outcome = store
            .apply_intent(ExceptionDraft::delete(key("a")), false)
            .unwrap();

        assert_eq!(outcome, ToggleOutcome::Cancelled);
        assert!(store.is_empty());
    }

    #[test]
    fn test_apply_intent_drafts_changes_from_server_truth() {
        let mut store = DraftStore::new();

        let marked = store
            .apply_intent(ExceptionDraft::create(key("a"), "r"), false)
            .unwrap();
        let unmarked = store
            .apply_intent(ExceptionDraft::delete(key("b")), true)
            .unwrap();

        assert_eq!(marked, ToggleOutcome::Drafted(DraftAction::Create));
        assert_eq!(unmarked, ToggleOutcome::Drafted(DraftAction::Delete));
        assert_eq!(store.len(), 2);
    }
}
