//! Event types and the broadcast EventBus
//!
//! Events carry plain identifiers (closure ids, incident type codes, state names) so
//! that any consumer, including a UI bridge or a log sink, can subscribe without
//! depending on the incident model crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Closure-review event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClosureEvent {
    /// A consolidated incident snapshot replaced the rendered one
    IncidentsLoaded {
        closure_id: i64,
        incident_count: usize,
        /// True when the snapshot came from the forced-fresh path
        fresh: bool,
        timestamp: DateTime<Utc>,
    },

    /// A synchronization pass finished (fully or partially)
    ExceptionsSynced {
        closure_id: i64,
        applied: usize,
        requested: usize,
        /// Error message of the draft that stopped the pass
        failure: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Reprocess orchestrator changed state
    OrchestratorTransition {
        closure_id: i64,
        from: String,
        to: String,
        timestamp: DateTime<Utc>,
    },

    /// A full sync → reprocess → fresh reload cycle completed
    Reprocessed {
        closure_id: i64,
        new_iteration: i64,
        status: String,
        timestamp: DateTime<Utc>,
    },

    /// Closure status poller observed the current closure status
    ClosureStatusPolled {
        closure_id: i64,
        status: String,
        iteration: Option<i64>,
        timestamp: DateTime<Utc>,
    },
}

impl ClosureEvent {
    /// Closure the event belongs to
    pub fn closure_id(&self) -> i64 {
        match self {
            ClosureEvent::IncidentsLoaded { closure_id, .. }
            | ClosureEvent::ExceptionsSynced { closure_id, .. }
            | ClosureEvent::OrchestratorTransition { closure_id, .. }
            | ClosureEvent::Reprocessed { closure_id, .. }
            | ClosureEvent::ClosureStatusPolled { closure_id, .. } => *closure_id,
        }
    }
}

/// Central event distribution bus
///
/// Uses `tokio::sync::broadcast` internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use cierre_common::events::{ClosureEvent, EventBus};
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(ClosureEvent::IncidentsLoaded {
///     closure_id: 7,
///     incident_count: 3,
///     fresh: false,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().closure_id(), 7);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClosureEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ClosureEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ClosureEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<ClosureEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ClosureEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
