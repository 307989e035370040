//! Presentation events for loggers, notifiers and image savers.

use rollcall_types::{IdentityId, Outcome, Timestamp};
use serde::Serialize;
use tokio::sync::broadcast;

/// Default number of events buffered per subscriber before it starts lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// One record per presentation attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PresentationEvent {
    pub outcome: Outcome,
    pub identity_id: Option<IdentityId>,
    pub display_name: String,
    pub group_label: String,
    pub timestamp: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Fire-and-forget fan-out of [`PresentationEvent`]s.
///
/// Emitting never blocks and never fails: with no subscribers the event is
/// dropped, and a subscriber that falls behind loses its oldest events
/// (it observes `RecvError::Lagged`).
pub struct EventBus {
    tx: broadcast::Sender<PresentationEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresentationEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: PresentationEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
