use crate::shared::ids::{StateId, TransitionId, WorkflowId};
use crate::status::Status;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionEventKind {
    Before,
    After,
}

impl TransitionEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

impl std::fmt::Display for TransitionEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle notification payload. `status` is the former status on a
/// `Before` event and the freshly persisted one on `After`. `transition`
/// is absent for the initial placement pseudo-transition.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEvent {
    pub kind: TransitionEventKind,
    pub workflow_id: WorkflowId,
    pub subject_id: String,
    pub old_state: StateId,
    pub new_state: StateId,
    #[serde(default)]
    pub transition: Option<TransitionId>,
    pub status: Status,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

/// Fire-and-forget sink for lifecycle events. Publication happens
/// synchronously inside the transition; no return value is consumed.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: &TransitionEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotificationSink;

impl NotificationSink for NullNotificationSink {
    fn publish(&self, _event: &TransitionEvent) {}
}

/// Collects published events in order. Useful for audit trails and for
/// asserting notification behavior in tests.
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    events: Mutex<Vec<TransitionEvent>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TransitionEvent> {
        self.events.lock().expect("event sink lock poisoned").clone()
    }
}

impl NotificationSink for RecordingNotificationSink {
    fn publish(&self, event: &TransitionEvent) {
        let mut events = self.events.lock().expect("event sink lock poisoned");
        events.push(event.clone());
    }
}
