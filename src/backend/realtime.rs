/// Realtime step notifications
///
/// The backend pushes an event whenever a step is added, updated or tested
/// outside the local editor (another tab, a background test run). Events fan
/// out to every subscriber over a tokio broadcast channel.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Kind of step notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RealtimeEventKind {
    StepAdded,
    StepUpdated,
    StepTested,
}

/// One realtime notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeEvent {
    #[serde(rename = "type")]
    pub kind: RealtimeEventKind,
    pub flow_id: String,
    pub flow_version_id: String,
    /// Missing when the event concerns the whole version
    #[serde(default)]
    pub step_id: Option<String>,
}

impl RealtimeEvent {
    pub fn step(
        kind: RealtimeEventKind,
        flow_id: impl Into<String>,
        flow_version_id: impl Into<String>,
        step_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            flow_id: flow_id.into(),
            flow_version_id: flow_version_id.into(),
            step_id: Some(step_id.into()),
        }
    }
}

/// Broadcast hub for realtime events
#[derive(Debug, Clone)]
pub struct RealtimeChannel {
    sender: broadcast::Sender<RealtimeEvent>,
}

impl RealtimeChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver an event to every current subscriber
    ///
    /// Returns how many subscribers received it; zero when nobody listens,
    /// in which case the event is dropped.
    pub fn publish(&self, event: RealtimeEvent) -> usize {
        tracing::debug!(
            "📡 Realtime {:?} for flow {} step {:?}",
            event.kind,
            event.flow_id,
            event.step_id
        );
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
