/// Real-time event payloads
///
/// Sockets receive events as `{"event": "...", "data": ...}`. Between
/// instances, events travel inside an [`Envelope`] that names the sending
/// instance and the account the event is addressed to.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Task;

/// Task change pushed to connected sockets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RealtimeEvent {
    TaskCreated(Task),
    TaskUpdated(Task),
    TaskDeleted { id: Uuid },
}

impl RealtimeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::TaskCreated(_) => "task_created",
            RealtimeEvent::TaskUpdated(_) => "task_updated",
            RealtimeEvent::TaskDeleted { .. } => "task_deleted",
        }
    }
}

/// Wire format on the pub/sub channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Instance that emitted the event
    pub origin: Uuid,

    /// Account whose sockets should receive the event
    pub audience: Uuid,

    pub event: RealtimeEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(RealtimeEvent::TaskDeleted { id }).unwrap();

        assert_eq!(json["event"], "task_deleted");
        assert_eq!(json["data"]["id"], id.to_string());
        assert_eq!(RealtimeEvent::TaskDeleted { id }.name(), "task_deleted");
    }

    #[test]
    fn test_envelope_parses_back() {
        let envelope = Envelope {
            origin: Uuid::new_v4(),
            audience: Uuid::new_v4(),
            event: RealtimeEvent::TaskDeleted { id: Uuid::new_v4() },
        };
        let payload = serde_json::to_string(&envelope).unwrap();
        let parsed: Envelope = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed, envelope);
    }
}
