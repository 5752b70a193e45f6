//! Session event system for connection and state notifications.
//!
//! Every [`Session`](crate::Session) owns an [`EventDispatcher`]; host code
//! subscribes to it to learn about connects, disconnects, fresh state and
//! poll failures without polling the session itself.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;

use prana_types::DeviceState;

/// Events that can be emitted by a session.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DeviceEvent {
    /// A new link was established.
    Connected {
        device: String,
        /// Link generation; increments on every reconnect.
        generation: u64,
    },
    /// The link went away.
    Disconnected {
        device: String,
        reason: DisconnectReason,
    },
    /// A state frame was received and decoded.
    StateUpdated {
        device: String,
        state: DeviceState,
        #[serde(with = "time::serde::rfc3339")]
        captured_at: OffsetDateTime,
    },
    /// A set command was written to the device.
    CommandSent { device: String, command: String },
    /// A scheduled state refresh failed.
    PollFailed {
        device: String,
        error: String,
        consecutive_failures: u32,
    },
}

impl DeviceEvent {
    /// Address of the device the event refers to.
    pub fn device(&self) -> &str {
        match self {
            Self::Connected { device, .. }
            | Self::Disconnected { device, .. }
            | Self::StateUpdated { device, .. }
            | Self::CommandSent { device, .. }
            | Self::PollFailed { device, .. } => device,
        }
    }
}

/// Reason for disconnection.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DisconnectReason {
    /// The session was shut down.
    Shutdown,
    /// The device or BLE stack dropped the link.
    LinkLost,
    /// The session tore the link down after a failed exchange.
    Invalidated(String),
}

/// Sender for session events.
pub type EventSender = broadcast::Sender<DeviceEvent>;

/// Receiver for session events.
pub type EventReceiver = broadcast::Receiver<DeviceEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: DeviceEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = DeviceEvent::Disconnected {
            device: "AA:BB:CC:DD:EE:FF".into(),
            reason: DisconnectReason::LinkLost,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "disconnected");
        assert_eq!(json["reason"], "link_lost");
        assert_eq!(json["device"], "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_state_updated_round_trip() {
        let event = DeviceEvent::StateUpdated {
            device: "dev".into(),
            state: DeviceState {
                power: true,
                speed: 4,
                ..Default::default()
            },
            captured_at: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"state_updated\""));
        assert!(json.contains("1970-01-01T00:00:00Z"));

        let back: DeviceEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.device(), "dev");
    }

    #[tokio::test]
    async fn test_dispatcher_fan_out() {
        let dispatcher = EventDispatcher::new(8);
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        dispatcher.send(DeviceEvent::Connected {
            device: "dev".into(),
            generation: 1,
        });

        assert!(matches!(a.recv().await.unwrap(), DeviceEvent::Connected { generation: 1, .. }));
        assert!(matches!(b.recv().await.unwrap(), DeviceEvent::Connected { generation: 1, .. }));
    }

    #[test]
    fn test_send_without_receivers() {
        let dispatcher = EventDispatcher::default();
        dispatcher.send(DeviceEvent::CommandSent {
            device: "dev".into(),
            command: "BE EF 04 0A".into(),
        });
        assert_eq!(dispatcher.receiver_count(), 0);
    }
}
