//! Room-based notifications.
//!
//! Core services only see [`NotificationSink`]. In the server it is backed by
//! a [`HubHandle`] to the [`NotificationHub`] actor, which fans messages out to
//! WebSocket connections subscribed to a room.

pub mod hub;
pub mod messages;

pub use hub::{
    ConnectionId, DEFAULT_HUB_CAPACITY, HubClosed, HubHandle, HubMessage, NotificationHub,
};
pub use messages::{MessageType, RoomMessage, tournament_room};

/// Outbound notification seam. Delivery is best effort and never blocks.
pub trait NotificationSink: Send + Sync {
    fn broadcast_to_room(&self, message: RoomMessage);
}

/// Sink that keeps every message, for assertions in tests.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: std::sync::Mutex<Vec<RoomMessage>>,
}

#[cfg(any(test, feature = "test-util"))]
impl RecordingSink {
    pub fn messages(&self) -> Vec<RoomMessage> {
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn types(&self) -> Vec<MessageType> {
        self.messages().iter().map(|m| m.message_type).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.messages().is_empty()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl NotificationSink for RecordingSink {
    fn broadcast_to_room(&self, message: RoomMessage) {
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(message);
    }
}
