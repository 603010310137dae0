//! Notification hub actor.

use super::{NotificationSink, messages::RoomMessage};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Identifies one subscriber connection
pub type ConnectionId = Uuid;

/// Default inbox capacity
pub const DEFAULT_HUB_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("notification hub is closed")]
pub struct HubClosed;

/// Messages understood by the hub
#[derive(Debug)]
pub enum HubMessage {
    /// Add a connection to a room
    Register {
        room: String,
        connection_id: ConnectionId,
        sender: mpsc::Sender<RoomMessage>,
    },

    /// Remove a connection from a room
    Unregister {
        room: String,
        connection_id: ConnectionId,
    },

    /// Deliver to every connection of `message.room_id`
    Broadcast(RoomMessage),

    /// Number of live connections in a room
    RoomSize {
        room: String,
        response: oneshot::Sender<usize>,
    },

    /// Stop the actor
    Shutdown,
}

/// Cloneable handle to a running [`NotificationHub`]
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubMessage>,
}

impl HubHandle {
    pub async fn register(
        &self,
        room: impl Into<String>,
        connection_id: ConnectionId,
        sender: mpsc::Sender<RoomMessage>,
    ) -> Result<(), HubClosed> {
        self.send(HubMessage::Register {
            room: room.into(),
            connection_id,
            sender,
        })
        .await
    }

    pub async fn unregister(
        &self,
        room: impl Into<String>,
        connection_id: ConnectionId,
    ) -> Result<(), HubClosed> {
        self.send(HubMessage::Unregister {
            room: room.into(),
            connection_id,
        })
        .await
    }

    pub async fn room_size(&self, room: impl Into<String>) -> Result<usize, HubClosed> {
        let (response, rx) = oneshot::channel();
        self.send(HubMessage::RoomSize {
            room: room.into(),
            response,
        })
        .await?;
        rx.await.map_err(|_| HubClosed)
    }

    pub async fn shutdown(&self) -> Result<(), HubClosed> {
        self.send(HubMessage::Shutdown).await
    }

    async fn send(&self, message: HubMessage) -> Result<(), HubClosed> {
        self.sender.send(message).await.map_err(|_| HubClosed)
    }
}

impl NotificationSink for HubHandle {
    fn broadcast_to_room(&self, message: RoomMessage) {
        match self.sender.try_send(HubMessage::Broadcast(message)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(HubMessage::Broadcast(message))) => {
                log::warn!("Hub inbox full, dropping message for {}", message.room_id);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("Hub inbox full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::warn!("Hub closed, dropping message");
            }
        }
    }
}

/// Owns every room subscription. All mutation arrives through the inbox.
pub struct NotificationHub {
    inbox: mpsc::Receiver<HubMessage>,
    rooms: HashMap<String, HashMap<ConnectionId, mpsc::Sender<RoomMessage>>>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> (Self, HubHandle) {
        let (sender, inbox) = mpsc::channel(capacity);
        let hub = Self {
            inbox,
            rooms: HashMap::new(),
        };
        (hub, HubHandle { sender })
    }

    /// Spawn the actor on the current runtime.
    pub fn spawn(capacity: usize) -> (HubHandle, tokio::task::JoinHandle<()>) {
        let (hub, handle) = Self::new(capacity);
        (handle, tokio::spawn(hub.run()))
    }

    /// Run until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        log::info!("Notification hub starting");

        while let Some(message) = self.inbox.recv().await {
            if !self.handle_message(message) {
                break;
            }
        }

        log::info!("Notification hub stopped");
    }

    fn handle_message(&mut self, message: HubMessage) -> bool {
        match message {
            HubMessage::Register {
                room,
                connection_id,
                sender,
            } => {
                log::debug!("Connection {connection_id} joined {room}");
                self.rooms
                    .entry(room)
                    .or_default()
                    .insert(connection_id, sender);
            }

            HubMessage::Unregister {
                room,
                connection_id,
            } => {
                if let Some(members) = self.rooms.get_mut(&room) {
                    members.remove(&connection_id);
                    if members.is_empty() {
                        self.rooms.remove(&room);
                    }
                }
                log::debug!("Connection {connection_id} left {room}");
            }

            HubMessage::Broadcast(message) => self.broadcast(message),

            HubMessage::RoomSize { room, response } => {
                let size = self.rooms.get(&room).map_or(0, HashMap::len);
                let _ = response.send(size);
            }

            HubMessage::Shutdown => return false,
        }

        true
    }

    fn broadcast(&mut self, message: RoomMessage) {
        let Some(members) = self.rooms.get_mut(&message.room_id) else {
            return;
        };

        members.retain(|connection_id, sender| match sender.try_send(message.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("Connection {connection_id} channel full, dropping message");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("Connection {connection_id} disconnected, removing");
                false
            }
        });

        if members.is_empty() {
            self.rooms.remove(&message.room_id);
        }
    }
}
