pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod lifecycle;
pub mod protocol;
pub mod registry;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

pub use registry::ConnectionRegistry;

/// Process-local identifier of one live WebSocket connection.
pub type ConnId = Uuid;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Every live connection in this process, registered or not.
/// Broadcasts go to all of them.
pub type ConnectedClients = Arc<DashMap<ConnId, ConnectionSender>>;

/// Create a new empty set of connected clients.
pub fn new_connected_clients() -> ConnectedClients {
    Arc::new(DashMap::new())
}

/// Opaque reference to one live connection. Valid only while that connection is open.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnId,
    pub sender: ConnectionSender,
}

impl ConnectionHandle {
    pub fn new(sender: ConnectionSender) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
        }
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}
