use std::sync::Arc;
use std::time::Duration;

use crate::presence::PresenceRecords;
use crate::store::PresenceStore;
use crate::ws::{new_connected_clients, ConnectedClients, ConnectionRegistry};

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Every live WebSocket connection in this process
    pub clients: ConnectedClients,
    /// Users registered on this process -> their connection
    pub connections: ConnectionRegistry,
    /// Presence records in the shared store
    pub records: PresenceRecords,
    /// How often a registered connection re-arms its record's TTL (None = never)
    pub refresh_interval: Option<Duration>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PresenceStore>,
        presence_ttl: Duration,
        refresh_interval: Option<Duration>,
    ) -> Self {
        Self {
            clients: new_connected_clients(),
            connections: ConnectionRegistry::new(),
            records: PresenceRecords::new(store, presence_ttl),
            refresh_interval,
        }
    }
}
