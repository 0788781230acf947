//! Per-connection presence lifecycle.
//!
//! ```text
//! Connected --register--> Registered(user_id) --disconnect--> Terminated
//!     |                        |  ^
//!     |                        +--+ register (last registration wins)
//!     +--------------disconnect-----------------------------> Terminated
//! ```
//!
//! A remote logout removes the registry entry out from under a registered
//! connection; its later disconnect then finds nothing to clean up.

use crate::presence::snapshot::broadcast_snapshot;
use crate::state::AppState;
use crate::ws::protocol::{ClientEvent, Registration};
use crate::ws::ConnectionHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Registered(String),
    Terminated,
}

/// Presence side of one live connection.
pub struct Connection {
    handle: ConnectionHandle,
    state: ConnectionState,
}

impl Connection {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            state: ConnectionState::Connected,
        }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Single entry point for client events.
    pub async fn dispatch(&mut self, event: ClientEvent, app: &AppState) {
        if self.state == ConnectionState::Terminated {
            tracing::debug!(conn_id = %self.handle.id, "Event on terminated connection ignored");
            return;
        }

        match event {
            ClientEvent::Register(registration) => self.register(registration, app).await,
        }
    }

    async fn register(&mut self, registration: Registration, app: &AppState) {
        let Registration { id, metadata } = registration;

        if let ConnectionState::Registered(previous) = &self.state {
            if *previous != id && app.connections.remove_if_owned(previous, self.handle.id) {
                tracing::info!(
                    conn_id = %self.handle.id,
                    from = %previous,
                    to = %id,
                    "Connection re-registered under a different user"
                );
                if let Err(e) = app.records.mark_offline(previous).await {
                    tracing::error!(user_id = %previous, error = %e, "Failed to clear replaced presence");
                }
            }
        }

        if let Some(replaced) = app.connections.put(&id, self.handle.clone()) {
            if replaced != self.handle {
                tracing::debug!(
                    user_id = %id,
                    old_conn_id = %replaced.id,
                    "User registered from a new connection, old connection left open"
                );
            }
        }
        self.state = ConnectionState::Registered(id.clone());

        match app.records.mark_online(&id, metadata, self.handle.id).await {
            Ok(record) => tracing::info!(
                user_id = %id,
                conn_id = %self.handle.id,
                fields = record.identity.len(),
                "User registered and marked online"
            ),
            Err(e) => tracing::error!(user_id = %id, error = %e, "Failed to mark user online"),
        }

        broadcast_snapshot(app).await;
    }

    /// Re-arm the TTL of this connection's record, if it still owns a registry entry.
    pub async fn refresh(&self, app: &AppState) {
        let ConnectionState::Registered(user_id) = &self.state else {
            return;
        };
        if app.connections.get(user_id).as_ref() != Some(&self.handle) {
            return;
        }

        match app.records.refresh(user_id).await {
            Ok(true) => tracing::debug!(user_id = %user_id, "Presence TTL refreshed"),
            Ok(false) => tracing::debug!(user_id = %user_id, "Presence record gone, not refreshed"),
            Err(e) => tracing::warn!(user_id = %user_id, error = %e, "Presence refresh failed"),
        }
    }

    /// Transport closed. Cleans up whatever user is registered on this handle.
    pub async fn terminate(&mut self, app: &AppState) {
        if self.state == ConnectionState::Terminated {
            return;
        }
        self.state = ConnectionState::Terminated;

        let Some(user_id) = app.connections.remove_by_handle(self.handle.id) else {
            return;
        };

        if let Err(e) = app.records.mark_offline(&user_id).await {
            tracing::error!(user_id = %user_id, error = %e, "Failed to mark user offline");
        }
        tracing::info!(
            user_id = %user_id,
            conn_id = %self.handle.id,
            "User disconnected and marked offline"
        );

        broadcast_snapshot(app).await;
    }
}
