use super::protocol::ServerEvent;
use super::{ConnectedClients, ConnectionHandle};

/// Send a server event to every connected client. Returns how many clients it was queued for.
pub fn broadcast_to_all(clients: &ConnectedClients, event: &ServerEvent) -> usize {
    let msg = match event.to_message() {
        Ok(msg) => msg,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server event");
            return 0;
        }
    };

    let mut delivered = 0;
    for entry in clients.iter() {
        if entry.value().send(msg.clone()).is_ok() {
            delivered += 1;
        }
    }
    delivered
}

/// Send a server event to one specific connection.
pub fn send_to_connection(handle: &ConnectionHandle, event: &ServerEvent) -> bool {
    match event.to_message() {
        Ok(msg) => handle.sender.send(msg).is_ok(),
        Err(e) => {
            tracing::error!(conn_id = %handle.id, error = %e, "Failed to encode server event");
            false
        }
    }
}
