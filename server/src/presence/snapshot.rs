use axum::{extract::State, Json};

use crate::presence::record::{PresenceRecord, PresenceRecords};
use crate::state::AppState;
use crate::ws::broadcast::broadcast_to_all;
use crate::ws::protocol::ServerEvent;
use crate::ws::ConnectionRegistry;

/// Look up the presence record of every user registered here, in registry order.
///
/// Users whose record is missing, expired, malformed, or unreadable are left out.
/// One store read per user, sequentially.
pub async fn compute_snapshot(
    connections: &ConnectionRegistry,
    records: &PresenceRecords,
) -> Vec<PresenceRecord> {
    let mut online = Vec::new();

    for user_id in connections.keys() {
        match records.get(&user_id).await {
            Ok(Some(record)) => online.push(record),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Presence read failed, omitting from snapshot");
            }
        }
    }

    online
}

/// Compute the snapshot and push it as one `onlineUsers` message to every
/// connected client in this process. Returns how many clients it was queued for.
pub async fn broadcast_snapshot(state: &AppState) -> usize {
    let online = compute_snapshot(&state.connections, &state.records).await;
    let count = online.len();
    let delivered = broadcast_to_all(&state.clients, &ServerEvent::OnlineUsers(online));

    tracing::debug!(online = count, clients = delivered, "Broadcast online users");
    delivered
}

/// GET /api/presence: current snapshot for this process.
pub async fn get_presence(State(state): State<AppState>) -> Json<Vec<PresenceRecord>> {
    Json(compute_snapshot(&state.connections, &state.records).await)
}
