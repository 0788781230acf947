//! Cross-process login/logout signals.
//!
//! Other processes (or the auth service) publish `{"userId": ...}` on the `login`
//! and `logout` channels. A logout for a user connected here tells that
//! connection to end its session, which is how a new session elsewhere evicts a
//! stale one.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::error::StoreError;
use crate::presence::snapshot::broadcast_snapshot;
use crate::state::AppState;
use crate::store::{Backoff, ChannelMessage, Subscription};
use crate::ws::broadcast::send_to_connection;
use crate::ws::protocol::ServerEvent;

pub const LOGIN_CHANNEL: &str = "login";
pub const LOGOUT_CHANNEL: &str = "logout";

/// Payload carried on both channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSignal {
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Login,
    Logout,
}

impl SignalKind {
    pub fn from_channel(channel: &str) -> Option<Self> {
        match channel {
            LOGIN_CHANNEL => Some(Self::Login),
            LOGOUT_CHANNEL => Some(Self::Logout),
            _ => None,
        }
    }
}

/// Subscribe to the login/logout channels, then run the reconciler in the background.
///
/// Subscribing happens before this returns, so anything published afterwards is seen.
/// If the subscription drops later, the task resubscribes with backoff.
pub async fn spawn(state: AppState) -> Result<JoinHandle<()>, StoreError> {
    let subscription = subscribe(&state).await?;
    tracing::info!("Subscribed to {} and {} channels", LOGIN_CHANNEL, LOGOUT_CHANNEL);
    Ok(tokio::spawn(run(state, subscription)))
}

async fn subscribe(state: &AppState) -> Result<Subscription, StoreError> {
    state
        .records
        .store()
        .subscribe(&[LOGIN_CHANNEL, LOGOUT_CHANNEL])
        .await
}

async fn run(state: AppState, mut subscription: Subscription) {
    let mut backoff = Backoff::new();

    loop {
        while let Some(msg) = subscription.next().await {
            handle_message(&state, &msg).await;
        }
        tracing::warn!("Presence subscription ended, resubscribing");

        subscription = loop {
            let delay = backoff.next_delay();
            tokio::time::sleep(delay).await;
            match subscribe(&state).await {
                Ok(sub) => {
                    backoff.reset();
                    tracing::info!("Presence subscription restored");
                    break sub;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        waited_ms = delay.as_millis() as u64,
                        "Resubscribe failed"
                    );
                }
            }
        };
    }
}

/// Apply one channel message, then broadcast the new snapshot.
///
/// Messages on unknown channels or with an unparseable payload are logged and
/// dropped without a broadcast.
pub async fn handle_message(state: &AppState, msg: &ChannelMessage) {
    let Some(kind) = SignalKind::from_channel(&msg.channel) else {
        tracing::debug!(channel = %msg.channel, "Ignoring message on unknown channel");
        return;
    };

    let signal: PresenceSignal = match serde_json::from_str(&msg.payload) {
        Ok(signal) => signal,
        Err(e) => {
            tracing::warn!(
                channel = %msg.channel,
                error = %e,
                "Malformed presence signal"
            );
            return;
        }
    };

    match kind {
        SignalKind::Login => handle_login(state, &signal.user_id).await,
        SignalKind::Logout => handle_logout(state, &signal.user_id).await,
    }

    broadcast_snapshot(state).await;
}

async fn handle_login(state: &AppState, user_id: &str) {
    match state.records.mark_login(user_id).await {
        Ok(_) => tracing::info!(user_id = %user_id, "Login signal received"),
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "Failed to record remote login");
        }
    }
}

async fn handle_logout(state: &AppState, user_id: &str) {
    if let Some(handle) = state.connections.get(user_id) {
        send_to_connection(&handle, &ServerEvent::Logout);
        state.connections.remove_if_owned(user_id, handle.id);
        tracing::info!(
            user_id = %user_id,
            conn_id = %handle.id,
            "Forced logout of local session"
        );
    }

    // The record goes whether or not the user was connected here.
    if let Err(e) = state.records.mark_offline(user_id).await {
        tracing::error!(user_id = %user_id, error = %e, "Failed to clear presence on logout");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_kind_from_channel() {
        assert_eq!(SignalKind::from_channel("login"), Some(SignalKind::Login));
        assert_eq!(SignalKind::from_channel("logout"), Some(SignalKind::Logout));
        assert_eq!(SignalKind::from_channel("userStatus"), None);
    }

    #[test]
    fn test_signal_payload_uses_camel_case() {
        let signal: PresenceSignal = serde_json::from_str(r#"{"userId":"u7"}"#).unwrap();
        assert_eq!(signal.user_id, "u7");
        assert!(serde_json::from_str::<PresenceSignal>(r#"{"user_id":"u7"}"#).is_err());
    }
}
