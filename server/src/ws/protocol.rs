//! Wire format for the client-facing connection.
//!
//! Every frame is a JSON text message `{"event": <name>, "data": <payload>}`.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::presence::record::PresenceRecord;

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// `{"id": "...", ...metadata}`. No acknowledgment is sent.
    Register(Registration),
}

/// Payload of a `register` event: the user id plus arbitrary metadata fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Full snapshot of online users, sent to every connection after each change.
    OnlineUsers(Vec<PresenceRecord>),
    /// Sent to one connection to make the client end its session.
    Logout,
}

impl ServerEvent {
    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        let text = serde_json::to_string(self)?;
        Ok(Message::Text(text.into()))
    }
}

/// Parse an incoming text frame.
pub fn parse_client_event(text: &str) -> Result<ClientEvent, serde_json::Error> {
    serde_json::from_str(text)
}
