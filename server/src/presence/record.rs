//! Presence records in the shared store.
//!
//! A non-expired record under `userStatus:{userId}` is what makes a user "online"
//! across every process. Writes are unconditional (last writer wins).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;
use crate::store::PresenceStore;
use crate::ws::ConnId;

/// Default record lifetime: one day.
pub const DEFAULT_PRESENCE_TTL: Duration = Duration::from_secs(86_400);

const KEY_PREFIX: &str = "userStatus:";

/// Keys the server owns inside a record; client metadata cannot override them.
const RESERVED_FIELDS: &[&str] = &["online", "connectionRef", "timestamp"];

pub fn presence_key(user_id: &str) -> String {
    format!("{KEY_PREFIX}{user_id}")
}

/// JSON shape stored per user and pushed to clients in `onlineUsers`.
///
/// `identity` carries the user id (`id`) plus whatever metadata the client
/// registered with, flattened into the top-level object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub online: bool,
    #[serde(flatten)]
    pub identity: Map<String, Value>,
    #[serde(
        rename = "connectionRef",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub connection_ref: Option<String>,
    /// Milliseconds since the Unix epoch when the record was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl PresenceRecord {
    pub fn user_id(&self) -> Option<&str> {
        self.identity.get("id").and_then(Value::as_str)
    }
}

/// Reads and writes presence records. Never touches the connection registry.
#[derive(Clone)]
pub struct PresenceRecords {
    store: Arc<dyn PresenceStore>,
    ttl: Duration,
}

impl PresenceRecords {
    pub fn new(store: Arc<dyn PresenceStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn store(&self) -> &Arc<dyn PresenceStore> {
        &self.store
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Write a full record for a user registered on connection `conn_id`.
    pub async fn mark_online(
        &self,
        user_id: &str,
        mut metadata: Map<String, Value>,
        conn_id: ConnId,
    ) -> Result<PresenceRecord, StoreError> {
        for field in RESERVED_FIELDS {
            metadata.remove(*field);
        }
        metadata.insert("id".to_string(), Value::String(user_id.to_string()));

        let record = PresenceRecord {
            online: true,
            identity: metadata,
            connection_ref: Some(conn_id.to_string()),
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
        };
        self.write(user_id, &record).await?;
        Ok(record)
    }

    /// Write the minimal record for a user that logged in somewhere else.
    /// Replaces any richer record already present.
    pub async fn mark_login(&self, user_id: &str) -> Result<PresenceRecord, StoreError> {
        let mut identity = Map::new();
        identity.insert("id".to_string(), Value::String(user_id.to_string()));

        let record = PresenceRecord {
            online: true,
            identity,
            connection_ref: None,
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
        };
        self.write(user_id, &record).await?;
        Ok(record)
    }

    /// Delete the user's record. Idempotent.
    pub async fn mark_offline(&self, user_id: &str) -> Result<(), StoreError> {
        self.store.delete(&presence_key(user_id)).await
    }

    /// Push the record's expiry out by another TTL. Returns false if the record
    /// is gone (deleted or expired); it is not recreated.
    pub async fn refresh(&self, user_id: &str) -> Result<bool, StoreError> {
        self.store.expire(&presence_key(user_id), self.ttl).await
    }

    /// Read a user's record. A value that does not decode is logged and treated as absent.
    pub async fn get(&self, user_id: &str) -> Result<Option<PresenceRecord>, StoreError> {
        let Some(raw) = self.store.get(&presence_key(user_id)).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<PresenceRecord>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Malformed presence record");
                Ok(None)
            }
        }
    }

    async fn write(&self, user_id: &str, record: &PresenceRecord) -> Result<(), StoreError> {
        let value = serde_json::to_string(record)?;
        self.store.set(&presence_key(user_id), &value, self.ttl).await
    }
}
