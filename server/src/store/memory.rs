use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::{ChannelMessage, PresenceStore, Subscription};
use crate::error::StoreError;

/// Capacity of the in-memory bus. Slow subscribers skip what they missed.
const BUS_CAPACITY: usize = 1024;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process presence store.
///
/// Keys expire on the tokio clock, so paused-time tests can step past a TTL.
/// Wrap it in an `Arc` and hand it to several `AppState`s to get several
/// "processes" sharing one store.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    bus: broadcast::Sender<ChannelMessage>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            bus,
        }
    }

    /// Remaining time to live for `key`, if it exists.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.expires_at - now)
    }

    /// Number of live (non-expired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PresenceStore for MemoryStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let live = match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = now + ttl;
                return Ok(true);
            }
            Some(_) => false,
            None => return Ok(false),
        };
        if !live {
            entries.remove(key);
        }
        Ok(false)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        // No receivers is fine: pub/sub drops messages nobody listens for.
        let _ = self.bus.send(ChannelMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }

    async fn subscribe(&self, channels: &[&str]) -> Result<Subscription, StoreError> {
        let wanted: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
        let rx = self.bus.subscribe();

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(msg) => return Some((msg, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped = skipped, "In-memory subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .filter(move |msg| futures_util::future::ready(wanted.contains(&msg.channel)));

        Ok(stream.boxed())
    }
}
