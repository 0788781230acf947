//! Shared presence store: key-value with per-key expiry plus pub/sub channels.
//!
//! Every server process talks to the same store. Keys hold presence records,
//! channels carry cross-process login/logout signals.

pub mod backoff;
pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::time::Duration;

use crate::error::StoreError;

pub use self::backoff::Backoff;
pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// A single message received on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub channel: String,
    pub payload: String,
}

/// Stream of messages from one subscription. Ends when the underlying
/// connection is lost.
pub type Subscription = BoxStream<'static, ChannelMessage>;

#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous value, expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Reset the expiry of an existing key. Returns false if the key does not exist;
    /// a missing key is never recreated.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError>;

    /// Open a subscription to `channels`. Only messages published after this
    /// returns are delivered.
    async fn subscribe(&self, channels: &[&str]) -> Result<Subscription, StoreError>;
}
