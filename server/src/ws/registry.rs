use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

use super::{ConnId, ConnectionHandle};

/// Users registered on this process, mapped to the connection they registered on.
///
/// At most one entry per user. Iteration follows first-insertion order; overwriting
/// an existing user keeps its position. Cheap to clone, all clones share one map.
/// The lock is never held across an await point.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<IndexMap<String, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `user_id` to `handle`, returning the handle it replaced.
    /// The replaced connection is left open.
    pub fn put(&self, user_id: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.inner.lock().insert(user_id.to_string(), handle)
    }

    pub fn remove(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.inner.lock().shift_remove(user_id)
    }

    /// Remove `user_id` only if it is still mapped to connection `conn_id`.
    pub fn remove_if_owned(&self, user_id: &str, conn_id: ConnId) -> bool {
        let mut map = self.inner.lock();
        if map.get(user_id).is_some_and(|h| h.id == conn_id) {
            map.shift_remove(user_id);
            true
        } else {
            false
        }
    }

    pub fn get(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.inner.lock().get(user_id).cloned()
    }

    /// Reverse lookup: which user is registered on connection `conn_id`.
    pub fn find_user_by_handle(&self, conn_id: ConnId) -> Option<String> {
        self.inner
            .lock()
            .iter()
            .find(|(_, handle)| handle.id == conn_id)
            .map(|(user_id, _)| user_id.clone())
    }

    /// Remove whichever user is registered on connection `conn_id`, under one lock,
    /// so a concurrent `put` for that user is never removed by mistake.
    pub fn remove_by_handle(&self, conn_id: ConnId) -> Option<String> {
        let mut map = self.inner.lock();
        let index = map.values().position(|handle| handle.id == conn_id)?;
        map.shift_remove_index(index).map(|(user_id, _)| user_id)
    }

    /// Registered user ids in registry order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
