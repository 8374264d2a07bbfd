//! In-memory [`RemoteCacheClient`] for tests.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::client::{RemoteCacheClient, SetError};

/// A write accepted by [`MockRemoteCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSet {
    pub key: String,
    pub value: Bytes,
    pub ttl: Duration,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Bytes>,
    sets: Vec<MockSet>,
    get_multi_calls: Vec<Vec<String>>,
    fail_sets: bool,
    unavailable: bool,
}

/// Remote cache client backed by a map.
///
/// Writes become visible immediately and TTLs are recorded but never
/// enforced.
#[derive(Debug, Default)]
pub struct MockRemoteCache {
    state: Mutex<State>,
}

impl MockRemoteCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pre-populate `key` without recording a write.
    pub fn with_entry(
        self: Arc<Self>,
        key: impl Into<String>,
        value: impl Into<Bytes>,
    ) -> Arc<Self> {
        self.state.lock().entries.insert(key.into(), value.into());
        self
    }

    /// Make every following [`set_async`](RemoteCacheClient::set_async) fail.
    pub fn fail_sets(self: Arc<Self>) -> Arc<Self> {
        self.state.lock().fail_sets = true;
        self
    }

    /// Answer every following [`get_multi`](RemoteCacheClient::get_multi)
    /// with an empty map, as a client does when the backend is unreachable.
    pub fn unavailable(self: Arc<Self>) -> Arc<Self> {
        self.state.lock().unavailable = true;
        self
    }

    /// Accepted writes, oldest first.
    pub fn sets(&self) -> Vec<MockSet> {
        self.state.lock().sets.clone()
    }

    /// Key batches passed to `get_multi`, oldest first.
    pub fn get_multi_calls(&self) -> Vec<Vec<String>> {
        self.state.lock().get_multi_calls.clone()
    }

    /// Current value of `key`, whether written or pre-populated.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.state.lock().entries.get(key).cloned()
    }
}

#[async_trait]
impl RemoteCacheClient for MockRemoteCache {
    fn set_async(&self, key: String, value: Bytes, ttl: Duration) -> Result<(), SetError> {
        let mut state = self.state.lock();
        if state.fail_sets {
            return Err(SetError::QueueFull { capacity: 0 });
        }

        state.entries.insert(key.clone(), value.clone());
        state.sets.push(MockSet { key, value, ttl });
        Ok(())
    }

    async fn get_multi(&self, keys: &[String]) -> HashMap<String, Bytes> {
        let mut state = self.state.lock();
        state.get_multi_calls.push(keys.to_vec());

        if state.unavailable {
            return HashMap::new();
        }

        keys.iter()
            .filter_map(|k| state.entries.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }
}
