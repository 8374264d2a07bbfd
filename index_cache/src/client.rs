//! Interface of the remote key-value cache the index cache talks to.

use std::{collections::HashMap, fmt::Debug, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use snafu::Snafu;

/// Error returned when a write cannot be handed to the remote cache client.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SetError {
    #[snafu(display("remote cache write queue is full (capacity {capacity})"))]
    QueueFull { capacity: usize },

    #[snafu(display("remote cache client is closed"))]
    Closed,

    #[snafu(display("remote cache rejected write: {source}"))]
    Backend {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// A memcached-style remote cache client.
///
/// Transport, retries, timeouts and server selection are the client's
/// concern.
#[async_trait]
pub trait RemoteCacheClient: Debug + Send + Sync + 'static {
    /// Enqueue a write of `value` under `key`, expiring after `ttl`.
    ///
    /// Returns as soon as the write has been handed off; it must not wait for
    /// the backend to acknowledge the write. An error means the write was not
    /// even enqueued.
    fn set_async(&self, key: String, value: Bytes, ttl: Duration) -> Result<(), SetError>;

    /// Fetch all `keys` in a single batch.
    ///
    /// Keys that are not present are absent from the returned map. Clients
    /// report their own failures (via logs) and return whatever they got,
    /// which may be nothing.
    async fn get_multi(&self, keys: &[String]) -> HashMap<String, Bytes>;
}
