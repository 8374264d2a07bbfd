//! CLI config for the remote index cache.

use std::{sync::Arc, time::Duration};

use humantime::parse_duration;
use index_cache::{RemoteCacheClient, RemoteIndexCacheParams};
use prometheus::Registry;

/// CLI config for the remote index cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::Parser)]
pub struct IndexCacheConfig {
    /// Time-to-live of postings and series written to the remote index cache.
    ///
    /// The remote backend may evict entries earlier.
    #[clap(
        long = "index-cache-ttl",
        env = "INFLUXDB_IOX_INDEX_CACHE_TTL",
        default_value = "24h",
        value_parser = parse_duration
    )]
    pub ttl: Duration,
}

impl IndexCacheConfig {
    /// Parameters for a [`RemoteIndexCache`](index_cache::RemoteIndexCache) talking to `client`.
    pub fn params(
        self,
        client: Arc<dyn RemoteCacheClient>,
        registry: &Registry,
    ) -> RemoteIndexCacheParams<'_> {
        RemoteIndexCacheParams {
            client,
            registry,
            ttl: self.ttl,
        }
    }
}
