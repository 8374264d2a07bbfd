//! Index cache backed by a remote, memcached-style key-value store.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use observability_deps::tracing::{debug, error, info};
use prometheus::Registry;
use snafu::{ResultExt, Snafu};

use crate::{
    client::RemoteCacheClient,
    key::CacheItem,
    metrics::CacheMetrics,
    types::{BlockId, Label, SeriesRef},
    FetchResult, IndexCache,
};

/// Time-to-live of every entry written by [`RemoteIndexCache`] unless configured otherwise.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors constructing a [`RemoteIndexCache`].
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("cannot register index cache metrics: {source}"))]
    RegisterMetrics { source: prometheus::Error },
}

/// Parameters for [`RemoteIndexCache`].
#[derive(Debug)]
pub struct RemoteIndexCacheParams<'a> {
    /// Remote cache client all reads and writes go through.
    pub client: Arc<dyn RemoteCacheClient>,

    /// Registry the request/hit counters are registered with.
    pub registry: &'a Registry,

    /// Time-to-live of written entries.
    pub ttl: Duration,
}

impl RemoteIndexCacheParams<'_> {
    /// Build cache from parameters.
    ///
    /// This does not contact the remote backend.
    pub fn build(self) -> Result<RemoteIndexCache, Error> {
        let Self {
            client,
            registry,
            ttl,
        } = self;

        let metrics = CacheMetrics::new(registry).context(RegisterMetricsSnafu)?;

        info!(ttl_secs = ttl.as_secs(), "created index cache");

        Ok(RemoteIndexCache {
            client,
            metrics,
            ttl,
        })
    }
}

/// Postings and series cache in front of a [`RemoteCacheClient`].
///
/// Reads are batched into a single `get_multi` per call. Writes are
/// fire-and-forget: they are handed to the client and failures are only
/// logged.
///
/// The cache cannot tell a miss from an unreachable backend. When the batch
/// read returns nothing at all, every requested item is reported as a miss,
/// so an all-miss result may just mean the cache is unavailable.
#[derive(Debug)]
pub struct RemoteIndexCache {
    client: Arc<dyn RemoteCacheClient>,
    metrics: CacheMetrics,
    ttl: Duration,
}

impl RemoteIndexCache {
    /// Create a cache using [`DEFAULT_TTL`].
    pub fn new(client: Arc<dyn RemoteCacheClient>, registry: &Registry) -> Result<Self, Error> {
        RemoteIndexCacheParams {
            client,
            registry,
            ttl: DEFAULT_TTL,
        }
        .build()
    }

    /// Time-to-live of written entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn store<K: CacheItem>(&self, block_id: BlockId, item: &K, value: Bytes) {
        let key = item.encode(block_id);

        if let Err(e) = self.client.set_async(key, value, self.ttl) {
            error!(
                error = %e,
                item_type = K::ITEM_TYPE.as_str(),
                %block_id,
                "failed to cache item in remote index cache",
            );
        }
    }

    async fn fetch_multi<K: CacheItem>(&self, block_id: BlockId, items: &[K]) -> FetchResult<K> {
        let item_type = K::ITEM_TYPE;
        let metrics = self.metrics.item(item_type);

        // Build the keys while remembering the key of every input item, so the
        // response can be mapped back after `get_multi`. Repeated items share one
        // map entry and therefore one slot in the batch.
        let mut keys = Vec::with_capacity(items.len());
        let mut keys_mapping: HashMap<&K, String> = HashMap::with_capacity(items.len());
        for item in items {
            if !keys_mapping.contains_key(item) {
                let key = item.encode(block_id);
                keys.push(key.clone());
                keys_mapping.insert(item, key);
            }
        }

        metrics.requests.inc_by(items.len() as u64);
        let mut results = self.client.get_multi(&keys).await;
        if results.is_empty() {
            debug!(
                item_type = item_type.as_str(),
                %block_id,
                requested = items.len(),
                "remote index cache returned no results",
            );
            return FetchResult {
                hits: HashMap::new(),
                misses: items.to_vec(),
            };
        }

        // Walk the input once so misses keep the input order.
        let mut hits = HashMap::with_capacity(results.len());
        let mut misses = Vec::new();
        let mut seen = HashSet::with_capacity(keys_mapping.len());
        for item in items {
            if !seen.insert(item) {
                continue;
            }

            let Some(key) = keys_mapping.get(item) else {
                error!(
                    item_type = item_type.as_str(),
                    item = %item,
                    "keys mapping inconsistency found in remote index cache",
                );
                continue;
            };

            match results.remove(key) {
                Some(value) => {
                    hits.insert(item.clone(), value);
                }
                None => misses.push(item.clone()),
            }
        }

        metrics.hits.inc_by(hits.len() as u64);
        debug!(
            item_type = item_type.as_str(),
            %block_id,
            requested = items.len(),
            hits = hits.len(),
            misses = misses.len(),
            "remote index cache fetch",
        );

        FetchResult { hits, misses }
    }
}

#[async_trait]
impl IndexCache for RemoteIndexCache {
    fn store_postings(&self, block_id: BlockId, label: &Label, value: Bytes) {
        self.store(block_id, label, value)
    }

    async fn fetch_multi_postings(
        &self,
        block_id: BlockId,
        labels: &[Label],
    ) -> FetchResult<Label> {
        self.fetch_multi(block_id, labels).await
    }

    fn store_series(&self, block_id: BlockId, series_ref: SeriesRef, value: Bytes) {
        self.store(block_id, &series_ref, value)
    }

    async fn fetch_multi_series(
        &self,
        block_id: BlockId,
        series_refs: &[SeriesRef],
    ) -> FetchResult<SeriesRef> {
        self.fetch_multi(block_id, series_refs).await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use observability_deps::tracing::Level;
    use test_helpers::{prometheus::gather, tracing::TracingCapture};

    use super::*;
    use crate::mock::MockRemoteCache;

    fn capture() -> TracingCapture {
        TracingCapture::builder()
            .filter_target("index_cache::remote")
            .build()
    }

    fn counter(registry: &Registry, metric: &str, item_type: &str) -> f64 {
        gather(registry)
            .unwrap()
            .metric(metric)
            .labels([("item_type", item_type)])
            .unwrap_counter()
    }

    fn requests(registry: &Registry, item_type: &str) -> f64 {
        counter(registry, "store_index_cache_requests_total", item_type)
    }

    fn hits(registry: &Registry, item_type: &str) -> f64 {
        counter(registry, "store_index_cache_hits_total", item_type)
    }

    fn label(name: &str, value: &str) -> Label {
        Label::new(name, value)
    }

    #[tokio::test]
    async fn test_fetch_postings_dedups_and_partitions() {
        let block_id = BlockId::new();
        let a = label("job", "a");
        let b = label("job", "b");
        let client = MockRemoteCache::new().with_entry(a.encode(block_id), "X");
        let registry = Registry::new();
        let cache = RemoteIndexCache::new(Arc::clone(&client) as _, &registry).unwrap();

        let res = cache
            .fetch_multi_postings(block_id, &[a.clone(), b.clone(), a.clone()])
            .await;

        assert_eq!(res.hits, HashMap::from([(a.clone(), Bytes::from_static(b"X"))]));
        assert_eq!(res.misses, vec![b.clone()]);

        // each distinct key is requested once
        assert_eq!(
            client.get_multi_calls(),
            vec![vec![a.encode(block_id), b.encode(block_id)]]
        );

        assert_eq!(requests(&registry, "postings"), 3.0);
        assert_eq!(hits(&registry, "postings"), 1.0);
        assert_eq!(requests(&registry, "series"), 0.0);
    }

    #[tokio::test]
    async fn test_fetch_duplicate_misses_reported_once() {
        let block_id = BlockId::new();
        let a = label("job", "a");
        let b = label("job", "b");
        let c = label("job", "c");
        let client = MockRemoteCache::new().with_entry(c.encode(block_id), "C");
        let cache = RemoteIndexCache::new(client as _, &Registry::new()).unwrap();

        let res = cache
            .fetch_multi_postings(block_id, &[b.clone(), a.clone(), b.clone(), c.clone()])
            .await;

        assert_eq!(res.misses, vec![b, a]);
        assert_eq!(res.hits.len(), 1);
        assert_eq!(res.hits[&c], Bytes::from_static(b"C"));
    }

    #[tokio::test]
    async fn test_fetch_misses_keep_input_order() {
        let block_id = BlockId::new();
        let stored = SeriesRef::new(1_000);
        let client = MockRemoteCache::new().with_entry(stored.encode(block_id), "s");
        let registry = Registry::new();
        let cache = RemoteIndexCache::new(client as _, &registry).unwrap();

        let input: Vec<_> = [9, 3, 7, 1, 5].into_iter().map(SeriesRef::new).collect();
        let res = cache.fetch_multi_series(block_id, &input).await;

        assert!(res.hits.is_empty());
        assert_eq!(res.misses, input);
        assert_eq!(requests(&registry, "series"), 5.0);
        assert_eq!(hits(&registry, "series"), 0.0);
    }

    #[tokio::test]
    async fn test_fetch_empty_result_is_all_miss() {
        let block_id = BlockId::new();
        let a = label("job", "a");
        let client = MockRemoteCache::new()
            .with_entry(a.encode(block_id), "X")
            .unavailable();
        let registry = Registry::new();
        let cache = RemoteIndexCache::new(Arc::clone(&client) as _, &registry).unwrap();

        let input = vec![a.clone(), label("job", "b"), a.clone()];
        let res = cache.fetch_multi_postings(block_id, &input).await;

        assert!(res.hits.is_empty());
        assert_eq!(res.misses, input);
        assert_eq!(client.get_multi_calls().len(), 1);
        assert_eq!(requests(&registry, "postings"), 3.0);
        assert_eq!(hits(&registry, "postings"), 0.0);
    }

    #[tokio::test]
    async fn test_fetch_empty_input() {
        let client = MockRemoteCache::new();
        let registry = Registry::new();
        let cache = RemoteIndexCache::new(client as _, &registry).unwrap();

        let res = cache.fetch_multi_series(BlockId::new(), &[]).await;

        assert!(res.hits.is_empty());
        assert!(res.misses.is_empty());
        assert_eq!(requests(&registry, "series"), 0.0);
    }

    #[tokio::test]
    async fn test_fetch_is_scoped_to_block() {
        let block_a = BlockId::new();
        let block_b = BlockId::new();
        let series = SeriesRef::new(42);
        let other = SeriesRef::new(43);
        let client = MockRemoteCache::new()
            .with_entry(series.encode(block_a), "a")
            .with_entry(other.encode(block_b), "b");
        let cache = RemoteIndexCache::new(client as _, &Registry::new()).unwrap();

        let res = cache.fetch_multi_series(block_b, &[series, other]).await;

        assert_eq!(res.hits, HashMap::from([(other, Bytes::from_static(b"b"))]));
        assert_eq!(res.misses, vec![series]);
    }

    #[tokio::test]
    async fn test_store_then_fetch() {
        let block_id = BlockId::new();
        let a = label("__name__", "up");
        let client = MockRemoteCache::new();
        let registry = Registry::new();
        let cache = RemoteIndexCache::new(Arc::clone(&client) as _, &registry).unwrap();

        cache.store_postings(block_id, &a, Bytes::from_static(b"postings"));
        cache.store_series(block_id, SeriesRef::new(7), Bytes::from_static(b"series"));

        let sets = client.sets();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].key, a.encode(block_id));
        assert_eq!(sets[0].ttl, DEFAULT_TTL);
        assert_eq!(sets[1].key, SeriesRef::new(7).encode(block_id));
        assert_eq!(
            client.get(&SeriesRef::new(7).encode(block_id)),
            Some(Bytes::from_static(b"series"))
        );

        let postings = cache.fetch_multi_postings(block_id, &[a.clone()]).await;
        assert_eq!(postings.hits[&a], Bytes::from_static(b"postings"));

        let series = cache
            .fetch_multi_series(block_id, &[SeriesRef::new(7), SeriesRef::new(8)])
            .await;
        assert_eq!(series.hits[&SeriesRef::new(7)], Bytes::from_static(b"series"));
        assert_eq!(series.misses, vec![SeriesRef::new(8)]);
        assert_eq!(hits(&registry, "series"), 1.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fetches_count_every_request() {
        const TASKS: usize = 50;

        let block_id = BlockId::new();
        let cached = SeriesRef::new(1);
        let absent = SeriesRef::new(2);
        let client = MockRemoteCache::new().with_entry(cached.encode(block_id), "one");
        let registry = Registry::new();
        let cache = Arc::new(RemoteIndexCache::new(client as _, &registry).unwrap());

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..TASKS {
            let cache = Arc::clone(&cache);
            tasks.spawn(async move {
                cache
                    .fetch_multi_series(block_id, &[cached, cached, absent])
                    .await
            });
        }

        while let Some(res) = tasks.join_next().await {
            let res = res.unwrap();
            assert_eq!(res.hits, HashMap::from([(cached, Bytes::from_static(b"one"))]));
            assert_eq!(res.misses, vec![absent]);
        }

        assert_eq!(requests(&registry, "series"), (TASKS * 3) as f64);
        assert_eq!(hits(&registry, "series"), TASKS as f64);
        assert_eq!(requests(&registry, "postings"), 0.0);
    }

    #[tokio::test]
    async fn test_store_failure_is_logged_not_returned() {
        let registry = Registry::new();
        let client = MockRemoteCache::new().fail_sets();
        let cache = RemoteIndexCache::new(Arc::clone(&client) as _, &registry).unwrap();
        let capture = capture();

        cache.store_series(BlockId::new(), SeriesRef::new(42), Bytes::from_static(b"payload"));

        assert!(client.sets().is_empty());

        let errors = capture.lines_at_level(Level::ERROR);
        assert_eq!(errors.len(), 1, "{capture}");
        assert_eq!(
            errors[0]["message"].to_string(),
            "failed to cache item in remote index cache"
        );
        assert_eq!(errors[0]["item_type"].to_string(), "series");

        assert_eq!(requests(&registry, "series"), 0.0);
        assert_eq!(hits(&registry, "series"), 0.0);
    }

    #[tokio::test]
    async fn test_custom_ttl() {
        let client = MockRemoteCache::new();
        let cache = RemoteIndexCacheParams {
            client: Arc::clone(&client) as _,
            registry: &Registry::new(),
            ttl: Duration::from_secs(60),
        }
        .build()
        .unwrap();
        assert_eq!(cache.ttl(), Duration::from_secs(60));

        cache.store_postings(BlockId::new(), &label("a", "b"), Bytes::new());
        assert_eq!(client.sets()[0].ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_construction_logs() {
        let capture = capture();

        RemoteIndexCache::new(MockRemoteCache::new() as _, &Registry::new()).unwrap();

        let lines = capture.lines_as_maps();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["message"].to_string(), "created index cache");
    }

    #[test]
    fn test_register_twice() {
        let registry = Registry::new();
        RemoteIndexCache::new(MockRemoteCache::new() as _, &registry).unwrap();

        let err = RemoteIndexCache::new(MockRemoteCache::new() as _, &registry).unwrap_err();
        assert_matches!(err, Error::RegisterMetrics { .. });
    }
}
