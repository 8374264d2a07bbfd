//! Remote cache for block-scoped index lookups.
//!
//! Index readers look up posting lists by label and encoded series by series
//! reference. Both are scoped to one immutable block and are cached in a
//! memcached-style remote store through [`RemoteIndexCache`], with a reader
//! falling back to the block's own index on any miss.

use std::{collections::HashMap, fmt::Debug, hash::Hash};

use async_trait::async_trait;
use bytes::Bytes;

pub mod client;
pub mod key;
mod metrics;
pub mod mock;
pub mod remote;
pub mod types;

pub use client::{RemoteCacheClient, SetError};
pub use key::{CacheItem, CacheKey, CacheKeyItem};
pub use remote::{DEFAULT_TTL, RemoteIndexCache, RemoteIndexCacheParams};
pub use types::{BlockId, ItemType, Label, SeriesRef};

/// Outcome of a batched fetch.
///
/// Every distinct requested item is either a hit or a miss, and `misses`
/// follows the order of the request. If the remote cache returned nothing at
/// all, `misses` is the request as given, repeats included.
#[derive(Debug, Clone)]
pub struct FetchResult<K> {
    /// Payloads of the items found in the remote cache.
    pub hits: HashMap<K, Bytes>,
    /// Items not found, in request order; the request verbatim if the remote
    /// cache returned nothing.
    pub misses: Vec<K>,
}

impl<K: Eq + Hash> PartialEq for FetchResult<K> {
    fn eq(&self, other: &Self) -> bool {
        self.hits == other.hits && self.misses == other.misses
    }
}

impl<K: Eq + Hash> Eq for FetchResult<K> {}

/// Cache of postings and series for index readers.
#[async_trait]
pub trait IndexCache: Debug + Send + Sync + 'static {
    /// Cache the posting list of `label` in `block_id`.
    ///
    /// Returns immediately; the entry becomes visible eventually, if at all.
    fn store_postings(&self, block_id: BlockId, label: &Label, value: Bytes);

    /// Fetch the posting lists of `labels` in `block_id`.
    async fn fetch_multi_postings(&self, block_id: BlockId, labels: &[Label]) -> FetchResult<Label>;

    /// Cache the series `series_ref` in `block_id`.
    ///
    /// Returns immediately; the entry becomes visible eventually, if at all.
    fn store_series(&self, block_id: BlockId, series_ref: SeriesRef, value: Bytes);

    /// Fetch the series `series_refs` in `block_id`.
    async fn fetch_multi_series(
        &self,
        block_id: BlockId,
        series_refs: &[SeriesRef],
    ) -> FetchResult<SeriesRef>;
}
