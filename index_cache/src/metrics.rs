use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

use crate::types::ItemType;

const REQUESTS_METRIC: &str = "store_index_cache_requests_total";
const HITS_METRIC: &str = "store_index_cache_hits_total";
const ITEM_TYPE_LABEL: &str = "item_type";

/// Request/hit counters of a single [`ItemType`].
#[derive(Debug, Clone)]
pub(crate) struct ItemMetrics {
    pub(crate) requests: IntCounter,
    pub(crate) hits: IntCounter,
}

/// Counters of the index cache, registered once per cache instance.
#[derive(Debug, Clone)]
pub(crate) struct CacheMetrics {
    postings: ItemMetrics,
    series: ItemMetrics,
}

impl CacheMetrics {
    pub(crate) fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let requests = IntCounterVec::new(
            Opts::new(REQUESTS_METRIC, "Total number of items requests to the cache."),
            &[ITEM_TYPE_LABEL],
        )?;
        registry.register(Box::new(requests.clone()))?;

        let hits = IntCounterVec::new(
            Opts::new(
                HITS_METRIC,
                "Total number of items requests to the cache that were a hit.",
            ),
            &[ITEM_TYPE_LABEL],
        )?;
        registry.register(Box::new(hits.clone()))?;

        let item = |item_type: ItemType| ItemMetrics {
            requests: requests.with_label_values(&[item_type.as_str()]),
            hits: hits.with_label_values(&[item_type.as_str()]),
        };

        Ok(Self {
            postings: item(ItemType::Postings),
            series: item(ItemType::Series),
        })
    }

    pub(crate) fn item(&self, item_type: ItemType) -> &ItemMetrics {
        match item_type {
            ItemType::Postings => &self.postings,
            ItemType::Series => &self.series,
        }
    }
}
