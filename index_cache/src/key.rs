//! Encoding of cache items into flat remote cache keys.
//!
//! Keys have the shape
//!
//! ```text
//! P:<block id>:<byte length of label name>:<label name>:<label value>
//! S:<block id>:<series ref>
//! ```
//!
//! The block id is rendered in its fixed-width hyphenated form and the label
//! name is length-prefixed, so a key can be split back into its components
//! unambiguously whatever bytes the label contains. Two distinct
//! `(block, item type, item)` triples therefore never share a key.

use std::{fmt, hash::Hash};

use crate::types::{BlockId, ItemType, Label, SeriesRef};

/// Item-specific part of a [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKeyItem {
    Postings(Label),
    Series(SeriesRef),
}

impl CacheKeyItem {
    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Postings(_) => ItemType::Postings,
            Self::Series(_) => ItemType::Series,
        }
    }
}

/// Structured cache key, rendered into the remote key by [`Display`](fmt::Display).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub block_id: BlockId,
    pub item: CacheKeyItem,
}

impl CacheKey {
    pub fn new(block_id: BlockId, item: CacheKeyItem) -> Self {
        Self { block_id, item }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.item {
            CacheKeyItem::Postings(label) => write!(
                f,
                "P:{}:{}:{}:{}",
                self.block_id,
                label.name.len(),
                label.name,
                label.value
            ),
            CacheKeyItem::Series(series_ref) => write!(f, "S:{}:{}", self.block_id, series_ref),
        }
    }
}

/// An identifier that can be looked up in the index cache.
pub trait CacheItem:
    Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Item type, selecting metrics and key layout.
    const ITEM_TYPE: ItemType;

    /// Structured key of this item within `block_id`.
    fn cache_key(&self, block_id: BlockId) -> CacheKey;

    /// Flat remote key of this item within `block_id`.
    fn encode(&self, block_id: BlockId) -> String {
        self.cache_key(block_id).to_string()
    }
}

impl CacheItem for Label {
    const ITEM_TYPE: ItemType = ItemType::Postings;

    fn cache_key(&self, block_id: BlockId) -> CacheKey {
        CacheKey::new(block_id, CacheKeyItem::Postings(self.clone()))
    }
}

impl CacheItem for SeriesRef {
    const ITEM_TYPE: ItemType = ItemType::Series;

    fn cache_key(&self, block_id: BlockId) -> CacheKey {
        CacheKey::new(block_id, CacheKeyItem::Series(*self))
    }
}
