//! Resource cache
//!
//! Remembers the last successful read per resource identity. Entries never
//! expire; freshness is the caller's business (`invalidate_all` or a
//! per-call bypass).

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identity of a cached read: collection id plus item id, used verbatim
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub collection: String,
    pub item: String,
}

impl CacheKey {
    pub fn new(collection: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            item: item.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection, self.item)
    }
}

type Entry = Arc<dyn Any + Send + Sync>;

/// Process-wide read cache, last write wins
#[derive(Default)]
pub(crate) struct ResourceCache {
    entries: RwLock<HashMap<CacheKey, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResourceCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Look up a value; an entry of another type counts as a miss
    pub(crate) fn get<T>(&self, key: &CacheKey) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entries = self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        match entries.get(key).and_then(|entry| entry.downcast_ref::<T>()) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub(crate) fn put<T>(&self, key: CacheKey, value: T)
    where
        T: Send + Sync + 'static,
    {
        debug!(%key, "ResourceCache::put: called");
        let mut entries = self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key, Arc::new(value));
    }

    pub(crate) fn invalidate_all(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        debug!(entries = entries.len(), "ResourceCache::invalidate_all: called");
        entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub(crate) fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub(crate) fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
