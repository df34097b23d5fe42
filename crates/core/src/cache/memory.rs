//! In-memory resource cache.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheEntry, ResourceStore};
use crate::Error;

/// Process-local cache backed by a `HashMap` under a tokio `RwLock`.
///
/// When a capacity is set, inserting past it evicts the entries with the
/// oldest `fetched_at`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    max_entries: Option<usize>,
}

impl MemoryStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding at most `max_entries` entries.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self { entries: Arc::default(), max_entries: Some(max_entries) }
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, url: &str) -> Result<Option<CacheEntry>, Error> {
        let entries = self.entries.read().await;
        Ok(entries.get(url).cloned())
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), Error> {
        let mut entries = self.entries.write().await;
        entries.insert(entry.url.clone(), entry);

        if let Some(max) = self.max_entries
            && entries.len() > max
        {
            let mut by_age: Vec<_> = entries.iter().map(|(k, v)| (v.fetched_at, k.clone())).collect();
            by_age.sort();
            let excess = entries.len() - max;
            for (_, url) in by_age.into_iter().take(excess) {
                entries.remove(&url);
            }
            tracing::debug!(evicted = excess, "evicted oldest cache entries");
        }

        Ok(())
    }

    async fn size(&self) -> Result<usize, Error> {
        Ok(self.entries.read().await.len())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.entries.write().await.clear();
        Ok(())
    }
}
