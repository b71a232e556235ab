use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use super::CacheEntry;
use crate::extractor::Track;

/// Time-bounded cache for search queries.
///
/// Misses are not de-duplicated while in flight: two concurrent requests
/// for the same uncached key may both reach the extractor. Results for a
/// given key are idempotent, so the second store simply wins.
#[derive(Debug)]
pub struct SearchCache {
    entries: Mutex<HashMap<String, CacheEntry<Vec<Track>>>>,
    ttl: Duration,
}

impl SearchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Composite cache key: normalized query plus result limit. The query
    /// itself is passed to the extractor unmodified.
    pub fn key(query: &str, limit: usize) -> String {
        format!("{}|{}", query.trim().to_lowercase(), limit)
    }

    /// Returns the cached results when present and still fresh. Stale
    /// entries stay in the map; the sweeper removes them.
    pub async fn get(&self, key: &str) -> Option<Vec<Track>> {
        let entries = self.entries.lock().await;
        let entry = entries.get(key)?;
        if entry.is_valid(self.ttl) {
            debug!("search cache hit: {key}");
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub async fn store(&self, key: String, results: Vec<Track>) {
        let mut entries = self.entries.lock().await;
        entries.insert(key, CacheEntry::new(results));
    }

    /// Drops expired entries and returns how many were removed. Called
    /// from the retention sweeper, never from the request path.
    pub async fn prune_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid(self.ttl));
        before - entries.len()
    }

    #[allow(dead_code)]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
