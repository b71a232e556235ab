//! # Cache Module
//!
//! Shared caching layer between the request handlers and the extractor.
//!
//! Two independent maps live here, each behind its own `tokio::sync::Mutex`:
//!
//! - [`SearchCache`]: search results keyed by `(query, limit)`, fresh for
//!   10 minutes
//! - [`DownloadCache`]: finished artifacts keyed by video id, fresh for
//!   24 hours and only served while the file is still on disk
//!
//! The locks guard nothing but the maps themselves. The slow extractor
//! call always runs outside the critical section, so a cache miss and the
//! store that follows it are two separate lock acquisitions. Entries are
//! validated against their TTL on every read and removed only by the
//! retention sweeper.

pub mod download;
pub mod search;

pub use download::DownloadCache;
pub use search::SearchCache;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Timestamped cache entry.
///
/// Immutable once created; an update replaces the whole entry instead of
/// mutating `value` in place.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub(crate) created_at: u64,
    pub(crate) value: V,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V) -> Self {
        Self {
            created_at: current_timestamp(),
            value,
        }
    }

    /// True while the entry is younger than `ttl`. An entry aged exactly
    /// `ttl` is already stale.
    pub fn is_valid(&self, ttl: Duration) -> bool {
        current_timestamp().saturating_sub(self.created_at) < ttl.as_secs()
    }
}

/// Current unix time in seconds.
pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
