use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use super::CacheEntry;

/// Time-bounded cache for finished downloads, keyed by video id.
///
/// A hit requires both a fresh timestamp and the artifact still present on
/// disk. The two checks are independent: a fresh map entry pointing at a
/// file deleted out-of-band is never served.
#[derive(Debug)]
pub struct DownloadCache {
    entries: Mutex<HashMap<String, CacheEntry<PathBuf>>>,
    ttl: Duration,
}

impl DownloadCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached path when the entry is fresh and the file still
    /// exists, refreshing the entry timestamp on the way out. Anything
    /// else is a miss; stale entries are left for the sweeper.
    pub async fn touch(&self, video_id: &str) -> Option<PathBuf> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get(video_id)?;
        if entry.is_valid(self.ttl) && entry.value.exists() {
            let path = entry.value.clone();
            entries.insert(video_id.to_string(), CacheEntry::new(path.clone()));
            debug!("download cache hit: {video_id}");
            Some(path)
        } else {
            None
        }
    }

    pub async fn store(&self, video_id: String, path: PathBuf) {
        let mut entries = self.entries.lock().await;
        entries.insert(video_id, CacheEntry::new(path));
    }

    /// Copies out all entries so the sweeper can do its filesystem checks
    /// without holding the lock for the whole pass.
    pub async fn snapshot(&self) -> Vec<(String, CacheEntry<PathBuf>)> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }

    pub async fn remove(&self, video_id: &str) {
        let mut entries = self.entries.lock().await;
        entries.remove(video_id);
    }

    #[cfg(test)]
    pub(crate) async fn insert_raw(&self, video_id: &str, created_at: u64, path: PathBuf) {
        let mut entries = self.entries.lock().await;
        entries.insert(video_id.to_string(), CacheEntry { created_at, value: path });
    }

    #[cfg(test)]
    pub(crate) async fn contains(&self, video_id: &str) -> bool {
        self.entries.lock().await.contains_key(video_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::current_timestamp;

    const DAY: Duration = Duration::from_secs(86_400);

    #[tokio::test]
    async fn serves_fresh_entry_with_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"audio").unwrap();

        let cache = DownloadCache::new(DAY);
        cache.store("vid1".to_string(), path.clone()).await;

        assert_eq!(cache.touch("vid1").await, Some(path));
    }

    #[tokio::test]
    async fn misses_when_file_was_deleted_out_of_band() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"audio").unwrap();

        let cache = DownloadCache::new(DAY);
        cache.store("vid1".to_string(), path.clone()).await;
        std::fs::remove_file(&path).unwrap();

        assert_eq!(cache.touch("vid1").await, None);
        // the stale entry stays until the sweeper reconciles it
        assert!(cache.contains("vid1").await);
    }

    #[tokio::test]
    async fn misses_when_timestamp_expired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"audio").unwrap();

        let cache = DownloadCache::new(DAY);
        cache
            .insert_raw("vid1", current_timestamp() - DAY.as_secs() - 1, path)
            .await;

        assert_eq!(cache.touch("vid1").await, None);
    }

    #[tokio::test]
    async fn hit_refreshes_the_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"audio").unwrap();

        let cache = DownloadCache::new(DAY);
        let old = current_timestamp() - DAY.as_secs() + 60;
        cache.insert_raw("vid1", old, path).await;

        assert!(cache.touch("vid1").await.is_some());
        let (_, entry) = cache.snapshot().await.into_iter().next().unwrap();
        assert!(entry.created_at > old);
    }
}
