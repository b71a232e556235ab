//! # Service Module
//!
//! The core search-and-download service every surface talks to.
//!
//! [`MusicService`] owns the two cache maps, their locks and the extractor
//! handle. It is constructed once at startup and injected into the
//! handlers; there is no module-level state. Extraction is blocking and
//! can run for tens of seconds, so it is always pushed onto tokio's
//! blocking pool via [`offload`] while the caller suspends. No cache lock
//! is ever held across that call.

pub mod retention;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{DownloadCache, SearchCache};
use crate::config::Config;
use crate::error::ServiceError;
use crate::extractor::{ytdlp, MusicExtractor, Track};
use retention::{RetentionHandle, RetentionSweeper};

/// How long cached search results stay fresh.
pub const SEARCH_CACHE_TTL: Duration = Duration::from_secs(600);
/// How long downloaded artifacts are kept and served from cache.
pub const DOWNLOAD_CACHE_TTL: Duration = Duration::from_secs(24 * 3600);
/// Period of the background retention sweep.
pub const RETENTION_SWEEP_PERIOD: Duration = Duration::from_secs(3600);

const MAX_TITLE_LEN: usize = 120;

/// A finished download ready to be served.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub filename: String,
}

pub struct MusicService {
    downloads_dir: PathBuf,
    max_file_size: u64,
    extractor: Arc<dyn MusicExtractor>,
    search_cache: Arc<SearchCache>,
    download_cache: Arc<DownloadCache>,
}

impl MusicService {
    pub fn new(config: &Config, extractor: Arc<dyn MusicExtractor>) -> Self {
        Self {
            downloads_dir: config.downloads_dir.clone(),
            max_file_size: config.max_file_size,
            extractor,
            search_cache: Arc::new(SearchCache::new(SEARCH_CACHE_TTL)),
            download_cache: Arc::new(DownloadCache::new(DOWNLOAD_CACHE_TTL)),
        }
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Cached search.
    ///
    /// The extractor call happens outside both critical sections, so two
    /// concurrent misses for the same key may each reach the extractor;
    /// results are idempotent per key and the last store wins. A failed
    /// call caches nothing.
    pub async fn get_search_results(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Track>, ServiceError> {
        let key = SearchCache::key(query, limit);
        if let Some(results) = self.search_cache.get(&key).await {
            return Ok(results);
        }

        let extractor = self.extractor.clone();
        let owned_query = query.to_string();
        let results = offload(move || {
            extractor
                .search(&owned_query, limit)
                .map_err(ServiceError::Upstream)
        })
        .await?;

        self.search_cache.store(key, results.clone()).await;
        Ok(results)
    }

    /// Cached download.
    ///
    /// A hit refreshes the entry timestamp. On a miss the blocking fetch
    /// runs on the offload pool with a sanitized title and a fresh UUID
    /// infix, then the mp3 artifact is located by that infix, checked
    /// against the size ceiling and recorded in the cache.
    pub async fn get_download(
        &self,
        video_id: &str,
        title: &str,
    ) -> Result<DownloadedFile, ServiceError> {
        if let Some(path) = self.download_cache.touch(video_id).await {
            let filename = file_name(&path);
            return Ok(DownloadedFile { path, filename });
        }

        let request = FetchRequest {
            extractor: self.extractor.clone(),
            downloads_dir: self.downloads_dir.clone(),
            video_id: video_id.to_string(),
            download_id: Uuid::new_v4().to_string(),
            safe_title: sanitize_title(title),
            max_file_size: self.max_file_size,
        };
        debug!("download miss for {video_id}, fetching as {}", request.download_id);
        let file = offload(move || fetch_artifact(request)).await?;

        self.download_cache
            .store(video_id.to_string(), file.path.clone())
            .await;
        info!("⬇️ downloaded {video_id} -> {}", file.filename);
        Ok(file)
    }

    /// Starts the hourly retention sweep. The first pass runs right away;
    /// the returned handle stops the loop cooperatively.
    pub fn start_retention(&self) -> RetentionHandle {
        RetentionSweeper::new(
            self.downloads_dir.clone(),
            self.search_cache.clone(),
            self.download_cache.clone(),
            RETENTION_SWEEP_PERIOD,
        )
        .start()
    }
}

/// Bridges a blocking extractor call into the async request path. The
/// closure runs on tokio's blocking pool; the caller suspends without
/// holding any cache lock, and other requests keep making progress.
async fn offload<T, F>(work: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) => Err(ServiceError::Upstream(anyhow::anyhow!(
            "blocking task join error: {e}"
        ))),
    }
}

struct FetchRequest {
    extractor: Arc<dyn MusicExtractor>,
    downloads_dir: PathBuf,
    video_id: String,
    download_id: String,
    safe_title: String,
    max_file_size: u64,
}

/// Blocking download path: fetch and transcode, find the `.mp3` the
/// post-processor produced by matching the unique infix (the extractor
/// does not report the final filename), then enforce the size ceiling.
/// The ceiling check runs after the full transcode; an oversized artifact
/// is deleted before the error is returned.
fn fetch_artifact(req: FetchRequest) -> Result<DownloadedFile, ServiceError> {
    let template = req
        .downloads_dir
        .join(format!("{}_{}.%(ext)s", req.safe_title, req.download_id));
    let video_url = ytdlp::watch_url(&req.video_id);

    req.extractor
        .download_audio(&video_url, &template.to_string_lossy())
        .map_err(ServiceError::Upstream)?;

    let mut artifact = None;
    for entry in std::fs::read_dir(&req.downloads_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.contains(&req.download_id) && name.to_lowercase().ends_with(".mp3") {
            artifact = Some(entry.path());
            break;
        }
    }
    let path = artifact.ok_or_else(|| ServiceError::ArtifactMissing {
        download_id: req.download_id.clone(),
        dir: req.downloads_dir.clone(),
    })?;

    let size = std::fs::metadata(&path)?.len();
    if size > req.max_file_size {
        std::fs::remove_file(&path)?;
        return Err(ServiceError::FileTooLarge {
            size,
            max: req.max_file_size,
        });
    }

    let filename = file_name(&path);
    Ok(DownloadedFile { path, filename })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Filesystem-safe filename stem: alphanumerics, spaces, hyphens and
/// underscores only, trimmed, bounded length, spaces become underscores.
/// Never empty; a title with nothing usable becomes `"track"`.
pub fn sanitize_title(title: &str) -> String {
    let safe: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let safe: String = safe.trim_end().chars().take(MAX_TITLE_LEN).collect();
    let safe = safe.trim();
    if safe.is_empty() {
        "track".to_string()
    } else {
        safe.replace(' ', "_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{ytdlp::UNKNOWN_ARTIST, MockMusicExtractor};
    use pretty_assertions::assert_eq;

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            title: format!("Song {id}"),
            artist: UNKNOWN_ARTIST.to_string(),
            duration: 0,
            thumbnail: String::new(),
            url: ytdlp::watch_url(id),
        }
    }

    fn service(extractor: MockMusicExtractor, dir: &Path, max_file_size: u64) -> MusicService {
        MusicService {
            downloads_dir: dir.to_path_buf(),
            max_file_size,
            extractor: Arc::new(extractor),
            search_cache: Arc::new(SearchCache::new(SEARCH_CACHE_TTL)),
            download_cache: Arc::new(DownloadCache::new(DOWNLOAD_CACHE_TTL)),
        }
    }

    /// Writes a fake artifact the way yt-dlp's post-processor would:
    /// template with `%(ext)s` replaced by `mp3`.
    fn write_artifact(template: &str, size: usize) {
        let path = template.replace("%(ext)s", "mp3");
        std::fs::write(path, vec![0u8; size]).unwrap();
    }

    #[tokio::test]
    async fn second_identical_search_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut extractor = MockMusicExtractor::new();
        extractor
            .expect_search()
            .times(1)
            .returning(|_, _| Ok(vec![track("a"), track("b")]));

        let service = service(extractor, dir.path(), 1024);
        let first = service.get_search_results("test song", 5).await.unwrap();
        let second = service.get_search_results("test song", 5).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn search_key_ignores_case_and_surrounding_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let mut extractor = MockMusicExtractor::new();
        extractor
            .expect_search()
            .times(1)
            .returning(|_, _| Ok(vec![track("a")]));

        let service = service(extractor, dir.path(), 1024);
        service.get_search_results("Test Song", 5).await.unwrap();
        service.get_search_results("  test song ", 5).await.unwrap();
    }

    #[tokio::test]
    async fn failed_search_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mut seq = mockall::Sequence::new();
        let mut extractor = MockMusicExtractor::new();
        extractor
            .expect_search()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(anyhow::anyhow!("network down")));
        extractor
            .expect_search()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(vec![track("a")]));

        let service = service(extractor, dir.path(), 1024);
        let first = service.get_search_results("test", 5).await;
        assert!(matches!(first, Err(ServiceError::Upstream(_))));

        let second = service.get_search_results("test", 5).await.unwrap();
        assert_eq!(second.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_misses_both_complete_and_populate_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut extractor = MockMusicExtractor::new();
        extractor.expect_search().times(2).returning(|_, _| {
            std::thread::sleep(Duration::from_millis(50));
            Ok(vec![track("a")])
        });

        let service = Arc::new(service(extractor, dir.path(), 1024));
        let (first, second) = tokio::join!(
            service.get_search_results("race", 5),
            service.get_search_results("race", 5),
        );
        assert_eq!(first.unwrap(), second.unwrap());

        // the third call must hit the cache; times(2) would trip otherwise
        let third = service.get_search_results("race", 5).await.unwrap();
        assert_eq!(third.len(), 1);
    }

    #[tokio::test]
    async fn returns_exactly_what_the_extractor_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut extractor = MockMusicExtractor::new();
        extractor.expect_search().times(1).returning(|_, _| {
            Ok((1..=5).map(|i| track(&format!("id{i}"))).collect())
        });

        let service = service(extractor, dir.path(), 1024);
        let results = service.get_search_results("test song", 5).await.unwrap();

        assert_eq!(results.len(), 5);
        for result in &results {
            assert_eq!(result.artist, UNKNOWN_ARTIST);
            assert_eq!(result.duration, 0);
        }
    }

    #[tokio::test]
    async fn download_is_cached_after_the_first_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let mut extractor = MockMusicExtractor::new();
        extractor
            .expect_download_audio()
            .times(1)
            .returning(|_, template| {
                write_artifact(template, 16);
                Ok(())
            });

        let service = service(extractor, dir.path(), 1024);
        let first = service.get_download("vid1", "My Song").await.unwrap();
        assert!(first.filename.starts_with("My_Song_"));
        assert!(first.path.exists());

        let second = service.get_download("vid1", "My Song").await.unwrap();
        assert_eq!(first.path, second.path);
    }

    #[tokio::test]
    async fn redownloads_when_the_file_was_deleted_out_of_band() {
        let dir = tempfile::tempdir().unwrap();
        let mut extractor = MockMusicExtractor::new();
        extractor
            .expect_download_audio()
            .times(2)
            .returning(|_, template| {
                write_artifact(template, 16);
                Ok(())
            });

        let service = service(extractor, dir.path(), 1024);
        let first = service.get_download("vid1", "My Song").await.unwrap();
        std::fs::remove_file(&first.path).unwrap();

        let second = service.get_download("vid1", "My Song").await.unwrap();
        assert!(second.path.exists());
        assert_ne!(first.path, second.path);
    }

    #[tokio::test]
    async fn missing_artifact_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut extractor = MockMusicExtractor::new();
        extractor
            .expect_download_audio()
            .times(1)
            .returning(|_, _| Ok(()));

        let service = service(extractor, dir.path(), 1024);
        let result = service.get_download("vid1", "My Song").await;
        assert!(matches!(result, Err(ServiceError::ArtifactMissing { .. })));
    }

    #[tokio::test]
    async fn oversized_artifact_is_rejected_and_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let mut extractor = MockMusicExtractor::new();
        extractor
            .expect_download_audio()
            .times(1)
            .returning(|_, template| {
                write_artifact(template, 2048);
                Ok(())
            });

        let service = service(extractor, dir.path(), 1024);
        let result = service.get_download("vid1", "My Song").await;
        assert!(matches!(
            result,
            Err(ServiceError::FileTooLarge { size: 2048, max: 1024 })
        ));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn failed_download_leaves_the_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut seq = mockall::Sequence::new();
        let mut extractor = MockMusicExtractor::new();
        extractor
            .expect_download_audio()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(anyhow::anyhow!("no audio stream")));
        extractor
            .expect_download_audio()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, template| {
                write_artifact(template, 16);
                Ok(())
            });

        let service = service(extractor, dir.path(), 1024);
        assert!(service.get_download("vid1", "My Song").await.is_err());
        assert!(service.get_download("vid1", "My Song").await.is_ok());
    }

    #[test]
    fn sanitize_strips_unsafe_characters() {
        assert_eq!(
            sanitize_title("Song: Title / Weird*Chars??"),
            "Song_Title__WeirdChars"
        );
    }

    #[test]
    fn sanitize_never_returns_empty() {
        assert_eq!(sanitize_title(""), "track");
        assert_eq!(sanitize_title("???///***"), "track");
        assert_eq!(sanitize_title("   "), "track");
    }

    #[test]
    fn sanitize_bounds_the_length() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_title(&long).len(), MAX_TITLE_LEN);
    }

    #[test]
    fn sanitize_keeps_hyphens_and_underscores() {
        assert_eq!(sanitize_title("a-b_c 1"), "a-b_c_1");
    }
}
