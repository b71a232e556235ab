pub mod ytdlp;

pub use ytdlp::YtDlpExtractor;

use serde::{Deserialize, Serialize};

/// Seam to the external extraction tool.
///
/// Both operations block for the duration of the network call and the
/// transcode, so they are always dispatched through the service's
/// blocking-task offload, never called straight from an async context.
#[cfg_attr(test, mockall::automock)]
pub trait MusicExtractor: Send + Sync {
    /// Searches the source and returns up to `limit` tracks.
    fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<Track>>;

    /// Fetches the best available audio for `video_url` and transcodes it
    /// to MP3 under `output_template` (a yt-dlp `%(ext)s` template). The
    /// tool does not report the final filename; post-processing renames
    /// the file, so callers locate it by the unique infix embedded in the
    /// template.
    fn download_audio(&self, video_url: &str, output_template: &str) -> anyhow::Result<()>;
}

/// One search result.
///
/// Immutable once built from extractor output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    /// Uploader, or `"Unknown Artist"` when the source reports none.
    pub artist: String,
    /// Seconds; 0 when the source reports none.
    pub duration: u64,
    pub thumbnail: String,
    pub url: String,
}
