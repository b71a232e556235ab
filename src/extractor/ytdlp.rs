use std::process::Command;

use anyhow::Result;
use tracing::{info, warn};
use url::Url;

use super::{MusicExtractor, Track};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Client that shells out to the `yt-dlp` binary.
pub struct YtDlpExtractor;

impl YtDlpExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Checks that yt-dlp and ffmpeg are reachable on PATH.
    pub async fn verify_dependencies(&self) -> Result<()> {
        let ytdlp = async_process::Command::new("yt-dlp")
            .arg("--version")
            .output()
            .await;

        match ytdlp {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ yt-dlp version: {}", version.trim());
            }
            _ => anyhow::bail!("yt-dlp not found, install with: pip install yt-dlp"),
        }

        let ffmpeg = async_process::Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await;

        match ffmpeg {
            Ok(output) if output.status.success() => {
                info!("✅ ffmpeg available");
            }
            _ => anyhow::bail!("ffmpeg not found, install with: apt install ffmpeg"),
        }

        Ok(())
    }
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MusicExtractor for YtDlpExtractor {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let limit = limit.clamp(1, 50);
        let target = format!("ytsearch{limit}:{query}");

        let output = Command::new("yt-dlp")
            .args([
                "--print",
                "%(id)s|%(title)s|%(uploader)s|%(duration)s|%(thumbnail)s",
                "--default-search",
                "ytsearch",
                "--skip-download",
                "--no-playlist",
                "--flat-playlist",
                "--quiet",
                "--no-warnings",
                "--socket-timeout",
                "30",
                "--retries",
                "3",
                "--geo-bypass",
            ])
            .arg(&target)
            .output()?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp search failed: {}", error.trim());
            anyhow::bail!("yt-dlp search failed: {}", error.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let tracks: Vec<Track> = stdout
            .lines()
            .take(limit)
            .filter_map(parse_track_line)
            .collect();

        info!("🔍 {} results for: {}", tracks.len(), query);
        Ok(tracks)
    }

    fn download_audio(&self, video_url: &str, output_template: &str) -> Result<()> {
        let output = Command::new("yt-dlp")
            .args([
                "--format",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "192K",
                "--output",
                output_template,
                "--no-playlist",
                "--quiet",
                "--no-warnings",
                "--socket-timeout",
                "60",
                "--retries",
                "15",
                "--fragment-retries",
                "15",
                "--concurrent-fragments",
                "4",
                "--no-check-certificates",
                "--geo-bypass",
            ])
            .arg(video_url)
            .output()?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp download failed: {}", error.trim());
            anyhow::bail!("yt-dlp download failed: {}", error.trim());
        }

        Ok(())
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

pub fn is_youtube_url(url: &str) -> bool {
    url.contains("youtube.com") || url.contains("youtu.be") || url.contains("music.youtube.com")
}

/// Extracts the video id from a watch URL (`watch?v=..` or `youtu.be/..`).
pub fn extract_video_id(url: &str) -> Result<String> {
    let parsed = Url::parse(url)?;

    // youtube.com/watch?v=VIDEO_ID
    if let Some(query) = parsed.query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if key == "v" {
                return Ok(value.into_owned());
            }
        }
    }

    // youtu.be/VIDEO_ID
    if parsed.host_str() == Some("youtu.be") {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(video_id) = segments.next() {
                if !video_id.is_empty() {
                    return Ok(video_id.to_string());
                }
            }
        }
    }

    anyhow::bail!("could not extract video id from: {url}")
}

/// One `--print` line is `id|title|uploader|duration|thumbnail`; yt-dlp
/// prints `NA` for fields it could not determine.
fn parse_track_line(line: &str) -> Option<Track> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < 5 {
        warn!("malformed yt-dlp output line: {line}");
        return None;
    }

    let id = field(parts[0])?;
    Some(Track {
        url: watch_url(&id),
        title: field(parts[1]).unwrap_or_else(|| "Unknown".to_string()),
        artist: field(parts[2]).unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
        duration: field(parts[3])
            .and_then(|d| d.parse::<f64>().ok())
            .map(|d| d as u64)
            .unwrap_or(0),
        thumbnail: field(parts[4]).unwrap_or_default(),
        id,
    })
}

fn field(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "NA" {
        None
    } else {
        Some(trimmed.to_string())
    }
}
