use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced to the request handlers.
///
/// The retention sweeper never returns these; its failures are logged and
/// swallowed since nothing awaits a sweep. A failed extractor call leaves
/// the cache untouched at that key, so the next identical request retries
/// from scratch.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The extraction tool failed (network, parsing, no audio stream).
    /// Not retried here; callers may re-issue the request.
    #[error("upstream extraction failed: {0}")]
    Upstream(anyhow::Error),

    /// Post-processing finished without a locatable output file.
    #[error("no mp3 artifact for download {download_id} in {}", .dir.display())]
    ArtifactMissing { download_id: String, dir: PathBuf },

    /// The transcoded file exceeds the configured ceiling. The oversized
    /// file is already deleted by the time this is returned.
    #[error("file too large: {size} bytes (limit {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
