//! HTTP adapter over [`MusicService`].
//!
//! Thin on purpose: no cache or lock logic lives here. The chat-bot and
//! messaging-webhook surfaces are independent adapters over the same
//! service interface and would sit beside this one.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

use crate::error::ServiceError;
use crate::extractor::{ytdlp, Track};
use crate::service::{sanitize_title, MusicService};
use crate::usage::UsageTracker;

const MAX_QUERY_LEN: usize = 200;
const MAX_SEARCH_RESULTS: usize = 50;
const DEFAULT_SEARCH_RESULTS: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MusicService>,
    pub usage: Arc<UsageTracker>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/search", post(search))
        .route("/download", post(download))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_SEARCH_RESULTS
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub total_results: usize,
    pub results: Vec<Track>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub video_id: String,
    pub title: String,
}

async fn index() -> Html<&'static str> {
    Html(
        "<html>\
         <head><meta charset=\"utf-8\"><title>Music Finder</title></head>\
         <body><h3>Music Finder</h3><p>Service is running.</p></body>\
         </html>",
    )
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "downloads_dir": state.service.downloads_dir().display().to_string(),
    }))
}

async fn search(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = request.query.trim();
    if query.is_empty() || query.len() > MAX_QUERY_LEN {
        return Err(ApiError::invalid(format!(
            "query must be 1..{MAX_QUERY_LEN} characters"
        )));
    }
    if request.limit < 1 || request.limit > MAX_SEARCH_RESULTS {
        return Err(ApiError::invalid(format!(
            "limit must be 1..{MAX_SEARCH_RESULTS}"
        )));
    }

    state.usage.record_search(&addr.ip().to_string());
    let results = state.service.get_search_results(query, request.limit).await?;

    Ok(Json(SearchResponse {
        query: query.to_string(),
        total_results: results.len(),
        results,
        timestamp: Utc::now(),
    }))
}

async fn download(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<DownloadRequest>,
) -> Result<Response, ApiError> {
    let video_id = resolve_video_id(&request.video_id)?;
    if request.title.trim().is_empty() {
        return Err(ApiError::invalid("title must not be empty"));
    }

    state.usage.record_download(&addr.ip().to_string());
    let file = state.service.get_download(&video_id, &request.title).await?;
    debug!("serving artifact {}", file.filename);

    let reader = tokio::fs::File::open(&file.path)
        .await
        .map_err(ServiceError::Io)?;
    let body = Body::from_stream(ReaderStream::new(reader));
    let disposition = format!(
        "attachment; filename=\"{}.mp3\"",
        sanitize_title(&request.title)
    );

    Response::builder()
        .header(header::CONTENT_TYPE, "audio/mpeg")
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(body)
        .map_err(|e| {
            error!("response build failed: {e}");
            ApiError::internal("response build failed")
        })
}

/// Accepts either a bare video id or a full watch URL.
fn resolve_video_id(raw: &str) -> Result<String, ApiError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ApiError::invalid("video_id must not be empty"));
    }
    if ytdlp::is_youtube_url(raw) {
        return ytdlp::extract_video_id(raw).map_err(|e| ApiError::invalid(e.to_string()));
    }
    Ok(raw.to_string())
}

/// Adapter-level error envelope with a FastAPI-style `{"detail": ...}`
/// body, so all three surfaces report failures the same way.
#[derive(Debug)]
pub enum ApiError {
    Invalid(String),
    Internal(String),
    Service(ServiceError),
}

impl ApiError {
    fn invalid(detail: impl Into<String>) -> Self {
        Self::Invalid(detail.into())
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self::Service(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Invalid(detail) => (StatusCode::UNPROCESSABLE_ENTITY, detail),
            ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
            ApiError::Service(err) => {
                let status = match &err {
                    ServiceError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    error!("request failed: {err}");
                }
                (status, err.to_string())
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
