use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

mod api;
mod cache;
mod config;
mod error;
mod extractor;
mod service;
mod usage;

use crate::api::AppState;
use crate::config::Config;
use crate::extractor::{MusicExtractor, YtDlpExtractor};
use crate::service::MusicService;
use crate::usage::UsageTracker;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("music_finder=debug".parse()?)
                .add_directive("axum=info".parse()?),
        )
        .init();

    info!("🎵 Starting Music Finder v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("{}", config.summary());

    // yt-dlp calls run on this runtime's blocking pool
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()?;
    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let extractor = YtDlpExtractor::new();

    if std::env::args().any(|arg| arg == "--health-check") {
        extractor.verify_dependencies().await?;
        println!("OK");
        return Ok(());
    }

    extractor.verify_dependencies().await?;

    let extractor: Arc<dyn MusicExtractor> = Arc::new(extractor);
    let service = Arc::new(MusicService::new(&config, extractor));
    let usage = Arc::new(UsageTracker::new());

    let retention = service.start_retention();

    let app = api::router(AppState { service, usage });
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🚀 Listening on http://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    retention.stop().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        error!("failed to listen for ctrl-c");
        return;
    }
    info!("⚠️ Shutdown signal received, closing...");
}
