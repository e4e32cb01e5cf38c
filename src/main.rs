use dotenvy::dotenv;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vidstream::app;
use vidstream::config::settings::AppConfig;
use vidstream::infrastructure::db::pool::connect_to_db;
use vidstream::infrastructure::storage::local::LocalStorage;
use vidstream::modules::video::repository::{PgOwnerDirectory, PgVideoCatalog};
use vidstream::modules::video::service::VideoService;
use vidstream::state::AppState;
use vidstream::workers::engine::FfmpegEngine;
use vidstream::workers::transcoder::TranscodeRunner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting server...");

    let config = AppConfig::new()?;
    let db = connect_to_db(&config.database_url).await?;

    let storage = LocalStorage::new(
        config.upload_root.clone(),
        config.output_root.clone(),
        config.max_upload_bytes,
    );
    let runner = TranscodeRunner::spawn(
        Arc::new(FfmpegEngine::new(config.ffmpeg_path.clone())),
        config.transcode_workers,
        config.transcode_timeout(),
    )
    .with_queue_timeout(config.transcode_queue_timeout());
    let videos = VideoService::new(
        storage,
        runner.clone(),
        Arc::new(PgVideoCatalog::new(db.clone())),
        Arc::new(PgOwnerDirectory::new(db)),
        config.transcode_options(),
    );

    let addr = format!("0.0.0.0:{}", config.server_port);
    let app = app::create_app(AppState::new(config, videos));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runner.shutdown();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
