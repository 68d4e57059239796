use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tubely_backend::{
    cleanup,
    config::Config,
    ingest::{probe::FfprobeProber, publish::ObjectStorePublisher, Ingestor},
    models::AppState,
    routes::create_router,
    store::InMemoryVideoRepository,
    system_info,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tubely_backend={},tower_http=debug",
            config.log_level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tokio::fs::create_dir_all(&config.assets_root).await?;

    system_info::log_startup_info(&config);

    let videos = Arc::new(InMemoryVideoRepository::new());
    let publisher = ObjectStorePublisher::s3(
        config.s3_bucket.clone(),
        config.s3_region.clone(),
        config.s3_endpoint.clone(),
    )?;
    let ingestor = Ingestor::new(
        videos.clone(),
        Arc::new(FfprobeProber::new(config.ffprobe_path.clone())),
        Arc::new(publisher),
        config.assets_root.clone(),
    )
    .with_max_upload_size(config.max_video_size);

    let app_state = Arc::new(AppState {
        videos,
        ingestor,
        config: config.clone(),
    });

    let _cleanup = cleanup::start_cleanup_task(Arc::new(config.clone()));

    let app = create_router(app_state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
