use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{
    create_video_handler, get_video_handler, health_handler, upload_thumbnail_handler,
    upload_video_handler,
};
use crate::models::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/api/videos", post(create_video_handler))
        .route("/api/videos/:video_id", get(get_video_handler))
        .route("/api/videos/:video_id/video", post(upload_video_handler))
        .route("/api/videos/:video_id/thumbnail", post(upload_thumbnail_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
