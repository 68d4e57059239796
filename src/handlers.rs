use crate::{
    auth,
    error::ApiError,
    ingest::UploadedFile,
    models::{AppState, CreateVideoRequest, Video},
    thumbnail,
};
use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::Json,
};
use bytes::BytesMut;
use multer::{Constraints, Multipart, SizeLimit};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Upload the video file for a record and publish it
pub async fn upload_video_handler(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
    request: Request<Body>,
) -> Result<Json<Video>, ApiError> {
    let video_id = parse_video_id(&video_id)?;
    let user_id = auth::authenticate(request.headers(), &state.config.jwt_secret)?;

    info!("[POST /video] uploading video {} for user {}", video_id, user_id);

    let upload = read_file_field(request, "video", state.ingestor.max_upload_size()).await?;

    // Run the pipeline on its own task so a dropped connection can't
    // interrupt it between staging and cleanup.
    let ingestor = state.ingestor.clone();
    let video = tokio::spawn(async move { ingestor.ingest(user_id, video_id, upload).await })
        .await
        .map_err(|e| {
            error!("[POST /video] ingestion task failed: {}", e);
            ApiError::Internal(format!("ingestion task failed: {}", e))
        })??;

    Ok(Json(video))
}

/// Upload a thumbnail, stored inline as a data URL
pub async fn upload_thumbnail_handler(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
    request: Request<Body>,
) -> Result<Json<Video>, ApiError> {
    let video_id = parse_video_id(&video_id)?;
    let user_id = auth::authenticate(request.headers(), &state.config.jwt_secret)?;

    info!("[POST /thumbnail] uploading thumbnail for video {} by user {}", video_id, user_id);

    let max_size = state.config.max_thumbnail_size;
    let upload = read_file_field(request, "thumbnail", max_size).await?;
    let video =
        thumbnail::set_thumbnail(state.videos.as_ref(), user_id, video_id, upload, max_size).await?;

    Ok(Json(video))
}

pub async fn create_video_handler(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(request): Json<CreateVideoRequest>,
) -> Result<(StatusCode, Json<Video>), ApiError> {
    let user_id = auth::authenticate(&headers, &state.config.jwt_secret)?;

    if request.title.trim().is_empty() {
        return Err(ApiError::bad_request("Title is required"));
    }

    let video = state
        .videos
        .create_video(Video::new(user_id, request.title, request.description))
        .await?;

    info!("[POST /videos] created video {} for user {}", video.id, user_id);
    Ok((StatusCode::CREATED, Json(video)))
}

pub async fn get_video_handler(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Video>, ApiError> {
    let video_id = parse_video_id(&video_id)?;
    let user_id = auth::authenticate(&headers, &state.config.jwt_secret)?;
    let video = crate::store::get_owned_video(state.videos.as_ref(), user_id, video_id).await?;
    Ok(Json(video))
}

pub async fn health_handler() -> &'static str {
    "ok"
}

fn parse_video_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request("Invalid video ID"))
}

/// Stream a multipart body and return the first file in `field_name`.
///
/// Reading stops with BadRequest as soon as the field grows past
/// `max_size`, before anything is written to disk.
async fn read_file_field(
    request: Request<Body>,
    field_name: &str,
    max_size: u64,
) -> Result<Option<UploadedFile>, ApiError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing Content-Type header"))?;

    let boundary = multer::parse_boundary(content_type).map_err(|e| {
        error!("Failed to parse boundary: {}", e);
        ApiError::bad_request(format!("Invalid multipart request: {}", e))
    })?;

    let constraints = Constraints::new()
        .size_limit(SizeLimit::new().per_field(max_size.saturating_add(1)));
    let mut multipart =
        Multipart::with_constraints(request.into_body().into_data_stream(), boundary, constraints);

    let mut upload = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if upload.is_some() || field.name() != Some(field_name) {
            // Skip non-file fields
            while field.chunk().await.map_err(multipart_error)?.is_some() {}
            continue;
        }

        let content_type = field.content_type().map(|m| m.to_string());
        let mut data = BytesMut::new();

        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            data.extend_from_slice(&chunk);

            // Check file size as we read
            if data.len() as u64 > max_size {
                let file_size_mb = data.len() as f64 / 1024.0 / 1024.0;
                error!(
                    "File too large: {:.2}MB (max: {}MB)",
                    file_size_mb,
                    max_size / 1024 / 1024
                );
                return Err(ApiError::bad_request(format!(
                    "File too large. Maximum file size is {} bytes.",
                    max_size
                )));
            }
        }

        upload = Some(UploadedFile {
            content_type,
            data: data.freeze(),
        });
    }

    Ok(upload)
}

fn multipart_error(e: multer::Error) -> ApiError {
    error!("Multipart parsing error: {}", e);
    match e {
        multer::Error::FieldSizeExceeded { .. } | multer::Error::StreamSizeExceeded { .. } => {
            ApiError::bad_request("File too large")
        }
        other => ApiError::bad_request(format!("Error parsing multipart request: {}", other)),
    }
}
