use base64::{engine::general_purpose::STANDARD, Engine};
use uuid::Uuid;

use crate::error::ApiError;
use crate::ingest::UploadedFile;
use crate::models::Video;
use crate::store::{get_owned_video, VideoRepository};

pub const MAX_THUMBNAIL_UPLOAD_SIZE: u64 = 10 << 20;

pub fn data_url(content_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", content_type, STANDARD.encode(data))
}

/// Store a thumbnail inline on the record as a base64 data URL.
pub async fn set_thumbnail(
    videos: &dyn VideoRepository,
    user_id: Uuid,
    video_id: Uuid,
    upload: Option<UploadedFile>,
    max_size: u64,
) -> Result<Video, ApiError> {
    let mut video = get_owned_video(videos, user_id, video_id).await?;
    let upload = upload.ok_or_else(|| ApiError::bad_request("Thumbnail file missing"))?;

    if upload.size() > max_size {
        return Err(ApiError::bad_request(
            "Thumbnail file size is larger than max upload size",
        ));
    }

    let content_type = upload
        .content_type
        .as_deref()
        .filter(|ct| ct.starts_with("image/"))
        .ok_or_else(|| ApiError::bad_request("Thumbnail must be an image"))?;

    video.thumbnail_url = Some(data_url(content_type, &upload.data));
    video.touch();
    videos.update_video(&video).await?;

    tracing::info!(video_id = %video_id, size_bytes = upload.size(), "thumbnail updated");
    Ok(video)
}
