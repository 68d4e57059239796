use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::Video;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("video {0} not found")]
    NotFound(Uuid),
}

/// Persistence for video records.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn create_video(&self, video: Video) -> Result<Video, StoreError>;

    async fn get_video(&self, id: Uuid) -> Option<Video>;

    /// Replace the stored record with the same id.
    async fn update_video(&self, video: &Video) -> Result<(), StoreError>;
}

/// Keyed in-memory repository. Records live exactly as long as the
/// repository value, which is owned by the application state.
#[derive(Default)]
pub struct InMemoryVideoRepository {
    videos: RwLock<HashMap<Uuid, Video>>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.videos.read().await.len()
    }
}

#[async_trait]
impl VideoRepository for InMemoryVideoRepository {
    async fn create_video(&self, video: Video) -> Result<Video, StoreError> {
        self.videos.write().await.insert(video.id, video.clone());
        Ok(video)
    }

    async fn get_video(&self, id: Uuid) -> Option<Video> {
        self.videos.read().await.get(&id).cloned()
    }

    async fn update_video(&self, video: &Video) -> Result<(), StoreError> {
        let mut videos = self.videos.write().await;
        match videos.get_mut(&video.id) {
            Some(existing) => {
                *existing = video.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(video.id)),
        }
    }
}

/// Load a record and check that `user_id` owns it.
pub async fn get_owned_video(
    videos: &dyn VideoRepository,
    user_id: Uuid,
    video_id: Uuid,
) -> Result<Video, ApiError> {
    let video = videos
        .get_video(video_id)
        .await
        .ok_or_else(|| ApiError::NotFound("Couldn't find video".to_string()))?;

    if video.user_id != user_id {
        return Err(ApiError::Forbidden("Forbidden".to_string()));
    }

    Ok(video)
}
