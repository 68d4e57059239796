//! Video ingestion: stage, probe, classify, publish, record, clean up.

pub mod classify;
pub mod probe;
pub mod publish;
pub mod stage;

use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::Video;
use crate::store::{get_owned_video, VideoRepository};

use classify::classify;
use probe::AspectProbe;
use publish::ObjectPublisher;
use stage::{stage_upload, StagedFile};

pub const ALLOWED_VIDEO_TYPES: &[&str] = &["video/mp4"];

pub const MAX_VIDEO_UPLOAD_SIZE: u64 = 1 << 30;

/// A single file pulled out of a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Validating,
    Staged,
    Probed,
    Classified,
    Published,
    Recorded,
    Cleaned,
    Aborted,
}

/// Sequences one upload through the pipeline. Cheap to clone; every
/// collaborator sits behind an `Arc`.
#[derive(Clone)]
pub struct Ingestor {
    videos: Arc<dyn VideoRepository>,
    prober: Arc<dyn AspectProbe>,
    publisher: Arc<dyn ObjectPublisher>,
    assets_root: PathBuf,
    max_upload_size: u64,
}

impl Ingestor {
    pub fn new(
        videos: Arc<dyn VideoRepository>,
        prober: Arc<dyn AspectProbe>,
        publisher: Arc<dyn ObjectPublisher>,
        assets_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            videos,
            prober,
            publisher,
            assets_root: assets_root.into(),
            max_upload_size: MAX_VIDEO_UPLOAD_SIZE,
        }
    }

    pub fn with_max_upload_size(mut self, max_upload_size: u64) -> Self {
        self.max_upload_size = max_upload_size;
        self
    }

    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    /// Ingest `upload` as the video for `video_id`, on behalf of `user_id`.
    ///
    /// Nothing touches the filesystem until ownership and the upload itself
    /// have been validated. Once a file is staged it is removed again no
    /// matter how the rest of the pipeline ends.
    pub async fn ingest(
        &self,
        user_id: Uuid,
        video_id: Uuid,
        upload: Option<UploadedFile>,
    ) -> Result<Video, ApiError> {
        let start = Instant::now();
        let mut state = IngestState::Validating;
        let mut video = get_owned_video(self.videos.as_ref(), user_id, video_id).await?;
        let upload = upload.ok_or_else(|| ApiError::bad_request("video file missing"))?;
        let content_type = self.validate(&upload)?;

        let staged = stage_upload(&self.assets_root, content_type, &upload.data).await?;
        // The request body is no longer needed once it is on disk.
        drop(upload);
        advance(video_id, &mut state, IngestState::Staged);
        debug!(video_id = %video_id, file = staged.file_name(), size_bytes = staged.size(), "upload staged");

        let outcome = self.process(&staged, &mut video, &mut state).await;

        let file_name = staged.file_name().to_string();
        match &outcome {
            Ok(_) => info!(
                video_id = %video_id,
                file = %file_name,
                elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                "video ingested"
            ),
            Err(e) => {
                warn!(video_id = %video_id, reached = ?state, error = %e, "ingestion aborted");
                state = IngestState::Aborted;
            }
        }

        // Cleanup failure is logged only; it never undoes a recorded update.
        match staged.remove().await {
            Ok(()) if state == IngestState::Recorded => {
                advance(video_id, &mut state, IngestState::Cleaned)
            }
            Ok(()) => debug!(video_id = %video_id, file = %file_name, "staged file removed after abort"),
            Err(e) => {
                error!(video_id = %video_id, file = %file_name, error = %e, "failed to remove staged file")
            }
        }

        outcome
    }

    fn validate<'a>(&self, upload: &'a UploadedFile) -> Result<&'a str, ApiError> {
        let content_type = upload
            .content_type
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
            .ok_or_else(|| ApiError::bad_request("Missing content type for video"))?;

        if !ALLOWED_VIDEO_TYPES.contains(&content_type) {
            return Err(ApiError::bad_request("Mimetype not allowed"));
        }

        if upload.size() > self.max_upload_size {
            return Err(ApiError::bad_request(format!(
                "Video file exceeds the maximum upload size of {} bytes",
                self.max_upload_size
            )));
        }

        Ok(content_type)
    }

    async fn process(
        &self,
        staged: &StagedFile,
        video: &mut Video,
        state: &mut IngestState,
    ) -> Result<Video, ApiError> {
        let dimensions = self.prober.probe(staged.path()).await?;
        advance(video.id, state, IngestState::Probed);

        let class = classify(dimensions.ratio());
        advance(video.id, state, IngestState::Classified);
        debug!(
            video_id = %video.id,
            width = dimensions.width,
            height = dimensions.height,
            class = %class,
            "classified video"
        );

        let object = self.publisher.publish(staged, class).await?;
        advance(video.id, state, IngestState::Published);

        video.video_url = Some(object.url());
        video.touch();
        self.videos.update_video(video).await?;
        advance(video.id, state, IngestState::Recorded);

        Ok(video.clone())
    }
}

fn advance(video_id: Uuid, state: &mut IngestState, next: IngestState) {
    debug!(video_id = %video_id, from = ?state, to = ?next, "ingestion state");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::classify::AspectClass;
    use crate::ingest::probe::{Dimensions, ProbeError};
    use crate::ingest::publish::{PublishError, RemoteObject};
    use crate::store::InMemoryVideoRepository;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    struct FixedProbe(Result<Dimensions, ()>);

    #[async_trait]
    impl AspectProbe for FixedProbe {
        async fn probe(&self, path: &Path) -> Result<Dimensions, ProbeError> {
            assert!(path.exists(), "probe must see the staged file");
            self.0.map_err(|_| ProbeError::NoVideoStream)
        }
    }

    /// Swaps the staged file for a non-empty directory so it can't be removed.
    struct SwapForDirectory;

    #[async_trait]
    impl AspectProbe for SwapForDirectory {
        async fn probe(&self, path: &Path) -> Result<Dimensions, ProbeError> {
            std::fs::remove_file(path)?;
            std::fs::create_dir(path)?;
            std::fs::write(path.join("frame"), b"x")?;
            Ok(Dimensions { width: 1920, height: 1080 })
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        keys: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ObjectPublisher for RecordingPublisher {
        async fn publish(
            &self,
            staged: &StagedFile,
            class: AspectClass,
        ) -> Result<RemoteObject, PublishError> {
            if self.fail {
                return Err(PublishError::Config("store unavailable".into()));
            }
            let key = publish::object_key(class, staged.file_name());
            self.keys.lock().unwrap().push(key.clone());
            Ok(RemoteObject {
                bucket: "bucket".into(),
                region: "us-east-1".into(),
                key,
                endpoint: None,
            })
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        repo: Arc<InMemoryVideoRepository>,
        publisher: Arc<RecordingPublisher>,
        ingestor: Ingestor,
        owner: Uuid,
        video_id: Uuid,
    }

    async fn harness(probe: Result<Dimensions, ()>, publisher: RecordingPublisher) -> Harness {
        harness_with(Arc::new(FixedProbe(probe)), publisher).await
    }

    async fn harness_with(prober: Arc<dyn AspectProbe>, publisher: RecordingPublisher) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(InMemoryVideoRepository::new());
        let owner = Uuid::new_v4();
        let video = repo.create_video(Video::new(owner, "t", "")).await.unwrap();
        let publisher = Arc::new(publisher);
        let ingestor = Ingestor::new(repo.clone(), prober, publisher.clone(), dir.path())
            .with_max_upload_size(64);
        Harness {
            dir,
            repo,
            publisher,
            ingestor,
            owner,
            video_id: video.id,
        }
    }

    fn staged_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    const HD: Result<Dimensions, ()> = Ok(Dimensions { width: 1920, height: 1080 });

    #[tokio::test]
    async fn successful_ingestion_records_url_and_cleans_up() {
        let h = harness(HD, RecordingPublisher::default()).await;
        let video = h
            .ingestor
            .ingest(h.owner, h.video_id, Some(UploadedFile::new("video/mp4", "bytes")))
            .await
            .unwrap();

        let keys = h.publisher.keys.lock().unwrap().clone();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("landscape/"));
        assert_eq!(
            video.video_url.as_deref(),
            Some(format!("https://bucket.s3.us-east-1.amazonaws.com/{}", keys[0]).as_str())
        );
        assert_eq!(h.repo.get_video(h.video_id).await.unwrap(), video);
        assert_eq!(staged_count(h.dir.path()), 0);
    }

    #[tokio::test]
    async fn rejects_disallowed_mime_before_staging() {
        let h = harness(HD, RecordingPublisher::default()).await;
        let err = h
            .ingestor
            .ingest(h.owner, h.video_id, Some(UploadedFile::new("video/quicktime", "x")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(staged_count(h.dir.path()), 0);
    }

    #[tokio::test]
    async fn rejects_oversize_before_staging() {
        let h = harness(HD, RecordingPublisher::default()).await;
        let err = h
            .ingestor
            .ingest(h.owner, h.video_id, Some(UploadedFile::new("video/mp4", vec![0u8; 65])))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(staged_count(h.dir.path()), 0);
    }

    #[tokio::test]
    async fn missing_file_is_bad_request() {
        let h = harness(HD, RecordingPublisher::default()).await;
        let err = h.ingestor.ingest(h.owner, h.video_id, None).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn non_owner_is_forbidden_and_record_untouched() {
        let h = harness(HD, RecordingPublisher::default()).await;
        let before = h.repo.get_video(h.video_id).await.unwrap();
        let err = h
            .ingestor
            .ingest(Uuid::new_v4(), h.video_id, Some(UploadedFile::new("video/mp4", "x")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert_eq!(h.repo.get_video(h.video_id).await.unwrap(), before);
        assert!(h.publisher.keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_record_is_not_found() {
        let h = harness(HD, RecordingPublisher::default()).await;
        let err = h
            .ingestor
            .ingest(h.owner, Uuid::new_v4(), Some(UploadedFile::new("video/mp4", "x")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn probe_failure_aborts_and_cleans_up() {
        let h = harness(Err(()), RecordingPublisher::default()).await;
        let err = h
            .ingestor
            .ingest(h.owner, h.video_id, Some(UploadedFile::new("video/mp4", "x")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Probe(_)));
        assert!(h.repo.get_video(h.video_id).await.unwrap().video_url.is_none());
        assert!(h.publisher.keys.lock().unwrap().is_empty());
        assert_eq!(staged_count(h.dir.path()), 0);
    }

    #[tokio::test]
    async fn publish_failure_leaves_record_unchanged() {
        let publisher = RecordingPublisher {
            fail: true,
            ..Default::default()
        };
        let h = harness(HD, publisher).await;
        let err = h
            .ingestor
            .ingest(h.owner, h.video_id, Some(UploadedFile::new("video/mp4", "x")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Publish(_)));
        assert!(h.repo.get_video(h.video_id).await.unwrap().video_url.is_none());
        assert_eq!(staged_count(h.dir.path()), 0);
    }

    #[tokio::test]
    async fn failed_cleanup_keeps_recorded_update() {
        let h = harness_with(Arc::new(SwapForDirectory), RecordingPublisher::default()).await;
        let video = h
            .ingestor
            .ingest(h.owner, h.video_id, Some(UploadedFile::new("video/mp4", "bytes")))
            .await
            .expect("cleanup failure must not fail the ingestion");

        let keys = h.publisher.keys.lock().unwrap().clone();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("landscape/"));
        assert!(video.video_url.is_some());
        assert_eq!(h.repo.get_video(h.video_id).await.unwrap(), video);

        // The directory standing in for the staged file is still there.
        let leftover: Vec<_> = std::fs::read_dir(h.dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(leftover.len(), 1);
        assert!(leftover[0].is_dir());
    }

    #[tokio::test]
    async fn mime_parameters_are_ignored() {
        let h = harness(Ok(Dimensions { width: 1080, height: 1920 }), RecordingPublisher::default()).await;
        h.ingestor
            .ingest(
                h.owner,
                h.video_id,
                Some(UploadedFile::new("video/mp4; codecs=avc1", "x")),
            )
            .await
            .unwrap();
        let keys = h.publisher.keys.lock().unwrap().clone();
        assert!(keys[0].starts_with("portrait/"));
        assert!(keys[0].ends_with(".mp4"));
    }
}
