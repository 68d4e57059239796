#![allow(dead_code)]

use object_store::memory::InMemory;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tubely_backend::{
    config::Config,
    ingest::{probe::FfprobeProber, publish::ObjectStorePublisher, Ingestor},
    models::{AppState, Video},
    store::{InMemoryVideoRepository, VideoRepository},
};
use uuid::Uuid;

pub const BUCKET: &str = "tubely-test";
pub const REGION: &str = "us-east-2";
pub const SECRET: &str = "integration-secret";

/// Prints 1920x1080 stream geometry, after checking the file it was given exists.
pub const LANDSCAPE_PROBE: &str = r#"for last; do :; done
test -f "$last" || exit 3
echo '{"programs":[],"streams":[{"width":1920,"height":1080}]}'"#;

pub const FAILING_PROBE: &str = "exit 1";

pub const NOISY_PROBE: &str = r#"echo '{"streams":[{"width":1920,"height":1080}]}'
echo 'moov atom not found' >&2"#;

pub const EMPTY_PROBE: &str = r#"echo '{"streams":[]}'"#;

/// Write an executable shell script standing in for ffprobe.
#[cfg(unix)]
pub fn fake_prober(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(format!("ffprobe-{}", Uuid::new_v4()));
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

pub struct TestEnv {
    pub assets: TempDir,
    pub scripts: TempDir,
    pub repo: Arc<InMemoryVideoRepository>,
    pub publisher: Arc<ObjectStorePublisher<InMemory>>,
    pub owner: Uuid,
    pub video_id: Uuid,
}

impl TestEnv {
    pub async fn new() -> Self {
        let assets = tempfile::tempdir().expect("assets dir");
        let scripts = tempfile::tempdir().expect("scripts dir");
        let repo = Arc::new(InMemoryVideoRepository::new());
        let owner = Uuid::new_v4();
        let video = repo
            .create_video(Video::new(owner, "boots", "a video about boots"))
            .await
            .expect("create video");
        let publisher = Arc::new(ObjectStorePublisher::new(InMemory::new(), BUCKET, REGION));

        Self {
            assets,
            scripts,
            repo,
            publisher,
            owner,
            video_id: video.id,
        }
    }

    pub fn ingestor(&self, prober: &Path) -> Ingestor {
        Ingestor::new(
            self.repo.clone(),
            Arc::new(FfprobeProber::new(prober)),
            self.publisher.clone(),
            self.assets.path(),
        )
    }

    pub fn app_state(&self, prober: &Path, max_video_size: u64) -> Arc<AppState> {
        let config = Config {
            assets_root: self.assets.path().to_path_buf(),
            jwt_secret: SECRET.to_string(),
            s3_bucket: BUCKET.to_string(),
            s3_region: REGION.to_string(),
            ffprobe_path: prober.to_path_buf(),
            max_video_size,
            ..Config::default()
        };

        Arc::new(AppState {
            videos: self.repo.clone(),
            ingestor: self.ingestor(prober).with_max_upload_size(max_video_size),
            config,
        })
    }

    pub async fn video_url(&self) -> Option<String> {
        self.repo
            .get_video(self.video_id)
            .await
            .expect("video exists")
            .video_url
    }

    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.assets.path())
            .expect("read assets")
            .count()
    }
}

pub fn canonical_url(key: &str) -> String {
    format!("https://{}.s3.{}.amazonaws.com/{}", BUCKET, REGION, key)
}

/// Key part of a canonical URL.
pub fn key_of(url: &str) -> &str {
    url.splitn(4, '/').nth(3).expect("url has a key")
}
