use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ingest::MAX_VIDEO_UPLOAD_SIZE;
use crate::thumbnail::MAX_THUMBNAIL_UPLOAD_SIZE;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: Option<u16>,
    pub assets_root: Option<String>,
    pub platform: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>, // S3-compatible providers
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub ffprobe_path: Option<String>,
}

/// Staged files younger than this are never swept, so an ingestion that is
/// still probing or uploading keeps its file.
pub const MIN_STAGED_MAX_AGE_SECONDS: u64 = 300;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_video_size: u64,
    pub max_thumbnail_size: u64,
    /// Age after which the sweeper removes a staged file. Must cover the
    /// longest probe + upload; at least `MIN_STAGED_MAX_AGE_SECONDS`.
    pub staged_max_age_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_video_size: MAX_VIDEO_UPLOAD_SIZE,
            max_thumbnail_size: MAX_THUMBNAIL_UPLOAD_SIZE,
            staged_max_age_seconds: 3600,
            cleanup_interval_seconds: 600,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub s3: S3Config,
    pub probe: ProbeConfig,
    pub limits: Option<LimitsConfig>,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub assets_root: PathBuf,
    pub platform: String,
    pub jwt_secret: String,
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub ffprobe_path: PathBuf,
    pub max_video_size: u64,
    pub max_thumbnail_size: u64,
    pub limits: LimitsConfig,
    pub log_level: String,
}

impl Config {
    /// Load `config.toml` from the working directory (if present) and apply
    /// environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let config_path = base_dir.join("config.toml");
        let config_file = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Some(toml::from_str::<ConfigFile>(&content)?)
        } else {
            None
        };

        Self::from_sources(&base_dir, config_file, |key| std::env::var(key).ok())
    }

    pub fn from_sources<F>(
        base_dir: &Path,
        config_file: Option<ConfigFile>,
        env: F,
    ) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = config_file.unwrap_or_default();
        let defaults = Self::default();

        let port = env("PORT")
            .and_then(|p| p.parse().ok())
            .or(file.server.port)
            .unwrap_or(defaults.port);

        let assets_root_str = env("ASSETS_ROOT")
            .or(file.server.assets_root)
            .unwrap_or_else(|| "assets".to_string());
        let assets_root = resolve_dir(base_dir, &assets_root_str);

        let platform = env("PLATFORM")
            .or(file.server.platform)
            .unwrap_or(defaults.platform);

        let jwt_secret = env("JWT_SECRET")
            .or(file.auth.jwt_secret)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET must be set"))?;

        let s3_bucket = env("S3_BUCKET")
            .or(file.s3.bucket)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("S3_BUCKET must be set"))?;

        let s3_region = env("S3_REGION")
            .or(file.s3.region)
            .unwrap_or(defaults.s3_region);

        let s3_endpoint = env("S3_ENDPOINT")
            .or(file.s3.endpoint)
            .filter(|s| !s.is_empty());

        let ffprobe_path = env("FFPROBE_PATH")
            .or(file.probe.ffprobe_path)
            .map(PathBuf::from)
            .unwrap_or(defaults.ffprobe_path);

        let limits = file.limits.unwrap_or_default();
        if limits.staged_max_age_seconds < MIN_STAGED_MAX_AGE_SECONDS {
            anyhow::bail!(
                "staged_max_age_seconds {} is below the {} second minimum",
                limits.staged_max_age_seconds,
                MIN_STAGED_MAX_AGE_SECONDS
            );
        }

        let max_video_size = env("MAX_VIDEO_SIZE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(limits.max_video_size);
        if max_video_size > MAX_VIDEO_UPLOAD_SIZE {
            anyhow::bail!(
                "max_video_size {} exceeds the {} byte ceiling",
                max_video_size,
                MAX_VIDEO_UPLOAD_SIZE
            );
        }

        let max_thumbnail_size = env("MAX_THUMBNAIL_SIZE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(limits.max_thumbnail_size);

        let log_level = env("LOG_LEVEL")
            .or(file.logging.log_level)
            .unwrap_or(defaults.log_level);

        Ok(Self {
            port,
            assets_root,
            platform,
            jwt_secret,
            s3_bucket,
            s3_region,
            s3_endpoint,
            ffprobe_path,
            max_video_size,
            max_thumbnail_size,
            limits,
            log_level,
        })
    }
}

fn resolve_dir(base_dir: &Path, dir: &str) -> PathBuf {
    let path = PathBuf::from(dir);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

impl Default for Config {
    fn default() -> Self {
        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let limits = LimitsConfig::default();

        Self {
            port: 8091,
            assets_root: base_dir.join("assets"),
            platform: "dev".to_string(),
            jwt_secret: String::new(),
            s3_bucket: String::new(),
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            ffprobe_path: PathBuf::from("ffprobe"),
            max_video_size: limits.max_video_size,
            max_thumbnail_size: limits.max_thumbnail_size,
            limits,
            log_level: "info".to_string(),
        }
    }
}
