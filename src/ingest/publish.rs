//! Publishing staged files to an object store.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, ObjectStoreExt, PutPayload};
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

use super::classify::AspectClass;
use super::stage::StagedFile;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to read staged file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("upload of {key} failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: object_store::Error,
    },

    #[error("invalid object store configuration: {0}")]
    Config(String),
}

/// Where a published object lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub bucket: String,
    pub region: String,
    pub key: String,
    pub endpoint: Option<String>,
}

impl RemoteObject {
    /// Public retrieval URL. Custom endpoints use path-style addressing.
    pub fn url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.bucket,
                self.key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, self.key
            ),
        }
    }
}

pub fn object_key(class: AspectClass, file_name: &str) -> String {
    format!("{}/{}", class, file_name)
}

#[async_trait]
pub trait ObjectPublisher: Send + Sync {
    /// Upload the staged bytes under `{class}/{file_name}`. Returns once the
    /// store has acknowledged the write.
    async fn publish(
        &self,
        staged: &StagedFile,
        class: AspectClass,
    ) -> Result<RemoteObject, PublishError>;
}

pub struct ObjectStorePublisher<S> {
    store: S,
    bucket: String,
    region: String,
    endpoint: Option<String>,
}

impl ObjectStorePublisher<AmazonS3> {
    /// S3 publisher using credentials from the environment.
    pub fn s3(
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<String>,
    ) -> Result<Self, PublishError> {
        let bucket = bucket.into();
        let region = region.into();

        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| PublishError::Config(e.to_string()))?;

        Ok(Self {
            store,
            bucket,
            region,
            endpoint,
        })
    }
}

impl<S> ObjectStorePublisher<S> {
    pub fn new(store: S, bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            region: region.into(),
            endpoint: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S> ObjectPublisher for ObjectStorePublisher<S>
where
    S: ObjectStore,
{
    async fn publish(
        &self,
        staged: &StagedFile,
        class: AspectClass,
    ) -> Result<RemoteObject, PublishError> {
        let key = object_key(class, staged.file_name());
        let data = tokio::fs::read(staged.path())
            .await
            .map_err(|source| PublishError::Read {
                path: staged.path().to_path_buf(),
                source,
            })?;
        let size = data.len() as u64;
        let start = Instant::now();

        self.store
            .put(&ObjectPath::from(key.as_str()), PutPayload::from(Bytes::from(data)))
            .await
            .map_err(|source| {
                tracing::error!(
                    error = %source,
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "object upload failed"
                );
                PublishError::Upload {
                    key: key.clone(),
                    source,
                }
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "object upload successful"
        );

        Ok(RemoteObject {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            key,
            endpoint: self.endpoint.clone(),
        })
    }
}
