//! Local staging of uploaded bytes.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const NAME_ENTROPY_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to write staged file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An upload written to the assets root. The caller removes it when done.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    file_name: String,
    size: u64,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Delete the staged file. A file that is already gone counts as removed.
    pub async fn remove(self) -> io::Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Subtype of a MIME type, e.g. `mp4` for `video/mp4; codecs=avc1`.
pub fn media_subtype(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .and_then(|essence| essence.split_once('/'))
        .map(|(_, subtype)| subtype.trim())
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || "-+.".contains(c)))
        .unwrap_or("bin")
}

/// Random url-safe name suffixed with the declared media subtype.
pub fn staged_file_name(content_type: &str) -> String {
    let entropy: [u8; NAME_ENTROPY_BYTES] = rand::random();
    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(entropy),
        media_subtype(content_type)
    )
}

/// Write `data` under `root` with a collision-resistant name.
pub async fn stage_upload(
    root: &Path,
    content_type: &str,
    data: &[u8],
) -> Result<StagedFile, StageError> {
    let file_name = staged_file_name(content_type);
    let path = root.join(&file_name);

    write_new(&path, data)
        .await
        .map_err(|source| StageError::Write {
            path: path.clone(),
            source,
        })?;

    Ok(StagedFile {
        path,
        file_name,
        size: data.len() as u64,
    })
}

async fn write_new(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}
