//! Stream geometry via an external `ffprobe` process.

use async_trait::async_trait;
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to execute {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to collect prober output: {0}")]
    Io(#[from] io::Error),

    #[error("prober exited with status {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("prober reported errors: {0}")]
    Stderr(String),

    #[error("failed to parse prober output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no video streams found")]
    NoVideoStream,

    #[error("invalid stream dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Width and height of the first video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

#[async_trait]
pub trait AspectProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<Dimensions, ProbeError>;
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
}

/// Parse `-of json` output and take the first reported stream.
pub fn parse_dimensions(stdout: &[u8]) -> Result<Dimensions, ProbeError> {
    let output: FfprobeOutput = serde_json::from_slice(stdout)?;
    let stream = output.streams.first().ok_or(ProbeError::NoVideoStream)?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(ProbeError::InvalidDimensions { width, height });
    }

    Ok(Dimensions { width, height })
}

#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: PathBuf,
}

impl FfprobeProber {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[async_trait]
impl AspectProbe for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<Dimensions, ProbeError> {
        let mut child = Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProbeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr not captured"))?;

        // Both pipes are drained while waiting so a full buffer can't stall the child.
        let mut out = Vec::new();
        let mut err = Vec::new();
        let (_, _, status) = tokio::try_join!(
            stdout.read_to_end(&mut out),
            stderr.read_to_end(&mut err),
            child.wait(),
        )?;

        let stderr = String::from_utf8_lossy(&err).trim().to_string();

        if !status.success() {
            return Err(ProbeError::ExitStatus {
                code: status.code(),
                stderr,
            });
        }

        if !stderr.is_empty() {
            return Err(ProbeError::Stderr(stderr));
        }

        let dimensions = parse_dimensions(&out)?;
        tracing::debug!(
            path = %path.display(),
            width = dimensions.width,
            height = dimensions.height,
            "probed video stream"
        );
        Ok(dimensions)
    }
}
