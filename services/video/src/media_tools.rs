//! ffprobe/ffmpeg adapters.
//!
//! The upload pipeline only sees the [`MediaToolkit`] trait, so tests can run
//! it against fakes and deployments can swap the implementation.

use crate::aspect::{self, AspectCategory};
use crate::config::MediaConfig;
use crate::staging::StagedFile;
use async_trait::async_trait;
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

const FASTSTART_SUFFIX: &str = "-faststart";

#[derive(Error, Debug)]
pub enum MediaToolError {
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("unparsable probe output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("probe found no streams")]
    NoStreams,

    #[error("probe found no video stream")]
    NoVideoStream,

    #[error("invalid video dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("input path has no extension: {}", .0.display())]
    MissingExtension(PathBuf),
}

/// Frame size of the first video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDimensions {
    pub width: u32,
    pub height: u32,
}

/// Probing and remuxing capability used by the upload pipeline
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Read the dimensions of the first video stream in `path`
    async fn probe(&self, path: &Path) -> Result<VideoDimensions, MediaToolError>;

    /// Rewrite `input` with its index atoms at the front, without re-encoding.
    ///
    /// Returns the path of the new file, which the caller then owns.
    async fn remux_fast_start(&self, input: &Path) -> Result<PathBuf, MediaToolError>;
}

/// Probe a file and bucket its aspect ratio
pub async fn probe_aspect(
    toolkit: &dyn MediaToolkit,
    path: &Path,
) -> Result<AspectCategory, MediaToolError> {
    let VideoDimensions { width, height } = toolkit.probe(path).await?;

    aspect::classify(width, height).ok_or(MediaToolError::InvalidDimensions { width, height })
}

/// `dir/name.ext` -> `dir/name-faststart.ext`
pub fn faststart_output_path(input: &Path) -> Result<PathBuf, MediaToolError> {
    let missing = || MediaToolError::MissingExtension(input.to_path_buf());

    let extension = input.extension().ok_or_else(missing)?;
    let stem = input.file_stem().ok_or_else(missing)?;

    let mut file_name = stem.to_os_string();
    file_name.push(FASTSTART_SUFFIX);
    file_name.push(".");
    file_name.push(extension);

    Ok(input.with_file_name(file_name))
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Extract the first video stream's dimensions from ffprobe JSON
pub fn parse_probe_output(stdout: &[u8]) -> Result<VideoDimensions, MediaToolError> {
    let output: ProbeOutput = serde_json::from_slice(stdout)?;

    if output.streams.is_empty() {
        return Err(MediaToolError::NoStreams);
    }

    let stream = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or(MediaToolError::NoVideoStream)?;

    Ok(VideoDimensions {
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
    })
}

/// Toolkit backed by the ffprobe and ffmpeg binaries
pub struct FfmpegToolkit {
    ffprobe_path: String,
    ffmpeg_path: String,
}

impl FfmpegToolkit {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            ffprobe_path: config.ffprobe_path.clone(),
            ffmpeg_path: config.ffmpeg_path.clone(),
        }
    }

    async fn run(&self, tool: &str, command: &mut Command) -> Result<Vec<u8>, MediaToolError> {
        let output = command
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| MediaToolError::Spawn {
                tool: tool.to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(tool = tool, status = %output.status, stderr = %stderr, "Media tool failed");
            return Err(MediaToolError::Failed {
                tool: tool.to_string(),
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    #[instrument(skip(self), fields(tool = %self.ffprobe_path, path = %path.display()))]
    async fn probe(&self, path: &Path) -> Result<VideoDimensions, MediaToolError> {
        let stdout = self
            .run(
                "ffprobe",
                Command::new(&self.ffprobe_path)
                    .args(["-v", "error", "-print_format", "json", "-show_streams"])
                    .arg(path),
            )
            .await?;

        let dimensions = parse_probe_output(&stdout)?;
        debug!(
            width = dimensions.width,
            height = dimensions.height,
            "Probed video dimensions"
        );

        Ok(dimensions)
    }

    #[instrument(skip(self), fields(tool = %self.ffmpeg_path, input = %input.display()))]
    async fn remux_fast_start(&self, input: &Path) -> Result<PathBuf, MediaToolError> {
        let output_path = faststart_output_path(input)?;
        // Owns whatever ffmpeg writes until the remux succeeds, including
        // when this future is dropped and kill_on_drop stops ffmpeg.
        let output = StagedFile::adopt(&output_path);

        let result = self
            .run(
                "ffmpeg",
                Command::new(&self.ffmpeg_path)
                    // Never overwrite: a pre-existing output means a naming bug
                    .arg("-n")
                    .arg("-i")
                    .arg(input)
                    .args(["-c", "copy", "-movflags", "faststart", "-f", "mp4"])
                    .arg(&output_path),
            )
            .await;

        if let Err(e) = result {
            if let Err(rm) = output.remove().await {
                warn!(path = %output_path.display(), error = %rm, "Failed to remove partial remux output");
            }
            return Err(e);
        }

        debug!(output = %output_path.display(), "Remuxed for fast start");
        Ok(output.into_path())
    }
}
