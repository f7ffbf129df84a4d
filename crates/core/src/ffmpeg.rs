//! FFmpeg/FFprobe command helpers.
//!
//! Binaries are resolved through [`FfmpegTools`] so deployments can point
//! at non-PATH installs. Every child process is spawned with
//! `kill_on_drop`, so wrapping a call in `tokio::time::timeout` is enough
//! to bound it.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("ffmpeg produced no frame data")]
    EmptyOutput,

    #[error("video file not found: {0}")]
    VideoNotFound(String),
}

/// Paths of the external media binaries.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
}

/// The parts of a probe the sampler cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VideoInfo {
    pub duration_secs: f64,
    /// `None` when the container reports no video dimensions.
    pub dimensions: Option<(u32, u32)>,
}

impl From<&FfprobeOutput> for VideoInfo {
    fn from(probe: &FfprobeOutput) -> Self {
        Self {
            duration_secs: parse_duration(probe),
            dimensions: parse_resolution(probe),
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl FfmpegTools {
    /// Run `ffprobe` on a video file and return the parsed JSON output.
    pub async fn probe_video(&self, path: &Path) -> Result<FfprobeOutput, FfmpegError> {
        if !path.exists() {
            return Err(FfmpegError::VideoNotFound(
                path.to_string_lossy().to_string(),
            ));
        }

        let output = tokio::process::Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(FfmpegError::NotFound)?;

        if !output.status.success() {
            return Err(FfmpegError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str::<FfprobeOutput>(&stdout)
            .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
    }

    /// Decode the frame at `timestamp_secs` as packed `rgb24` pixels
    /// scaled to `width`x`height`.
    pub async fn extract_rgb_frame(
        &self,
        video_path: &Path,
        timestamp_secs: f64,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, FfmpegError> {
        if !video_path.exists() {
            return Err(FfmpegError::VideoNotFound(
                video_path.to_string_lossy().to_string(),
            ));
        }

        let output = tokio::process::Command::new(&self.ffmpeg)
            .args(["-v", "error", "-ss", &format!("{timestamp_secs:.3}"), "-i"])
            .arg(video_path)
            .args([
                "-frames:v",
                "1",
                "-s",
                &format!("{width}x{height}"),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(FfmpegError::NotFound)?;

        finish_frame_output(output)
    }

    /// Read one frame from a remote media URL and return it as JPEG bytes.
    pub async fn grab_remote_jpeg(&self, media_url: &str) -> Result<Vec<u8>, FfmpegError> {
        let output = tokio::process::Command::new(&self.ffmpeg)
            .args(["-v", "error", "-i", media_url])
            .args([
                "-frames:v", "1", "-f", "image2", "-c:v", "mjpeg", "-q:v", "5", "pipe:1",
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(FfmpegError::NotFound)?;

        finish_frame_output(output)
    }
}

fn finish_frame_output(output: std::process::Output) -> Result<Vec<u8>, FfmpegError> {
    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    if output.stdout.is_empty() {
        return Err(FfmpegError::EmptyOutput);
    }
    Ok(output.stdout)
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn first_video_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
}

/// Parse the video duration in seconds from ffprobe output.
pub fn parse_duration(probe: &FfprobeOutput) -> f64 {
    // Format-level duration first, then the video stream's.
    let format = probe.format.duration.as_deref();
    let stream = first_video_stream(probe).and_then(|s| s.duration.as_deref());
    [format, stream]
        .into_iter()
        .flatten()
        .find_map(|d| d.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .unwrap_or(0.0)
}

/// First video stream's resolution, if both sides are known and non-zero.
pub fn parse_resolution(probe: &FfprobeOutput) -> Option<(u32, u32)> {
    first_video_stream(probe)
        .and_then(|s| Some((s.width?, s.height?)))
        .filter(|(w, h)| *w > 0 && *h > 0)
}
