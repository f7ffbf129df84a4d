//! Remote stream capture.
//!
//! [`StreamCapture`] resolves a direct media URL with `yt-dlp` and reads a
//! single frame from it with `ffmpeg`, the whole exchange bounded by one
//! timeout. [`YoutubeThumbnails`] is the fallback: the still thumbnail
//! YouTube publishes for the video, redrawn onto a 1280x720 canvas.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;

use crowdwatch_core::feed::{thumbnail_url, youtube_video_id, YOUTUBE_THUMBNAIL_HOST};
use crowdwatch_core::ffmpeg::{FfmpegError, FfmpegTools};
use crowdwatch_core::frame::{EncodedFrame, FrameError, THUMBNAIL_HEIGHT, THUMBNAIL_WIDTH};

/// Default bound on one capture (resolve + first frame).
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on one thumbnail fetch.
pub const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(10);

/// Format selector handed to yt-dlp.
const STREAM_FORMAT: &str = "best[height<=720]";

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("stream URL must not be empty")]
    EmptyUrl,

    #[error("not a YouTube URL: {0}")]
    NotYoutube(String),

    #[error("yt-dlp could not be started: {0}")]
    ResolverMissing(std::io::Error),

    #[error("yt-dlp failed to resolve stream: {0}")]
    Resolve(String),

    #[error("frame grab failed: {0}")]
    Ffmpeg(#[from] FfmpegError),

    #[error("capture timed out after {0:?}")]
    TimedOut(Duration),

    #[error("thumbnail request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("thumbnail request returned status {0}")]
    ThumbnailStatus(u16),

    #[error("frame could not be encoded: {0}")]
    Frame(#[from] FrameError),

    #[error("frame encoding task failed: {0}")]
    Join(String),
}

/// Grab one frame from a remote stream.
#[async_trait]
pub trait RemoteCapture: Send + Sync {
    async fn capture(&self, stream_url: &str) -> Result<EncodedFrame, CaptureError>;
}

/// Fetch the fallback still for a remote stream.
#[async_trait]
pub trait ThumbnailSource: Send + Sync {
    async fn fetch(&self, stream_url: &str) -> Result<EncodedFrame, CaptureError>;
}

// ---------------------------------------------------------------------------
// yt-dlp + ffmpeg capture
// ---------------------------------------------------------------------------

pub struct StreamCapture {
    ytdlp: PathBuf,
    tools: FfmpegTools,
    timeout: Duration,
}

impl StreamCapture {
    pub fn new(ytdlp: impl Into<PathBuf>, tools: FfmpegTools, timeout: Duration) -> Self {
        Self {
            ytdlp: ytdlp.into(),
            tools,
            timeout,
        }
    }

    /// `yt-dlp -f best[height<=720] -g <url>`; first line of stdout.
    async fn resolve_media_url(&self, stream_url: &str) -> Result<String, CaptureError> {
        let output = tokio::process::Command::new(&self.ytdlp)
            .args(["--quiet", "--no-warnings", "-f", STREAM_FORMAT, "-g"])
            .arg(stream_url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(CaptureError::ResolverMissing)?;

        if !output.status.success() {
            return Err(CaptureError::Resolve(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| CaptureError::Resolve("no media URL in yt-dlp output".into()))
    }

    async fn capture_inner(&self, stream_url: &str) -> Result<EncodedFrame, CaptureError> {
        let media_url = self.resolve_media_url(stream_url).await?;
        let jpeg = self.tools.grab_remote_jpeg(&media_url).await?;
        Ok(EncodedFrame::from_jpeg(jpeg)?)
    }
}

#[async_trait]
impl RemoteCapture for StreamCapture {
    async fn capture(&self, stream_url: &str) -> Result<EncodedFrame, CaptureError> {
        let stream_url = stream_url.trim();
        if stream_url.is_empty() {
            return Err(CaptureError::EmptyUrl);
        }
        // Dropping the future on timeout kills both child processes.
        match tokio::time::timeout(self.timeout, self.capture_inner(stream_url)).await {
            Ok(result) => result,
            Err(_) => Err(CaptureError::TimedOut(self.timeout)),
        }
    }
}

// ---------------------------------------------------------------------------
// Thumbnail fallback
// ---------------------------------------------------------------------------

pub struct YoutubeThumbnails {
    client: reqwest::Client,
    host: String,
}

impl YoutubeThumbnails {
    pub fn new() -> Self {
        Self::with_host(YOUTUBE_THUMBNAIL_HOST)
    }

    /// Point at a different thumbnail host (used by tests).
    pub fn with_host(host: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(THUMBNAIL_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            host: host.into(),
        }
    }
}

impl Default for YoutubeThumbnails {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThumbnailSource for YoutubeThumbnails {
    async fn fetch(&self, stream_url: &str) -> Result<EncodedFrame, CaptureError> {
        let video_id = youtube_video_id(stream_url)
            .ok_or_else(|| CaptureError::NotYoutube(stream_url.to_string()))?;

        let response = self
            .client
            .get(thumbnail_url(&self.host, &video_id))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CaptureError::ThumbnailStatus(status.as_u16()));
        }
        let bytes = response.bytes().await?;

        tokio::task::spawn_blocking(move || {
            EncodedFrame::redraw(&bytes, THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT)
        })
        .await
        .map_err(|e| CaptureError::Join(e.to_string()))?
        .map_err(CaptureError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn missing_resolver_binary_is_reported() {
        let capture = StreamCapture::new(
            "/nonexistent/yt-dlp",
            FfmpegTools::default(),
            Duration::from_secs(5),
        );
        assert_matches!(
            capture.capture("https://www.youtube.com/watch?v=NscyTzvTjHE").await,
            Err(CaptureError::ResolverMissing(_))
        );
    }

    #[tokio::test]
    async fn blank_url_is_rejected() {
        let capture = StreamCapture::new("yt-dlp", FfmpegTools::default(), Duration::from_secs(5));
        assert_matches!(capture.capture("   ").await, Err(CaptureError::EmptyUrl));
    }

    #[tokio::test]
    async fn thumbnail_needs_a_video_id() {
        let thumbs = YoutubeThumbnails::with_host("http://127.0.0.1:9");
        assert_matches!(
            thumbs.fetch("https://example.com/live.m3u8").await,
            Err(CaptureError::NotYoutube(_))
        );
    }
}
