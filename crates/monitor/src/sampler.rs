//! Frame acquisition for every feed kind.
//!
//! The scheduler only sees the [`FrameSource`] trait. [`FeedSampler`] is
//! the production implementation: local feeds are read at their playback
//! position through ffmpeg, remote feeds go through [`RemoteCapture`] and
//! fall back to a [`ThumbnailSource`].

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crowdwatch_core::feed::{FeedDescriptor, SourceKind};
use crowdwatch_core::ffmpeg::{FfmpegError, FfmpegTools};
use crowdwatch_core::frame::{EncodedFrame, FrameError};
use crowdwatch_core::types::FeedId;

use crate::capture::{CaptureError, RemoteCapture, ThumbnailSource};
use crate::playback::{PlaybackHandle, PlaybackState};

/// Upper bound on one local ffmpeg frame extraction.
pub const LOCAL_FRAME_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("feed {feed_id} has no playback handle")]
    NotActivated { feed_id: FeedId },

    #[error("feed {feed_id} is not ready for sampling ({state:?})")]
    NotReady {
        feed_id: FeedId,
        state: PlaybackState,
    },

    #[error("invalid video locator: {0}")]
    InvalidLocator(String),

    #[error("local frame extraction failed: {0}")]
    Local(#[from] FfmpegError),

    #[error("local frame extraction timed out after {0:?}")]
    LocalTimedOut(Duration),

    #[error("frame encoding failed: {0}")]
    Frame(#[from] FrameError),

    #[error("remote capture failed ({capture}) and thumbnail fallback failed ({thumbnail})")]
    Remote {
        capture: CaptureError,
        thumbnail: CaptureError,
    },

    #[error("frame encoding task failed: {0}")]
    Join(String),
}

/// Seam the scheduler samples through.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Prepare a feed for sampling (open playback for local files).
    async fn activate(&self, _feed: &FeedDescriptor) -> Result<(), SampleError> {
        Ok(())
    }

    /// Release whatever [`FrameSource::activate`] acquired.
    ///
    /// Runs while the scheduler holds its task table, so it must not call
    /// back into the scheduler.
    async fn release(&self, _feed_id: &str) {}

    /// Produce one JPEG still of the feed's current picture.
    async fn sample(&self, feed: &FeedDescriptor) -> Result<EncodedFrame, SampleError>;
}

pub struct FeedSampler {
    video_root: PathBuf,
    tools: FfmpegTools,
    capture: Arc<dyn RemoteCapture>,
    thumbnails: Arc<dyn ThumbnailSource>,
    local_timeout: Duration,
    playback: RwLock<HashMap<FeedId, Arc<PlaybackHandle>>>,
}

impl FeedSampler {
    pub fn new(
        video_root: impl Into<PathBuf>,
        tools: FfmpegTools,
        capture: Arc<dyn RemoteCapture>,
        thumbnails: Arc<dyn ThumbnailSource>,
    ) -> Self {
        Self {
            video_root: video_root.into(),
            tools,
            capture,
            thumbnails,
            local_timeout: LOCAL_FRAME_TIMEOUT,
            playback: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_local_timeout(mut self, timeout: Duration) -> Self {
        self.local_timeout = timeout;
        self
    }

    pub async fn playback(&self, feed_id: &str) -> Option<Arc<PlaybackHandle>> {
        self.playback.read().await.get(feed_id).cloned()
    }

    /// Register an existing playback handle for a feed.
    pub async fn attach_playback(&self, feed_id: impl Into<FeedId>, handle: PlaybackHandle) {
        self.playback
            .write()
            .await
            .insert(feed_id.into(), Arc::new(handle));
    }

    /// Capture a remote stream, falling back to its thumbnail.
    pub async fn sample_remote(&self, stream_url: &str) -> Result<EncodedFrame, SampleError> {
        let capture = match self.capture.capture(stream_url).await {
            Ok(frame) => return Ok(frame),
            Err(e) => e,
        };
        tracing::warn!(
            stream_url,
            error = %capture,
            "Stream capture failed, falling back to thumbnail",
        );
        self.thumbnails
            .fetch(stream_url)
            .await
            .map_err(|thumbnail| SampleError::Remote { capture, thumbnail })
    }

    async fn sample_local(&self, feed: &FeedDescriptor) -> Result<EncodedFrame, SampleError> {
        let handle = self
            .playback(&feed.id)
            .await
            .ok_or_else(|| SampleError::NotActivated {
                feed_id: feed.id.clone(),
            })?;

        let state = handle.state();
        if state != PlaybackState::Playing {
            return Err(SampleError::NotReady {
                feed_id: feed.id.clone(),
                state,
            });
        }

        let (width, height) = handle.frame_size();
        // Dropping the extraction on timeout kills the ffmpeg child.
        let extraction =
            self.tools
                .extract_rgb_frame(handle.path(), handle.current_position(), width, height);
        let pixels = tokio::time::timeout(self.local_timeout, extraction)
            .await
            .map_err(|_| SampleError::LocalTimedOut(self.local_timeout))??;

        tokio::task::spawn_blocking(move || EncodedFrame::from_raw_rgb(width, height, pixels))
            .await
            .map_err(|e| SampleError::Join(e.to_string()))?
            .map_err(SampleError::from)
    }
}

/// Resolve a locator under the video root, refusing anything that could
/// escape it.
pub fn resolve_video_path(root: &Path, locator: &str) -> Result<PathBuf, SampleError> {
    let relative = Path::new(locator.trim_start_matches('/'));
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if locator.trim().is_empty() || escapes {
        return Err(SampleError::InvalidLocator(locator.to_string()));
    }
    Ok(root.join(relative))
}

#[async_trait]
impl FrameSource for FeedSampler {
    async fn activate(&self, feed: &FeedDescriptor) -> Result<(), SampleError> {
        if feed.source_kind != SourceKind::Local || self.playback(&feed.id).await.is_some() {
            return Ok(());
        }
        let path = resolve_video_path(&self.video_root, &feed.locator)?;
        let handle = match PlaybackHandle::open(&self.tools, &path).await {
            Ok(handle) => handle,
            Err(e) => {
                // Keep a failed handle so sampling reports why.
                let handle = PlaybackHandle::with_info(path, Default::default(), true);
                handle.fail(e.to_string());
                self.attach_playback(feed.id.clone(), handle).await;
                return Err(e.into());
            }
        };
        self.attach_playback(feed.id.clone(), handle).await;
        Ok(())
    }

    async fn release(&self, feed_id: &str) {
        self.playback.write().await.remove(feed_id);
    }

    async fn sample(&self, feed: &FeedDescriptor) -> Result<EncodedFrame, SampleError> {
        match feed.source_kind {
            SourceKind::Local => self.sample_local(feed).await,
            SourceKind::Youtube => self.sample_remote(&feed.locator).await,
        }
    }
}
