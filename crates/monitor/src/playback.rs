//! Playback clocks for local video feeds.
//!
//! A [`PlaybackHandle`] stands in for a muted, autoplaying, looping video
//! element. It does not decode anything itself: it tracks which position
//! of the file is "on screen" so the sampler can ask ffmpeg for exactly
//! that frame.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crowdwatch_core::ffmpeg::{FfmpegError, FfmpegTools, VideoInfo};
use crowdwatch_core::frame::{FALLBACK_HEIGHT, FALLBACK_WIDTH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Ended,
    Failed(String),
}

#[derive(Debug)]
struct Clock {
    state: PlaybackState,
    /// Position accumulated before the current play run.
    offset: Duration,
    /// Start of the current play run, `None` unless playing.
    resumed_at: Option<Instant>,
}

#[derive(Debug)]
pub struct PlaybackHandle {
    path: PathBuf,
    info: VideoInfo,
    looping: bool,
    clock: Mutex<Clock>,
}

impl PlaybackHandle {
    /// Probe `path` and start looping playback at position zero.
    pub async fn open(tools: &FfmpegTools, path: &Path) -> Result<Self, FfmpegError> {
        let probe = tools.probe_video(path).await?;
        let info = VideoInfo::from(&probe);
        tracing::debug!(
            path = %path.display(),
            duration_secs = info.duration_secs,
            dimensions = ?info.dimensions,
            "Opened local playback",
        );
        Ok(Self::with_info(path.to_path_buf(), info, true))
    }

    pub fn with_info(path: PathBuf, info: VideoInfo, looping: bool) -> Self {
        Self {
            path,
            info,
            looping,
            clock: Mutex::new(Clock {
                state: PlaybackState::Playing,
                offset: Duration::ZERO,
                resumed_at: Some(Instant::now()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> VideoInfo {
        self.info
    }

    /// Native frame size, or 640x480 when the probe reported none.
    pub fn frame_size(&self) -> (u32, u32) {
        self.info
            .dimensions
            .unwrap_or((FALLBACK_WIDTH, FALLBACK_HEIGHT))
    }

    pub fn state(&self) -> PlaybackState {
        let mut clock = self.lock();
        self.settle(&mut clock);
        clock.state.clone()
    }

    /// True when a frame can be taken: playing, not paused, not ended.
    pub fn is_ready(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// Current position in seconds. Looping playback wraps modulo the
    /// duration; otherwise it clamps at the end.
    pub fn current_position(&self) -> f64 {
        let mut clock = self.lock();
        self.settle(&mut clock);
        self.position_of(&clock)
    }

    pub fn pause(&self) {
        let mut clock = self.lock();
        self.settle(&mut clock);
        if clock.state == PlaybackState::Playing {
            if let Some(resumed_at) = clock.resumed_at.take() {
                clock.offset += resumed_at.elapsed();
            }
            clock.state = PlaybackState::Paused;
        }
    }

    pub fn resume(&self) {
        let mut clock = self.lock();
        if clock.state == PlaybackState::Paused {
            clock.state = PlaybackState::Playing;
            clock.resumed_at = Some(Instant::now());
        }
    }

    pub fn fail(&self, reason: impl Into<String>) {
        let mut clock = self.lock();
        clock.resumed_at = None;
        clock.state = PlaybackState::Failed(reason.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Clock> {
        // The clock holds plain data; a poisoned lock is still consistent.
        self.clock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn elapsed(clock: &Clock) -> f64 {
        let running = clock.resumed_at.map(|t| t.elapsed()).unwrap_or_default();
        (clock.offset + running).as_secs_f64()
    }

    fn position_of(&self, clock: &Clock) -> f64 {
        let duration = self.info.duration_secs;
        if duration <= 0.0 {
            return 0.0;
        }
        let elapsed = Self::elapsed(clock);
        if self.looping {
            elapsed % duration
        } else {
            elapsed.min(duration)
        }
    }

    /// Transition non-looping playback to `Ended` once it runs out.
    fn settle(&self, clock: &mut Clock) {
        if self.looping || clock.state != PlaybackState::Playing {
            return;
        }
        let duration = self.info.duration_secs;
        if duration > 0.0 && Self::elapsed(clock) >= duration {
            clock.offset = Duration::from_secs_f64(duration);
            clock.resumed_at = None;
            clock.state = PlaybackState::Ended;
        }
    }
}
