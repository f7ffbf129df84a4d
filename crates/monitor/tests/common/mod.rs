#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crowdwatch_cloud::chat::{ChatCompleter, ChatError, ChatReply, ChatUsage};
use crowdwatch_cloud::vision::{DetectionError, Detector};
use crowdwatch_core::chat::{AnalyticsContext, ChatMessage};
use crowdwatch_core::detection::{
    DetectedFace, DetectedObject, DetectionResult, NormalizedVertex, PixelVertex,
};
use crowdwatch_core::feed::{FeedDescriptor, FeedRegistry, FeedStatus, SourceKind};
use crowdwatch_core::frame::EncodedFrame;
use crowdwatch_monitor::capture::{CaptureError, RemoteCapture, ThumbnailSource};
use crowdwatch_monitor::sampler::{FrameSource, SampleError};

pub fn feed(id: &str, kind: SourceKind) -> FeedDescriptor {
    FeedDescriptor {
        id: id.into(),
        name: format!("Camera {id}"),
        source_kind: kind,
        locator: match kind {
            SourceKind::Local => format!("videos/{id}.mp4"),
            SourceKind::Youtube => "https://www.youtube.com/watch?v=NscyTzvTjHE".into(),
        },
        location: "Test Site".into(),
        status: FeedStatus::Active,
        alerts: 0,
    }
}

pub fn registry(feeds: Vec<FeedDescriptor>) -> FeedRegistry {
    FeedRegistry::new(feeds).unwrap()
}

pub fn tiny_frame() -> EncodedFrame {
    EncodedFrame {
        jpeg: vec![0xff, 0xd8, 0xff, 0xd9],
        width: 640,
        height: 480,
    }
}

/// `persons` person objects and `faces` faces.
pub fn detection(persons: usize, faces: usize) -> DetectionResult {
    let quad = vec![NormalizedVertex { x: 0.1, y: 0.1 }; 4];
    let objects = (0..persons)
        .map(|_| DetectedObject {
            name: "person".into(),
            confidence: 0.9,
            bounding_box: quad.clone(),
        })
        .collect();
    let faces = (0..faces)
        .map(|_| DetectedFace {
            confidence: 0.8,
            bounding_box: vec![PixelVertex::default(); 4],
            expressions: None,
        })
        .collect();
    DetectionResult::from_annotations(objects, faces)
}

// ---------------------------------------------------------------------------
// Frame source
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeSource {
    pub samples: AtomicUsize,
    pub fail: bool,
}

impl FakeSource {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl FrameSource for FakeSource {
    async fn sample(&self, feed: &FeedDescriptor) -> Result<EncodedFrame, SampleError> {
        self.samples.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SampleError::NotActivated {
                feed_id: feed.id.clone(),
            });
        }
        Ok(tiny_frame())
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

pub struct FakeDetector {
    pub result: Option<DetectionResult>,
    pub delay: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeDetector {
    pub fn returning(result: DetectionResult) -> Self {
        Self {
            result: Some(result),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: None,
            ..Self::returning(DetectionResult::empty())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Detector for FakeDetector {
    async fn detect(&self, _image: &[u8]) -> Result<DetectionResult, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.result.clone().ok_or(DetectionError::UpstreamError {
            status: Some(500),
            message: "backend error".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Remote capture / thumbnails
// ---------------------------------------------------------------------------

pub struct FakeCapture {
    pub ok: bool,
    pub calls: AtomicUsize,
}

impl FakeCapture {
    pub fn new(ok: bool) -> Arc<Self> {
        Arc::new(Self {
            ok,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RemoteCapture for FakeCapture {
    async fn capture(&self, _stream_url: &str) -> Result<EncodedFrame, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.ok {
            Ok(tiny_frame())
        } else {
            Err(CaptureError::TimedOut(Duration::from_secs(30)))
        }
    }
}

#[async_trait]
impl ThumbnailSource for FakeCapture {
    async fn fetch(&self, _stream_url: &str) -> Result<EncodedFrame, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.ok {
            Ok(EncodedFrame {
                width: 1280,
                height: 720,
                ..tiny_frame()
            })
        } else {
            Err(CaptureError::ThumbnailStatus(404))
        }
    }
}

// ---------------------------------------------------------------------------
// Chat completer
// ---------------------------------------------------------------------------

pub struct FakeCompleter {
    pub reply: Option<String>,
    pub delay: Duration,
    pub last_history_len: AtomicUsize,
    pub last_total_people: AtomicUsize,
}

impl FakeCompleter {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.into()),
            delay: Duration::ZERO,
            last_history_len: AtomicUsize::new(0),
            last_total_people: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            ..Self::replying("")
        }
    }
}

#[async_trait]
impl ChatCompleter for FakeCompleter {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        context: Option<&AnalyticsContext>,
    ) -> Result<ChatReply, ChatError> {
        self.last_history_len.store(messages.len(), Ordering::SeqCst);
        if let Some(ctx) = context {
            self.last_total_people
                .store(ctx.total_people as usize, Ordering::SeqCst);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            Some(message) => Ok(ChatReply {
                message: message.clone(),
                usage: ChatUsage::default(),
                model: None,
            }),
            None => Err(ChatError::Upstream {
                status: 500,
                body: "down".into(),
            }),
        }
    }
}
