#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use crowdwatch_api::config::ServerConfig;
use crowdwatch_api::router::build_app_router;
use crowdwatch_api::state::AppState;
use crowdwatch_cloud::chat::{ChatCompleter, ChatError, ChatReply, ChatUsage};
use crowdwatch_cloud::vision::{DetectionError, Detector};
use crowdwatch_core::chat::{AnalyticsContext, ChatMessage};
use crowdwatch_core::detection::{
    DetectedFace, DetectedObject, DetectionResult, NormalizedVertex, PixelVertex,
};
use crowdwatch_core::feed::{FeedDescriptor, FeedRegistry, FeedStatus, SourceKind};
use crowdwatch_core::ffmpeg::FfmpegTools;
use crowdwatch_core::frame::EncodedFrame;
use crowdwatch_monitor::capture::{CaptureError, RemoteCapture, ThumbnailSource};
use crowdwatch_monitor::sampler::FeedSampler;
use crowdwatch_monitor::settings::AnalysisFlagStore;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

pub struct FakeDetector {
    pub configured: bool,
    pub result: Option<DetectionResult>,
    pub calls: AtomicUsize,
}

impl FakeDetector {
    pub fn returning(result: DetectionResult) -> Arc<Self> {
        Arc::new(Self {
            configured: true,
            result: Some(result),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            configured: true,
            result: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn unconfigured() -> Arc<Self> {
        Arc::new(Self {
            configured: false,
            result: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Detector for FakeDetector {
    async fn detect(&self, _image: &[u8]) -> Result<DetectionResult, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.configured {
            return Err(DetectionError::Unconfigured);
        }
        self.result.clone().ok_or(DetectionError::UpstreamError {
            status: Some(403),
            message: "API key not valid".into(),
        })
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

pub struct FakeCompleter {
    pub configured: bool,
    pub reply: Option<String>,
    pub last_context: std::sync::Mutex<Option<AnalyticsContext>>,
}

impl FakeCompleter {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            configured: true,
            reply: Some(reply.into()),
            last_context: Default::default(),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            configured: true,
            reply: None,
            last_context: Default::default(),
        })
    }

    pub fn unconfigured() -> Arc<Self> {
        Arc::new(Self {
            configured: false,
            reply: None,
            last_context: Default::default(),
        })
    }

    pub fn last_context(&self) -> Option<AnalyticsContext> {
        self.last_context.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatCompleter for FakeCompleter {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        context: Option<&AnalyticsContext>,
    ) -> Result<ChatReply, ChatError> {
        *self.last_context.lock().unwrap() = context.cloned();
        match &self.reply {
            Some(message) => Ok(ChatReply {
                message: message.clone(),
                usage: ChatUsage {
                    prompt_tokens: Some(10),
                    completion_tokens: Some(5),
                    total_tokens: Some(15),
                },
                model: Some("test-model".into()),
            }),
            None => Err(ChatError::Upstream {
                status: 500,
                body: "down".into(),
            }),
        }
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

pub struct FakeCapture {
    pub ok: bool,
}

#[async_trait]
impl RemoteCapture for FakeCapture {
    async fn capture(&self, stream_url: &str) -> Result<EncodedFrame, CaptureError> {
        if stream_url.trim().is_empty() {
            return Err(CaptureError::EmptyUrl);
        }
        if self.ok {
            Ok(EncodedFrame {
                jpeg: vec![0xff, 0xd8, 0xff, 0xd9],
                width: 1280,
                height: 720,
            })
        } else {
            Err(CaptureError::TimedOut(Duration::from_secs(30)))
        }
    }
}

#[async_trait]
impl ThumbnailSource for FakeCapture {
    async fn fetch(&self, stream_url: &str) -> Result<EncodedFrame, CaptureError> {
        self.capture(stream_url).await
    }
}

/// `persons` person objects and `faces` faces.
pub fn detection(persons: usize, faces: usize) -> DetectionResult {
    let quad = vec![
        NormalizedVertex { x: 0.1, y: 0.1 },
        NormalizedVertex { x: 0.3, y: 0.1 },
        NormalizedVertex { x: 0.3, y: 0.5 },
        NormalizedVertex { x: 0.1, y: 0.5 },
    ];
    let objects = (0..persons)
        .map(|_| DetectedObject {
            name: "person".into(),
            confidence: 0.87,
            bounding_box: quad.clone(),
        })
        .collect();
    let faces = (0..faces)
        .map(|_| DetectedFace {
            confidence: 0.9,
            bounding_box: vec![
                PixelVertex { x: 100.0, y: 100.0 },
                PixelVertex { x: 200.0, y: 100.0 },
                PixelVertex { x: 200.0, y: 200.0 },
                PixelVertex { x: 100.0, y: 200.0 },
            ],
            expressions: None,
        })
        .collect();
    DetectionResult::from_annotations(objects, faces)
}

// ---------------------------------------------------------------------------
// App builder
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` rooted in `dir`.
pub fn test_config(dir: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        video_root: dir.path().join("public"),
        analysis_state_path: dir.path().join("data/analysis-state.json"),
        ..ServerConfig::default()
    }
}

/// Three remote feeds plus one local feed in maintenance, so polling
/// never shells out to ffmpeg.
pub fn test_registry() -> FeedRegistry {
    let remote = |id: &str, name: &str| FeedDescriptor {
        id: id.into(),
        name: name.into(),
        source_kind: SourceKind::Youtube,
        locator: "https://www.youtube.com/watch?v=NscyTzvTjHE".into(),
        location: "Public Area".into(),
        status: FeedStatus::Active,
        alerts: 1,
    };
    FeedRegistry::new(vec![
        remote("cam-001", "Lobby Entrance"),
        remote("cam-002", "Exterior Parking"),
        remote("cam-003", "Street View Live"),
        FeedDescriptor {
            id: "cam-004".into(),
            name: "Loading Dock".into(),
            source_kind: SourceKind::Local,
            locator: "videos/dock.mp4".into(),
            location: "Warehouse".into(),
            status: FeedStatus::Maintenance,
            alerts: 0,
        },
    ])
    .unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub dir: TempDir,
}

impl TestApp {
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Build the full application router with all middleware layers around
/// the given fakes.
///
/// Uses the same [`build_app_router`] as `main.rs` so integration tests
/// exercise the production middleware stack.
pub fn build_test_app(detector: Arc<dyn Detector>, chat: Arc<dyn ChatCompleter>) -> TestApp {
    build_test_app_with_capture(detector, chat, true)
}

pub fn build_test_app_with_capture(
    detector: Arc<dyn Detector>,
    chat: Arc<dyn ChatCompleter>,
    capture_ok: bool,
) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let capture = Arc::new(FakeCapture { ok: capture_ok });
    let sampler = Arc::new(FeedSampler::new(
        config.video_root.clone(),
        FfmpegTools::default(),
        capture.clone(),
        capture.clone(),
    ));
    let flag = Arc::new(AnalysisFlagStore::new(config.analysis_state_path.clone()));

    let state = AppState::assemble(
        config.clone(),
        test_registry(),
        sampler,
        capture,
        detector,
        chat,
        flag,
    );
    let router = build_app_router(state.clone(), &config);
    TestApp { router, state, dir }
}

/// App with configured fakes: detection finds 3 people, chat answers "ok".
pub fn test_app() -> TestApp {
    build_test_app(FakeDetector::returning(detection(3, 2)), FakeCompleter::replying("ok"))
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Request::delete(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    json_request(app, Method::POST, uri, body).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    json_request(app, Method::PUT, uri, body).await
}

pub async fn post_empty(app: Router, uri: &str) -> Response<Body> {
    send(
        app,
        Request::post(uri).body(Body::empty()).unwrap(),
    )
    .await
}

async fn json_request(
    app: Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
