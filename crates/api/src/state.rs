use std::sync::Arc;
use std::time::Duration;

use crowdwatch_cloud::chat::{ChatApi, ChatCompleter};
use crowdwatch_cloud::vision::{Detector, VisionApi};
use crowdwatch_core::aggregation::AggregationStore;
use crowdwatch_core::error::CoreError;
use crowdwatch_core::feed::FeedRegistry;
use crowdwatch_core::ffmpeg::FfmpegTools;
use crowdwatch_monitor::assistant::ChatSessions;
use crowdwatch_monitor::capture::{RemoteCapture, StreamCapture, YoutubeThumbnails};
use crowdwatch_monitor::sampler::FeedSampler;
use crowdwatch_monitor::scheduler::PollingScheduler;
use crowdwatch_monitor::settings::AnalysisFlagStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Latest committed counts and runtime state of every feed.
    pub store: Arc<AggregationStore>,
    pub scheduler: Arc<PollingScheduler>,
    /// Frame source of the scheduler; also holds local playback handles.
    pub sampler: Arc<FeedSampler>,
    /// Direct stream capture behind `/api/youtube-frame`.
    pub capture: Arc<dyn RemoteCapture>,
    pub detector: Arc<dyn Detector>,
    pub chat: Arc<dyn ChatCompleter>,
    pub sessions: Arc<ChatSessions>,
    pub analysis_flag: Arc<AnalysisFlagStore>,
}

impl AppState {
    /// Wire the production services from configuration.
    pub fn from_config(config: ServerConfig) -> Result<Self, CoreError> {
        let registry = match &config.feeds_file {
            Some(path) => FeedRegistry::from_json_file(path)?,
            None => FeedRegistry::default_feeds(),
        };
        tracing::info!(feeds = registry.len(), "Feed registry loaded");

        let tools = FfmpegTools {
            ffmpeg: config.ffmpeg_bin.clone(),
            ffprobe: config.ffprobe_bin.clone(),
        };
        let capture: Arc<dyn RemoteCapture> = Arc::new(StreamCapture::new(
            config.ytdlp_bin.clone(),
            tools.clone(),
            Duration::from_secs(config.frame_capture_timeout_secs),
        ));
        let sampler = Arc::new(FeedSampler::new(
            config.video_root.clone(),
            tools,
            Arc::clone(&capture),
            Arc::new(YoutubeThumbnails::new()),
        ));

        let detector: Arc<dyn Detector> = Arc::new(VisionApi::new(
            config.vision_api_url.clone(),
            config.vision_api_key.clone(),
        ));
        let chat: Arc<dyn ChatCompleter> = Arc::new(ChatApi::new(
            config.chat_api_url.clone(),
            config.chat_api_key.clone(),
            config.chat_model.clone(),
        ));
        if !detector.is_configured() {
            tracing::warn!("GOOGLE_VISION_API_KEY not set, detection disabled");
        }
        if !chat.is_configured() {
            tracing::warn!("CHAT_API_KEY not set, chat disabled");
        }

        let analysis_flag = Arc::new(AnalysisFlagStore::new(config.analysis_state_path.clone()));

        Ok(Self::assemble(
            config,
            registry,
            sampler,
            capture,
            detector,
            chat,
            analysis_flag,
        ))
    }

    /// Build the store, scheduler and session registry around the given
    /// services.
    pub fn assemble(
        config: ServerConfig,
        registry: FeedRegistry,
        sampler: Arc<FeedSampler>,
        capture: Arc<dyn RemoteCapture>,
        detector: Arc<dyn Detector>,
        chat: Arc<dyn ChatCompleter>,
        analysis_flag: Arc<AnalysisFlagStore>,
    ) -> Self {
        let store = Arc::new(AggregationStore::new(registry));
        let scheduler = Arc::new(
            PollingScheduler::new(Arc::clone(&store), sampler.clone(), Arc::clone(&detector))
                .with_flag_store(Arc::clone(&analysis_flag)),
        );
        let sessions = Arc::new(ChatSessions::with_limits(
            config.chat_session_capacity,
            Duration::from_secs(config.chat_session_idle_secs),
        ));
        Self {
            config: Arc::new(config),
            store,
            scheduler,
            sampler,
            capture,
            detector,
            chat,
            sessions,
            analysis_flag,
        }
    }
}
