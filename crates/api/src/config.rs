use std::path::PathBuf;
use std::str::FromStr;

use crowdwatch_cloud::chat::{DEFAULT_CHAT_MODEL, DEFAULT_CHAT_URL};
use crowdwatch_cloud::vision::DEFAULT_VISION_URL;
use crowdwatch_monitor::assistant::{DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_IDLE};

#[derive(Debug, thiserror::Error)]
#[error("{var} must be a valid {expected}, got '{value}'")]
pub struct ConfigError {
    pub var: &'static str,
    pub expected: &'static str,
    pub value: String,
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// Detection and chat stay unconfigured until their API keys are set.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `60`).
    pub request_timeout_secs: u64,
    /// Directory local feed locators and `/api/video` paths resolve under.
    pub video_root: PathBuf,
    /// Optional JSON file replacing the built-in feed list.
    pub feeds_file: Option<PathBuf>,
    /// Where the analysis-enabled flag is persisted.
    pub analysis_state_path: PathBuf,
    pub vision_api_key: Option<String>,
    pub vision_api_url: String,
    pub chat_api_key: Option<String>,
    pub chat_api_url: String,
    pub chat_model: String,
    /// Upper bound on one remote stream capture.
    pub frame_capture_timeout_secs: u64,
    /// Most chat sessions kept at once.
    pub chat_session_capacity: usize,
    /// Chat sessions idle this long are dropped.
    pub chat_session_idle_secs: u64,
    pub ytdlp_bin: PathBuf,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            cors_origins: vec!["http://localhost:3000".into()],
            request_timeout_secs: 60,
            video_root: PathBuf::from("public"),
            feeds_file: None,
            analysis_state_path: PathBuf::from("data/analysis-state.json"),
            vision_api_key: None,
            vision_api_url: DEFAULT_VISION_URL.into(),
            chat_api_key: None,
            chat_api_url: DEFAULT_CHAT_URL.into(),
            chat_model: DEFAULT_CHAT_MODEL.into(),
            frame_capture_timeout_secs: 30,
            chat_session_capacity: DEFAULT_SESSION_CAPACITY,
            chat_session_idle_secs: DEFAULT_SESSION_IDLE.as_secs(),
            ytdlp_bin: PathBuf::from("yt-dlp"),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                      |
    /// |------------------------------|------------------------------|
    /// | `HOST`                       | `0.0.0.0`                    |
    /// | `PORT`                       | `3000`                       |
    /// | `CORS_ORIGINS`               | `http://localhost:3000`      |
    /// | `REQUEST_TIMEOUT_SECS`       | `60`                         |
    /// | `VIDEO_ROOT`                 | `public`                     |
    /// | `FEEDS_FILE`                 | unset (built-in feeds)       |
    /// | `ANALYSIS_STATE_PATH`        | `data/analysis-state.json`   |
    /// | `GOOGLE_VISION_API_KEY`      | unset                        |
    /// | `VISION_API_URL`             | `https://vision.googleapis.com` |
    /// | `CHAT_API_KEY` / `KOLOSAL_API_KEY` | unset                  |
    /// | `CHAT_API_URL`               | `https://api.kolosal.ai`     |
    /// | `CHAT_MODEL`                 | llama-4 maverick             |
    /// | `FRAME_CAPTURE_TIMEOUT_SECS` | `30`                         |
    /// | `CHAT_SESSION_CAPACITY`      | `256`                        |
    /// | `CHAT_SESSION_IDLE_SECS`     | `1800`                       |
    /// | `YTDLP_BIN` / `FFMPEG_BIN` / `FFPROBE_BIN` | tool names on `PATH` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let cors_origins = match var("CORS_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.cors_origins,
        };

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT", "u16", defaults.port)?,
            cors_origins,
            request_timeout_secs: parsed("REQUEST_TIMEOUT_SECS", "u64", defaults.request_timeout_secs)?,
            video_root: var("VIDEO_ROOT").map(PathBuf::from).unwrap_or(defaults.video_root),
            feeds_file: var("FEEDS_FILE").map(PathBuf::from),
            analysis_state_path: var("ANALYSIS_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.analysis_state_path),
            vision_api_key: var("GOOGLE_VISION_API_KEY"),
            vision_api_url: var("VISION_API_URL").unwrap_or(defaults.vision_api_url),
            chat_api_key: var("CHAT_API_KEY").or_else(|| var("KOLOSAL_API_KEY")),
            chat_api_url: var("CHAT_API_URL").unwrap_or(defaults.chat_api_url),
            chat_model: var("CHAT_MODEL").unwrap_or(defaults.chat_model),
            frame_capture_timeout_secs: parsed(
                "FRAME_CAPTURE_TIMEOUT_SECS",
                "u64",
                defaults.frame_capture_timeout_secs,
            )?,
            chat_session_capacity: parsed(
                "CHAT_SESSION_CAPACITY",
                "usize",
                defaults.chat_session_capacity,
            )?,
            chat_session_idle_secs: parsed(
                "CHAT_SESSION_IDLE_SECS",
                "u64",
                defaults.chat_session_idle_secs,
            )?,
            ytdlp_bin: var("YTDLP_BIN").map(PathBuf::from).unwrap_or(defaults.ytdlp_bin),
            ffmpeg_bin: var("FFMPEG_BIN").map(PathBuf::from).unwrap_or(defaults.ffmpeg_bin),
            ffprobe_bin: var("FFPROBE_BIN").map(PathBuf::from).unwrap_or(defaults.ffprobe_bin),
        })
    }
}

/// Non-empty value of an env var.
fn var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(key: &'static str, expected: &'static str, default: T) -> Result<T, ConfigError> {
    match var(key) {
        Some(value) => value.parse().map_err(|_| ConfigError {
            var: key,
            expected,
            value,
        }),
        None => Ok(default),
    }
}
