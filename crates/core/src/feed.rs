//! Camera feed descriptors and the registry that holds them.
//!
//! A feed is either a local video file (played back in a loop) or a
//! YouTube live stream. Descriptors are immutable after creation except
//! for their [`FeedStatus`], which is tracked by the aggregation store.

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::FeedId;

/// Where a feed's pixels come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A video file under the configured video root.
    Local,
    /// A remote YouTube stream, sampled through capture or thumbnail.
    Youtube,
}

/// Operational status of a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedStatus {
    Active,
    Maintenance,
    Offline,
}

impl FeedStatus {
    pub fn is_active(self) -> bool {
        self == FeedStatus::Active
    }
}

/// Identity and static configuration of one camera feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedDescriptor {
    pub id: FeedId,
    pub name: String,
    #[serde(rename = "type")]
    pub source_kind: SourceKind,
    /// File path relative to the video root, or the stream URL.
    #[serde(rename = "src")]
    pub locator: String,
    pub location: String,
    pub status: FeedStatus,
    /// Static alert count shown on the dashboard.
    #[serde(default)]
    pub alerts: u32,
}

/// Ordered, id-unique collection of feed descriptors.
#[derive(Debug, Clone, Default)]
pub struct FeedRegistry {
    feeds: Vec<FeedDescriptor>,
}

impl FeedRegistry {
    /// Build a registry, rejecting empty or duplicate ids.
    pub fn new(feeds: Vec<FeedDescriptor>) -> Result<Self, CoreError> {
        let mut seen = HashSet::new();
        for feed in &feeds {
            if feed.id.trim().is_empty() {
                return Err(CoreError::Validation("feed id must not be empty".into()));
            }
            if !seen.insert(feed.id.as_str()) {
                return Err(CoreError::Validation(format!(
                    "duplicate feed id '{}'",
                    feed.id
                )));
            }
        }
        Ok(Self { feeds })
    }

    /// The three demo feeds the dashboard ships with.
    pub fn default_feeds() -> Self {
        let feeds = vec![
            FeedDescriptor {
                id: "cam-001".into(),
                name: "Restaurant Sample 1".into(),
                source_kind: SourceKind::Local,
                locator: "videos/sample.mp4".into(),
                location: "Demo Video".into(),
                status: FeedStatus::Active,
                alerts: 0,
            },
            FeedDescriptor {
                id: "cam-002".into(),
                name: "Restaurant Sample 2".into(),
                source_kind: SourceKind::Local,
                locator: "videos/sample2.mp4".into(),
                location: "Demo Video".into(),
                status: FeedStatus::Active,
                alerts: 0,
            },
            FeedDescriptor {
                id: "cam-003".into(),
                name: "Elbo Room Band WebCam".into(),
                source_kind: SourceKind::Youtube,
                locator: "https://www.youtube.com/watch?v=NscyTzvTjHE".into(),
                location: "Live Stream".into(),
                status: FeedStatus::Active,
                alerts: 0,
            },
        ];
        Self { feeds }
    }

    /// Load a registry from a JSON array of descriptors.
    pub fn from_json_file(path: &Path) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Validation(format!("cannot read feeds file {}: {e}", path.display()))
        })?;
        let feeds: Vec<FeedDescriptor> = serde_json::from_str(&raw).map_err(|e| {
            CoreError::Validation(format!("invalid feeds file {}: {e}", path.display()))
        })?;
        Self::new(feeds)
    }

    pub fn get(&self, id: &str) -> Option<&FeedDescriptor> {
        self.feeds.iter().find(|f| f.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeedDescriptor> {
        self.feeds.iter()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn into_feeds(self) -> Vec<FeedDescriptor> {
        self.feeds
    }
}

fn video_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?:youtube\.com/(?:[^/]+/.+/|(?:v|e(?:mbed)?|live)/|.*[?&]v=)|youtu\.be/)([^"&?/\s]{11})"#,
        )
        .expect("video id pattern is valid")
    })
}

/// Extract the 11-character video id from a YouTube URL.
pub fn youtube_video_id(url: &str) -> Option<String> {
    video_id_pattern()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Host serving YouTube still thumbnails.
pub const YOUTUBE_THUMBNAIL_HOST: &str = "https://img.youtube.com";

/// Still-thumbnail URL published for a video id under `host`.
pub fn thumbnail_url(host: &str, video_id: &str) -> String {
    format!(
        "{}/vi/{video_id}/maxresdefault.jpg",
        host.trim_end_matches('/')
    )
}
