//! Handlers for one-shot image analysis and remote frame capture.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crowdwatch_cloud::vision::{decode_image_payload, DetectionError};
use crowdwatch_core::detection::DetectionResult;
use crowdwatch_core::types::{FeedId, Timestamp};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    /// Base64 image, optionally as a `data:image/...;base64,` URI.
    pub image: Option<String>,
    /// When set and analysis is running, the result is committed to this
    /// feed.
    pub feed_id: Option<FeedId>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub detections: DetectionResult,
    /// Present when a `feedId` was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed: Option<bool>,
    pub timestamp: Timestamp,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRequest {
    #[serde(alias = "youtubeUrl")]
    pub stream_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FrameResponse {
    pub success: bool,
    /// `data:image/jpeg;base64,...`
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub timestamp: Timestamp,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/analyze
///
/// Runs person and face detection on one image.
pub async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeRequest>,
) -> AppResult<Json<AnalyzeResponse>> {
    if !state.detector.is_configured() {
        return Err(DetectionError::Unconfigured.into());
    }
    let image = body
        .image
        .filter(|i| !i.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("No image provided".into()))?;
    let bytes = decode_image_payload(&image)?;

    let detections = state.detector.detect(&bytes).await?;
    tracing::info!(
        people = detections.people,
        objects = detections.objects.len(),
        faces = detections.faces_detected,
        "Image analyzed",
    );

    let committed = match body.feed_id {
        Some(feed_id) => Some(
            state
                .scheduler
                .record_detection(&feed_id, detections.clone())
                .await?,
        ),
        None => None,
    };

    Ok(Json(AnalyzeResponse {
        success: true,
        detections,
        committed,
        timestamp: chrono::Utc::now(),
    }))
}

/// POST /api/youtube-frame
///
/// Grabs one frame from a remote stream. No thumbnail fallback here: a
/// failed capture is reported to the caller.
pub async fn capture_frame(
    State(state): State<AppState>,
    Json(body): Json<FrameRequest>,
) -> AppResult<Json<FrameResponse>> {
    let stream_url = body
        .stream_url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("No YouTube URL provided".into()))?;

    let frame = state.capture.capture(&stream_url).await?;
    tracing::debug!(%stream_url, width = frame.width, height = frame.height, "Frame captured");

    Ok(Json(FrameResponse {
        success: true,
        image: frame.to_data_uri(),
        width: frame.width,
        height: frame.height,
        timestamp: chrono::Utc::now(),
    }))
}
