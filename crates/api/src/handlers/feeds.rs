//! Handlers for the camera feeds: listing with live counts, status
//! changes, and the detection overlay.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crowdwatch_core::aggregation::FeedSnapshot;
use crowdwatch_core::detection::DetectionResult;
use crowdwatch_core::error::CoreError;
use crowdwatch_core::feed::{FeedStatus, SourceKind};
use crowdwatch_core::frame::{THUMBNAIL_HEIGHT, THUMBNAIL_WIDTH};
use crowdwatch_core::overlay::{render_overlay, Size};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Largest accepted overlay surface edge.
const MAX_SURFACE_EDGE: u32 = 8192;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedsMeta {
    pub total_cameras: u32,
    pub active_cameras: u32,
    pub total_alerts: u64,
    pub total_people: u64,
}

#[derive(Debug, Serialize)]
pub struct FeedsResponse {
    pub feeds: Vec<FeedSnapshot>,
    pub meta: FeedsMeta,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: FeedStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayParams {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Size of the frame the detection ran on.
    pub source_width: Option<u32>,
    pub source_height: Option<u32>,
}

fn feed_not_found(id: &str) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Feed",
        id: id.to_string(),
    })
}

/// GET /api/video-feeds
pub async fn list_feeds(State(state): State<AppState>) -> Json<FeedsResponse> {
    let feeds = state.store.feeds().await;
    let stats = state.store.stats().await;
    Json(FeedsResponse {
        feeds,
        meta: FeedsMeta {
            total_cameras: stats.total_cameras,
            active_cameras: stats.active_cameras,
            total_alerts: stats.total_alerts,
            total_people: stats.total_people,
        },
    })
}

/// PUT /api/feeds/{id}/status
///
/// Starts or stops the feed's polling task when analysis is enabled.
pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdate>,
) -> AppResult<Json<FeedSnapshot>> {
    state.scheduler.set_feed_status(&id, body.status).await?;
    let snapshot = state.store.feed(&id).await.ok_or_else(|| feed_not_found(&id))?;
    Ok(Json(snapshot))
}

/// GET /api/feeds/{id}/overlay.svg
///
/// Renders the feed's last committed detection as a transparent SVG.
/// The surface defaults to the source frame size; the source size defaults
/// to the local playback resolution, or 1280x720 for remote feeds.
pub async fn overlay_svg(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<OverlayParams>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.store.feed(&id).await.ok_or_else(|| feed_not_found(&id))?;

    let default_source = match snapshot.descriptor.source_kind {
        SourceKind::Local => match state.sampler.playback(&id).await {
            Some(handle) => handle.frame_size(),
            None => (THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT),
        },
        SourceKind::Youtube => (THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT),
    };
    let source = Size::new(
        params.source_width.unwrap_or(default_source.0),
        params.source_height.unwrap_or(default_source.1),
    );
    let surface = Size::new(
        params.width.unwrap_or(source.width),
        params.height.unwrap_or(source.height),
    );
    let valid = |edge: u32| (1..=MAX_SURFACE_EDGE).contains(&edge);
    if !valid(surface.width) || !valid(surface.height) {
        return Err(AppError::BadRequest(format!(
            "Overlay size must be between 1 and {MAX_SURFACE_EDGE} pixels per side"
        )));
    }

    let empty = DetectionResult::empty();
    let result = snapshot.runtime.last_detection.as_ref().unwrap_or(&empty);
    let svg = render_overlay(result, surface, source).to_svg();
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}
